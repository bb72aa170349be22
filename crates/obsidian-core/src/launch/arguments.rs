//! Template substitution and argv assembly.

use crate::config::{LAUNCHER_NAME, LAUNCHER_VERSION};
use crate::error::EngineError;
use crate::launch::types::{AssembledCommand, LaunchParams, LaunchPaths};
use crate::manifest::types::{Arg, VersionDetail};
use crate::platform::RuleEnv;
use crate::rules;
use std::collections::HashMap;
use std::path::Path;

/// Assemble the JVM argv, main class and game argv for one launch.
pub fn assemble(
    detail: &VersionDetail,
    env: &RuleEnv,
    params: &LaunchParams,
    paths: &LaunchPaths,
) -> Result<AssembledCommand, EngineError> {
    let classpath = join_classpath(&paths.classpath_entries, env);
    let vars = build_variables(detail, env, params, paths, &classpath);

    let jvm_argv = build_jvm_argv(detail, env, params, paths, &classpath, &vars)?;
    let game_argv = build_game_argv(detail, env, &vars)?;

    Ok(AssembledCommand {
        jvm_argv,
        main_class: detail.main_class.clone(),
        game_argv,
    })
}

fn build_jvm_argv(
    detail: &VersionDetail,
    env: &RuleEnv,
    params: &LaunchParams,
    paths: &LaunchPaths,
    classpath: &str,
    vars: &HashMap<&'static str, String>,
) -> Result<Vec<String>, EngineError> {
    let mut argv = vec![format!("-Xmx{}M", params.max_heap_mb)];

    let jvm_args = detail.arguments.as_ref().map(|a| a.jvm.as_slice());
    match jvm_args {
        Some(args) if !args.is_empty() => {
            for arg in args {
                append_arg(&mut argv, arg, env, vars)?;
            }
        }
        _ => {
            // Versions without structured JVM arguments (legacy or otherwise)
            // get the synthesized minimum below via the exactly-once pass.
            if detail.minecraft_arguments.is_some() {
                log::warn!(
                    "Version {} predates structured JVM arguments; synthesizing them",
                    detail.id
                );
            } else {
                log::warn!(
                    "Version {} declares neither JVM arguments nor a legacy argument string; synthesizing the minimum",
                    detail.id
                );
            }
        }
    }

    ensure_exactly_once(&mut argv, paths, classpath, vars);
    append_extra_jvm_args(&mut argv, &params.extra_jvm_args);

    Ok(argv)
}

fn build_game_argv(
    detail: &VersionDetail,
    env: &RuleEnv,
    vars: &HashMap<&'static str, String>,
) -> Result<Vec<String>, EngineError> {
    let mut argv = Vec::new();
    if let Some(ref arguments) = detail.arguments {
        for arg in &arguments.game {
            append_arg(&mut argv, arg, env, vars)?;
        }
    }
    Ok(argv)
}

fn append_arg(
    argv: &mut Vec<String>,
    arg: &Arg,
    env: &RuleEnv,
    vars: &HashMap<&'static str, String>,
) -> Result<(), EngineError> {
    match arg {
        Arg::Literal(s) => argv.push(substitute(s, vars)),
        Arg::Conditional { rules: r, value } => {
            if rules::evaluate(r, env)? {
                for part in value.parts() {
                    argv.push(substitute(part, vars));
                }
            }
        }
        Arg::Other(value) => {
            log::warn!("Ignoring argument element of unexpected shape: {}", value);
        }
    }
    Ok(())
}

/// Guarantee `-Djava.library.path=…` and `-cp <classpath>` each appear
/// exactly once: duplicates beyond the first are dropped, absentees are
/// appended in synthesized form.
fn ensure_exactly_once(
    argv: &mut Vec<String>,
    paths: &LaunchPaths,
    classpath: &str,
    vars: &HashMap<&'static str, String>,
) {
    let mut seen_library_path = false;
    let mut seen_classpath = false;
    let mut out = Vec::with_capacity(argv.len());
    let mut iter = std::mem::take(argv).into_iter();

    while let Some(token) = iter.next() {
        if token.starts_with("-Djava.library.path=") {
            if seen_library_path {
                continue;
            }
            seen_library_path = true;
        } else if token == "-cp" || token == "-classpath" {
            // The separator token and its value travel together.
            let value = iter.next();
            if seen_classpath {
                continue;
            }
            seen_classpath = true;
            out.push(token);
            if let Some(value) = value {
                out.push(value);
            }
            continue;
        }
        out.push(token);
    }

    if !seen_library_path {
        out.push(format!(
            "-Djava.library.path={}",
            vars.get("natives_directory")
                .cloned()
                .unwrap_or_else(|| display_path(&paths.natives_dir))
        ));
    }
    if !seen_classpath {
        out.push("-cp".to_string());
        out.push(classpath.to_string());
    }

    *argv = out;
}

/// Append caller-supplied JVM arguments, skipping any whose key (the token
/// up to the first `=` or space) is already present.
fn append_extra_jvm_args(argv: &mut Vec<String>, extra: &[String]) {
    let existing: Vec<String> = argv.iter().map(|a| arg_key(a).to_string()).collect();
    for arg in extra {
        let key = arg_key(arg);
        if existing.iter().any(|k| k == key) {
            log::debug!("Skipping extra JVM argument {:?}: key already present", arg);
            continue;
        }
        argv.push(arg.clone());
    }
}

fn arg_key(token: &str) -> &str {
    token
        .split(['=', ' '])
        .next()
        .unwrap_or(token)
}

fn join_classpath(entries: &[std::path::PathBuf], env: &RuleEnv) -> String {
    entries
        .iter()
        .map(|p| display_path(p))
        .collect::<Vec<_>>()
        .join(env.os.classpath_separator())
}

/// Replace `${key}` placeholders in one left-to-right pass. A key with no
/// binding becomes the empty string; output is never re-scanned, so values
/// containing `${` cannot trigger a second substitution.
pub fn substitute(text: &str, vars: &HashMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = vars.get(&after[..end]) {
                    out.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder; keep the text as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn build_variables(
    detail: &VersionDetail,
    _env: &RuleEnv,
    params: &LaunchParams,
    paths: &LaunchPaths,
    classpath: &str,
) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();

    vars.insert("natives_directory", canonical_display(&paths.natives_dir));
    vars.insert("launcher_name", LAUNCHER_NAME.to_string());
    vars.insert("launcher_version", LAUNCHER_VERSION.to_string());
    vars.insert("classpath", classpath.to_string());

    vars.insert("auth_player_name", params.player_name.clone());
    vars.insert("version_name", detail.id.clone());
    vars.insert("game_directory", canonical_display(&params.game_dir));
    vars.insert("assets_root", canonical_display(&paths.assets_dir));
    vars.insert("assets_index_name", detail.assets_id().to_string());
    vars.insert("auth_uuid", params.player_uuid.clone());
    vars.insert("auth_access_token", params.access_token.clone());
    vars.insert(
        "clientid",
        params.client_id.clone().unwrap_or_default(),
    );
    vars.insert("auth_xuid", String::new());
    vars.insert("user_type", params.user_kind.as_str().to_string());
    vars.insert(
        "version_type",
        params
            .version_type
            .clone()
            .unwrap_or_else(|| detail.kind.clone()),
    );
    vars.insert("resolution_width", params.width.to_string());
    vars.insert("resolution_height", params.height.to_string());

    vars
}

/// Absolute form of a path when the filesystem can resolve it, the raw form
/// otherwise. Paths flow into the child argv as plain strings.
fn canonical_display(path: &Path) -> String {
    dunce::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| display_path(path))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::types::UserKind;
    use crate::manifest::client::decode_detail;
    use crate::platform::{Arch, OsFamily};
    use std::path::PathBuf;

    fn env(os: OsFamily) -> RuleEnv {
        RuleEnv {
            os,
            os_version: String::new(),
            arch: Arch::X64,
            features: HashMap::new(),
        }
    }

    fn params() -> LaunchParams {
        LaunchParams {
            player_name: "Alice".to_string(),
            player_uuid: "uuid-1".to_string(),
            access_token: "token-1".to_string(),
            game_dir: PathBuf::from("/game"),
            version_type: None,
            max_heap_mb: 4096,
            extra_jvm_args: vec![],
            width: 854,
            height: 480,
            user_kind: UserKind::Msa,
            client_id: None,
            runtime_home: None,
            env_overrides: HashMap::new(),
        }
    }

    fn paths() -> LaunchPaths {
        LaunchPaths {
            natives_dir: PathBuf::from("/store/natives/v"),
            assets_dir: PathBuf::from("/store/assets"),
            classpath_entries: vec![
                PathBuf::from("/store/libraries/a.jar"),
                PathBuf::from("/store/libraries/b.jar"),
            ],
        }
    }

    fn detail(json: &str) -> VersionDetail {
        decode_detail(json.as_bytes(), "test").unwrap()
    }

    const BASE: &str = r#"
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "12",
        "assetIndex": {"id": "12", "sha1": "1111111111111111111111111111111111111111",
                       "size": 10, "url": "https://meta/12.json"},
        "downloads": {"client": {"url": "https://dl/c.jar",
                                 "sha1": "2222222222222222222222222222222222222222", "size": 1}}
    "#;

    #[test]
    fn substitution_single_pass() {
        let mut vars = HashMap::new();
        vars.insert("a", "${b}".to_string());
        vars.insert("b", "two".to_string());

        // The value "${b}" must not be substituted again.
        assert_eq!(substitute("x ${a} y", &vars), "x ${b} y");
    }

    #[test]
    fn absent_placeholder_becomes_empty() {
        let vars = HashMap::new();
        assert_eq!(substitute("--token ${auth_xuid} end", &vars), "--token  end");
    }

    #[test]
    fn unterminated_placeholder_kept_verbatim() {
        let vars = HashMap::new();
        assert_eq!(substitute("oops ${broken", &vars), "oops ${broken");
    }

    #[test]
    fn legacy_game_arguments_substituted_in_order() {
        let json = format!(
            r#"{{"id": "1.7.10", {},
                "minecraftArguments": "--username ${{auth_player_name}} --version ${{version_name}}"}}"#,
            BASE
        );
        let detail = detail(&json);
        let cmd = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();
        assert_eq!(
            cmd.game_argv,
            vec!["--username", "Alice", "--version", "1.7.10"]
        );
    }

    #[test]
    fn rule_gated_jvm_argument_only_on_matching_os() {
        let json = format!(
            r#"{{"id": "1.20.4", {},
                "arguments": {{"jvm": [
                    {{"rules": [{{"action": "allow", "os": {{"name": "windows"}}}}],
                      "value": "-XstartOnFirstThread"}},
                    "-cp", "${{classpath}}"
                ], "game": []}}}}"#,
            BASE
        );
        let detail = detail(&json);

        let windows = assemble(&detail, &env(OsFamily::Windows), &params(), &paths()).unwrap();
        assert!(windows.jvm_argv.contains(&"-XstartOnFirstThread".to_string()));

        let linux = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();
        assert!(!linux.jvm_argv.contains(&"-XstartOnFirstThread".to_string()));
    }

    #[test]
    fn heap_flag_leads_and_classpath_joined() {
        let json = format!(r#"{{"id": "1.20.4", {}, "arguments": {{"jvm": [], "game": []}}}}"#, BASE);
        let detail = detail(&json);
        let e = env(OsFamily::Linux);
        let cmd = assemble(&detail, &e, &params(), &paths()).unwrap();

        assert_eq!(cmd.jvm_argv[0], "-Xmx4096M");
        let cp_pos = cmd.jvm_argv.iter().position(|a| a == "-cp").unwrap();
        assert_eq!(
            cmd.jvm_argv[cp_pos + 1],
            "/store/libraries/a.jar:/store/libraries/b.jar"
        );
        assert!(cmd
            .jvm_argv
            .iter()
            .any(|a| a.starts_with("-Djava.library.path=")));
    }

    #[test]
    fn library_path_and_classpath_appear_exactly_once() {
        let json = format!(
            r#"{{"id": "1.20.4", {},
                "arguments": {{"jvm": [
                    "-Djava.library.path=${{natives_directory}}",
                    "-Djava.library.path=${{natives_directory}}",
                    "-cp", "${{classpath}}",
                    "-cp", "${{classpath}}"
                ], "game": []}}}}"#,
            BASE
        );
        let detail = detail(&json);
        let cmd = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();

        let lib_count = cmd
            .jvm_argv
            .iter()
            .filter(|a| a.starts_with("-Djava.library.path="))
            .count();
        let cp_count = cmd.jvm_argv.iter().filter(|a| *a == "-cp").count();
        assert_eq!(lib_count, 1);
        assert_eq!(cp_count, 1);
    }

    #[test]
    fn extra_jvm_args_filtered_by_key() {
        let json = format!(
            r#"{{"id": "1.20.4", {},
                "arguments": {{"jvm": ["-Dfoo=manifest", "-cp", "${{classpath}}"], "game": []}}}}"#,
            BASE
        );
        let detail = detail(&json);
        let mut p = params();
        p.extra_jvm_args = vec![
            "-Dfoo=user".to_string(),
            "-Dbar=user".to_string(),
            "-cp /elsewhere".to_string(),
        ];
        let cmd = assemble(&detail, &env(OsFamily::Linux), &p, &paths()).unwrap();

        assert!(cmd.jvm_argv.contains(&"-Dfoo=manifest".to_string()));
        assert!(!cmd.jvm_argv.contains(&"-Dfoo=user".to_string()));
        assert!(cmd.jvm_argv.contains(&"-Dbar=user".to_string()));
        assert!(!cmd.jvm_argv.contains(&"-cp /elsewhere".to_string()));
    }

    #[test]
    fn substitution_table_bindings() {
        let json = format!(
            r#"{{"id": "1.20.4", {},
                "arguments": {{"jvm": ["-cp", "${{classpath}}"], "game": [
                    "${{auth_player_name}}", "${{version_name}}", "${{assets_index_name}}",
                    "${{auth_uuid}}", "${{auth_access_token}}", "${{user_type}}",
                    "${{version_type}}", "${{resolution_width}}", "${{resolution_height}}",
                    "${{launcher_name}}", "${{clientid}}", "${{auth_xuid}}"
                ]}}}}"#,
            BASE
        );
        let detail = detail(&json);
        let cmd = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();
        assert_eq!(
            cmd.game_argv,
            vec![
                "Alice", "1.20.4", "12", "uuid-1", "token-1", "msa", "release", "854", "480",
                "Obsidian", "", ""
            ]
        );
    }

    #[test]
    fn argv_concatenation_order() {
        let json = format!(r#"{{"id": "1.20.4", {}, "arguments": {{"jvm": [], "game": ["--go"]}}}}"#, BASE);
        let detail = detail(&json);
        let cmd = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();
        let argv = cmd.argv();

        let main_pos = argv
            .iter()
            .position(|a| a == "net.minecraft.client.main.Main")
            .unwrap();
        assert_eq!(argv[main_pos + 1], "--go");
        assert!(argv[..main_pos]
            .iter()
            .all(|a| a.starts_with('-') || a.contains(".jar") || a.as_str() == "-cp"));
    }

    #[test]
    fn conditional_array_value_expands() {
        let json = format!(
            r#"{{"id": "1.20.4", {},
                "arguments": {{"jvm": [], "game": [
                    {{"rules": [{{"action": "allow"}}],
                      "value": ["--width", "${{resolution_width}}"]}}
                ]}}}}"#,
            BASE
        );
        let detail = detail(&json);
        let cmd = assemble(&detail, &env(OsFamily::Linux), &params(), &paths()).unwrap();
        assert_eq!(cmd.game_argv, vec!["--width", "854"]);
    }
}
