//! Thin command-line shell over the Obsidian engine.

use clap::{Parser, Subcommand};
use obsidian_core::{
    cancel_pair, Engine, EngineConfig, EngineEvent, EventSink, LaunchParams, UserKind,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "obsidian", version, about = "Install and launch game versions")]
struct Cli {
    /// Root directory of the local store.
    #[arg(long, default_value = ".obsidian", global = true)]
    store_root: PathBuf,

    /// Version index URL override.
    #[arg(long, global = true)]
    index_url: Option<String>,

    /// Asset objects base URL override.
    #[arg(long, global = true)]
    objects_url: Option<String>,

    /// Concurrent downloads (1-32).
    #[arg(long, global = true)]
    parallel: Option<usize>,

    /// Treat a failed asset-index fetch as fatal.
    #[arg(long, global = true)]
    strict_assets: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List published versions.
    List {
        /// Show snapshots and old versions too.
        #[arg(long)]
        all: bool,
    },

    /// Show the resolved detail for one version.
    Inspect { id: String },

    /// Install a version into the local store.
    Install { id: String },

    /// Launch an installed version.
    Launch {
        id: String,

        #[arg(long, default_value = "Player")]
        name: String,

        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        uuid: String,

        #[arg(long, default_value = "0")]
        token: String,

        /// Game working directory; defaults to the store root's game dir.
        #[arg(long)]
        game_dir: Option<PathBuf>,

        /// Maximum heap in megabytes.
        #[arg(long, default_value_t = 2048)]
        heap: u32,

        #[arg(long, default_value_t = 854)]
        width: u32,

        #[arg(long, default_value_t = 480)]
        height: u32,

        /// Runtime root to prefer over JAVA_HOME and PATH.
        #[arg(long)]
        runtime: Option<PathBuf>,

        /// Extra JVM arguments, repeatable.
        #[arg(long = "jvm-arg")]
        jvm_args: Vec<String>,

        /// Report the account as a legacy (non-msa) user.
        #[arg(long)]
        legacy_user: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = EngineConfig::new(&cli.store_root);
    if let Some(url) = cli.index_url.clone() {
        config.index_url = url;
    }
    if let Some(url) = cli.objects_url.clone() {
        config.objects_base_url = url;
    }
    if let Some(parallel) = cli.parallel {
        config.parallel_fetches = parallel;
    }
    config.strict_assets = cli.strict_assets;

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => return fail(e),
    };

    match run(engine, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn fail(error: obsidian_core::EngineError) -> ExitCode {
    let code = error.exit_code();
    log::error!("{:#}", anyhow::Error::from(error));
    ExitCode::from(code as u8)
}

async fn run(engine: Engine, command: Command) -> Result<(), obsidian_core::EngineError> {
    match command {
        Command::List { all } => {
            let index = engine.list_versions().await?;
            if let Some(latest) = index.latest_release() {
                println!("latest release:  {}", latest);
            }
            if let Some(latest) = index.latest_snapshot() {
                println!("latest snapshot: {}", latest);
            }
            for entry in &index.versions {
                let is_release =
                    matches!(entry.kind, obsidian_core::manifest::VersionKind::Release);
                if all || is_release {
                    println!("{:<24} {:?}", entry.id, entry.kind);
                }
            }
            Ok(())
        }

        Command::Inspect { id } => {
            let detail = engine.inspect(&id).await?;
            println!("id:          {}", detail.id);
            println!("type:        {}", detail.kind);
            println!("main class:  {}", detail.main_class);
            println!("assets:      {}", detail.assets_id());
            if let Some(major) = detail.java_major() {
                println!("java major:  {}", major);
            }
            println!("libraries:   {}", detail.libraries.len());
            Ok(())
        }

        Command::Install { id } => {
            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, cancelling install");
                    handle.cancel();
                }
            });

            let report = engine.install(&id, progress_sink(), token).await?;
            for warning in &report.warnings {
                log::warn!("{}", warning);
            }
            println!(
                "installed {} ({} bytes, {} warnings)",
                report.id,
                report.bytes_total,
                report.warnings.len()
            );
            Ok(())
        }

        Command::Launch {
            id,
            name,
            uuid,
            token,
            game_dir,
            heap,
            width,
            height,
            runtime,
            jvm_args,
            legacy_user,
        } => {
            let game_dir = game_dir.unwrap_or_else(|| engine.store().root().join("game"));

            let mut params = LaunchParams::new(name, game_dir);
            params.player_uuid = uuid;
            params.access_token = token;
            params.max_heap_mb = heap;
            params.width = width;
            params.height = height;
            params.runtime_home = runtime;
            params.extra_jvm_args = jvm_args;
            if legacy_user {
                params.user_kind = UserKind::Legacy;
            }

            let child = engine.launch(&id, params, stdio_sink()).await?;
            println!("started pid {}", child.pid());

            let code = child.wait().await;
            match code {
                Some(0) | None => Ok(()),
                Some(n) => {
                    log::warn!("game exited with code {}", n);
                    Ok(())
                }
            }
        }
    }
}

/// Progress to stderr as a coarse percentage; the aggregator already
/// debounces emissions.
fn progress_sink() -> EventSink {
    Arc::new(|event| match event {
        EngineEvent::Progress {
            fraction,
            bytes_done,
            bytes_total,
            ..
        } => {
            eprint!(
                "\r{:>5.1}% ({}/{} bytes)",
                fraction * 100.0,
                bytes_done,
                bytes_total
            );
            if fraction >= 1.0 {
                eprintln!();
            }
        }
        EngineEvent::Error { kind, detail, .. } => {
            eprintln!();
            log::error!("{}: {}", kind, detail);
        }
        _ => {}
    })
}

fn stdio_sink() -> EventSink {
    Arc::new(|event| match event {
        EngineEvent::Stdio { line, .. } => println!("{}", line),
        EngineEvent::Started { pid, .. } => log::info!("game started (pid {})", pid),
        EngineEvent::Exited { code, .. } => log::info!("game exited ({:?})", code),
        _ => {}
    })
}
