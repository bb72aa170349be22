//! Caller-facing launch types.

use std::path::PathBuf;

/// Account kind reported to the game via `${user_type}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    Msa,
    Legacy,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Msa => "msa",
            UserKind::Legacy => "legacy",
        }
    }
}

/// Everything a caller supplies to launch an installed version.
#[derive(Debug, Clone)]
pub struct LaunchParams {
    pub player_name: String,
    pub player_uuid: String,
    pub access_token: String,

    /// Working directory of the spawned game.
    pub game_dir: PathBuf,

    /// `type` string substituted for `${version_type}`; the version's own
    /// kind when absent.
    pub version_type: Option<String>,

    pub max_heap_mb: u32,

    /// Extra JVM arguments appended unless their key is already present.
    pub extra_jvm_args: Vec<String>,

    pub width: u32,
    pub height: u32,

    pub user_kind: UserKind,

    pub client_id: Option<String>,

    /// Preferred runtime root, consulted before `JAVA_HOME` and `PATH`.
    pub runtime_home: Option<PathBuf>,

    /// Extra environment variables for the child process.
    pub env_overrides: std::collections::HashMap<String, String>,
}

impl LaunchParams {
    pub fn new(player_name: impl Into<String>, game_dir: impl Into<PathBuf>) -> Self {
        Self {
            player_name: player_name.into(),
            player_uuid: "00000000-0000-0000-0000-000000000000".to_string(),
            access_token: "0".to_string(),
            game_dir: game_dir.into(),
            version_type: None,
            max_heap_mb: 2048,
            extra_jvm_args: Vec::new(),
            width: 854,
            height: 480,
            user_kind: UserKind::Msa,
            client_id: None,
            runtime_home: None,
            env_overrides: std::collections::HashMap::new(),
        }
    }
}

/// Store-derived inputs to argument assembly, computed by the facade.
#[derive(Debug, Clone)]
pub struct LaunchPaths {
    pub natives_dir: PathBuf,
    pub assets_dir: PathBuf,
    /// Ordered jar paths joined into `${classpath}`.
    pub classpath_entries: Vec<PathBuf>,
}

/// The fully assembled child command line.
#[derive(Debug, Clone)]
pub struct AssembledCommand {
    pub jvm_argv: Vec<String>,
    pub main_class: String,
    pub game_argv: Vec<String>,
}

impl AssembledCommand {
    /// `jvm_argv ++ [main_class] ++ game_argv`.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.jvm_argv.clone();
        argv.push(self.main_class.clone());
        argv.extend(self.game_argv.iter().cloned());
        argv
    }
}
