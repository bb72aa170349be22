//! Engine configuration.
//! One `EngineConfig` is supplied at facade construction; everything else
//! derives from it.

use std::path::PathBuf;

/// Default version index endpoint.
pub const DEFAULT_INDEX_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Default base URL for content-addressed asset objects.
pub const DEFAULT_OBJECTS_BASE_URL: &str = "https://resources.download.minecraft.net";

/// Brand string substituted for `${launcher_name}`.
pub const LAUNCHER_NAME: &str = "Obsidian";

/// Engine version substituted for `${launcher_version}`.
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PARALLEL_FETCHES: usize = 8;
pub const MAX_PARALLEL_FETCHES: usize = 32;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Options fixed at facade construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the local store (versions/, libraries/, assets/, natives/).
    pub store_root: PathBuf,

    /// Version index URL.
    pub index_url: String,

    /// Base URL for asset objects; `<base>/<hh>/<hash>`.
    pub objects_base_url: String,

    /// Concurrent downloads, 1..=32.
    pub parallel_fetches: usize,

    pub connect_timeout_ms: u64,

    /// Inactivity budget for a single request body read.
    pub read_timeout_ms: u64,

    /// Retries for transient per-file failures.
    pub max_retries: u32,

    pub user_agent: String,

    /// When true, a failed asset-index fetch fails the install instead of
    /// downgrading to a warning.
    pub strict_assets: bool,
}

impl EngineConfig {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            index_url: DEFAULT_INDEX_URL.to_string(),
            objects_base_url: DEFAULT_OBJECTS_BASE_URL.to_string(),
            parallel_fetches: DEFAULT_PARALLEL_FETCHES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: format!("{}/{}", LAUNCHER_NAME, LAUNCHER_VERSION),
            strict_assets: false,
        }
    }
}
