//! The engine facade consumed by UI and CLI collaborators.

use crate::config::{EngineConfig, MAX_PARALLEL_FETCHES};
use crate::error::EngineError;
use crate::events::{CancelToken, EngineEvent, EventSink};
use crate::install::fetch::FetchEngine;
use crate::install::plan::{self, artifact_rel_path, TaskCategory};
use crate::install::progress::ProgressAggregator;
use crate::launch::arguments;
use crate::launch::natives::stage_natives;
use crate::launch::process::{self, ProcessHandle};
use crate::launch::runtime::locate_runtime;
use crate::launch::types::{LaunchParams, LaunchPaths};
use crate::manifest::client::{decode_detail, ManifestClient};
use crate::manifest::types::{ManifestEntry, ManifestIndex, VersionDetail};
use crate::platform::RuleEnv;
use crate::rules;
use crate::store::LocalStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Summary of a completed install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub id: String,
    pub bytes_total: u64,
    /// Non-fatal problems, e.g. unreachable asset objects.
    pub warnings: Vec<String>,
}

pub struct Engine {
    config: EngineConfig,
    http: reqwest::Client,
    store: LocalStore,
    manifest: ManifestClient,
    index_cache: Mutex<Option<ManifestIndex>>,
    /// Completion signals for in-flight installs, one per version id.
    installs: Mutex<HashMap<String, watch::Receiver<bool>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if !(1..=MAX_PARALLEL_FETCHES).contains(&config.parallel_fetches) {
            return Err(EngineError::BadArgument(format!(
                "parallel_fetches must be within 1..={}, got {}",
                MAX_PARALLEL_FETCHES, config.parallel_fetches
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EngineError::BadArgument(format!("http client: {}", e)))?;

        let manifest = ManifestClient::new(
            http.clone(),
            config.index_url.clone(),
            Duration::from_millis(config.read_timeout_ms),
            config.max_retries,
        );
        let store = LocalStore::new(config.store_root.clone());

        Ok(Self {
            config,
            http,
            store,
            manifest,
            index_cache: Mutex::new(None),
            installs: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Fetch the version index.
    pub async fn list_versions(&self) -> Result<ManifestIndex, EngineError> {
        let index = self.manifest.fetch_index().await?;
        *self.index_cache.lock().await = Some(index.clone());
        Ok(index)
    }

    /// Load a version detail, preferring the locally installed copy. The
    /// local bytes are re-verified against the index entry's SHA-1 before
    /// being trusted; a stale or corrupted copy falls back to a fetch.
    pub async fn inspect(&self, id: &str) -> Result<VersionDetail, EngineError> {
        let path = self.store.detail_path(id);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if self.local_detail_is_current(id, &bytes).await {
                match decode_detail(&bytes, &path.to_string_lossy()) {
                    Ok(detail) => return Ok(detail),
                    Err(e) => {
                        log::warn!("Local detail for {} unreadable ({}), refetching", id, e);
                    }
                }
            } else {
                log::info!(
                    "Stored detail for {} no longer matches the index, refetching",
                    id
                );
            }
        }

        let entry = self.index_entry(id).await?;
        self.manifest
            .fetch_detail(&entry.url, entry.sha1.as_deref())
            .await
    }

    /// Install a version: resolve its detail, plan the file set, fetch and
    /// verify everything. Idempotent; a second run over a complete store
    /// downloads nothing.
    ///
    /// At most one install per id runs at a time. Late callers wait for the
    /// in-flight run's completion signal, then re-verify the store
    /// themselves, which costs no artifact downloads.
    pub async fn install(
        &self,
        id: &str,
        sink: EventSink,
        cancel: CancelToken,
    ) -> Result<InstallReport, EngineError> {
        loop {
            let claim = {
                let mut installs = self.installs.lock().await;
                match installs.get(id) {
                    Some(rx) => Claim::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(false);
                        installs.insert(id.to_string(), rx);
                        Claim::Run(tx)
                    }
                }
            };

            match claim {
                Claim::Wait(mut rx) => {
                    log::info!("Install of {} already in flight, joining", id);
                    let _ = rx.wait_for(|done| *done).await;
                }
                Claim::Run(tx) => {
                    let result = self.install_inner(id, &sink, &cancel).await;
                    self.installs.lock().await.remove(id);
                    let _ = tx.send(true);

                    if let Err(ref error) = result {
                        (sink)(EngineEvent::Error {
                            id: id.to_string(),
                            kind: error.kind().to_string(),
                            detail: error.to_string(),
                        });
                    }
                    return result;
                }
            }
        }
    }

    async fn install_inner(
        &self,
        id: &str,
        sink: &EventSink,
        cancel: &CancelToken,
    ) -> Result<InstallReport, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let detail = self.load_or_fetch_detail(id).await?;
        let env = RuleEnv::current();
        let tasks = plan::plan(&detail, &env, &self.store)?;

        log::info!("Installing {}: {} planned fetch tasks", id, tasks.len());

        let progress = ProgressAggregator::new(id, sink.clone());
        let fetcher = FetchEngine::new(&self.http, &self.store, &self.config);
        let report = fetcher.run(tasks, &progress, cancel).await?;

        let mut warnings = report.warnings;
        let mut fatal: Option<EngineError> = None;

        for failure in report.failures {
            match failure.category {
                TaskCategory::AssetObject if !failure.error.is_disk_full() => {
                    log::warn!("Asset object {} unavailable: {}", failure.rel, failure.error);
                    warnings.push(format!("{}: {}", failure.rel, failure.error));
                }
                _ => {
                    (sink)(EngineEvent::Error {
                        id: id.to_string(),
                        kind: failure.error.kind().to_string(),
                        detail: format!("{}: {}", failure.rel, failure.error),
                    });
                    if fatal.is_none() {
                        fatal = Some(failure.error);
                    }
                }
            }
        }

        if let Some(error) = fatal {
            return Err(error);
        }

        progress.finish();
        log::info!(
            "Install of {} complete ({} bytes, {} warnings)",
            id,
            progress.bytes_total(),
            warnings.len()
        );

        Ok(InstallReport {
            id: id.to_string(),
            bytes_total: progress.bytes_total(),
            warnings,
        })
    }

    /// Launch an installed version. Fails fast when the store does not hold
    /// a verified installation.
    pub async fn launch(
        &self,
        id: &str,
        params: LaunchParams,
        sink: EventSink,
    ) -> Result<ProcessHandle, EngineError> {
        let detail_path = self.store.detail_path(id);
        let bytes = tokio::fs::read(&detail_path)
            .await
            .map_err(|_| EngineError::NotInstalled(id.to_string()))?;
        let detail = decode_detail(&bytes, &detail_path.to_string_lossy())?;

        let env = RuleEnv::current();
        self.verify_installed(&detail, &env).await?;

        let natives_dir = self.store.natives_dir(id);
        stage_natives(&detail, &self.store, &env, &natives_dir).await?;

        let paths = LaunchPaths {
            natives_dir,
            assets_dir: self.store.assets_dir(),
            classpath_entries: self.classpath_entries(&detail, &env)?,
        };
        let command = arguments::assemble(&detail, &env, &params, &paths)?;

        let runtime = locate_runtime(params.runtime_home.as_deref())?;
        log::info!("Launching {} with runtime {:?}", id, runtime);

        process::spawn(
            id,
            &runtime,
            &command.argv(),
            &params.game_dir,
            &params.env_overrides,
            sink,
        )
        .await
    }

    /// Cheap installed-state probe used by launch and exposed to callers.
    pub async fn is_installed(&self, id: &str) -> bool {
        let detail_path = self.store.detail_path(id);
        let Ok(bytes) = tokio::fs::read(&detail_path).await else {
            return false;
        };
        let Ok(detail) = decode_detail(&bytes, &detail_path.to_string_lossy()) else {
            return false;
        };
        self.verify_installed(&detail, &RuleEnv::current())
            .await
            .is_ok()
    }

    /// The client jar must verify byte-for-byte; libraries and the asset
    /// index must at least be present. Asset objects are not probed here;
    /// missing ones degrade the game, not the launch.
    async fn verify_installed(
        &self,
        detail: &VersionDetail,
        env: &RuleEnv,
    ) -> Result<(), EngineError> {
        let client = detail
            .client_artifact()
            .ok_or_else(|| EngineError::BadManifest {
                context: format!("version {} has no client download", detail.id),
                source: None,
            })?;

        let jar = self.store.client_jar_path(&detail.id);
        if !self.store.exists_with(&jar, client.size, &client.sha1).await {
            return Err(EngineError::NotInstalled(detail.id.clone()));
        }

        for library in &detail.libraries {
            if !rules::evaluate(library.rules(), env)? {
                continue;
            }
            if let Some(artifact) = library.main_artifact() {
                if let Some(rel) = artifact_rel_path(&library.name, artifact, None)? {
                    if !self.store.library_path(&rel).exists() {
                        return Err(EngineError::NotInstalled(detail.id.clone()));
                    }
                }
            }
            if let Some((classifier, artifact)) = library.native_artifact(env) {
                if let Some(rel) = artifact_rel_path(&library.name, artifact, Some(&classifier))? {
                    if !self.store.library_path(&rel).exists() {
                        return Err(EngineError::NotInstalled(detail.id.clone()));
                    }
                }
            }
        }

        if !self.store.asset_index_path(detail.assets_id()).exists() {
            return Err(EngineError::NotInstalled(detail.id.clone()));
        }

        Ok(())
    }

    /// Ordered classpath: every rule-allowed library's main artifact, then
    /// the client jar. Native classifier archives never appear here.
    fn classpath_entries(
        &self,
        detail: &VersionDetail,
        env: &RuleEnv,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let mut entries = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for library in &detail.libraries {
            if !rules::evaluate(library.rules(), env)? {
                continue;
            }
            let Some(artifact) = library.main_artifact() else {
                continue;
            };
            if let Some(rel) = artifact_rel_path(&library.name, artifact, None)? {
                let path = self.store.library_path(&rel);
                if seen.insert(path.clone()) {
                    entries.push(path);
                }
            }
        }

        entries.push(self.store.client_jar_path(&detail.id));
        Ok(entries)
    }

    async fn load_or_fetch_detail(&self, id: &str) -> Result<VersionDetail, EngineError> {
        let path = self.store.detail_path(id);
        if let Ok(bytes) = tokio::fs::read(&path).await {
            if self.local_detail_is_current(id, &bytes).await {
                match decode_detail(&bytes, &path.to_string_lossy()) {
                    Ok(detail) => {
                        log::debug!("Using locally stored detail for {}", id);
                        return Ok(detail);
                    }
                    Err(e) => {
                        log::warn!("Stored detail for {} is unreadable ({}), refetching", id, e);
                    }
                }
            } else {
                log::info!(
                    "Stored detail for {} no longer matches the index, refetching",
                    id
                );
            }
        }

        let entry = self.index_entry(id).await?;
        let bytes = self
            .manifest
            .fetch_detail_bytes(&entry.url, entry.sha1.as_deref())
            .await?;
        self.store.atomic_write(&path, &bytes).await?;
        decode_detail(&bytes, &entry.url)
    }

    /// Whether locally stored detail bytes still match the index entry's
    /// SHA-1. Trusts the local copy when the index carries no hash for the
    /// id, or cannot be consulted at all (offline relaunch of an installed
    /// version).
    async fn local_detail_is_current(&self, id: &str, bytes: &[u8]) -> bool {
        match self.index_entry(id).await {
            Ok(entry) => match entry.sha1 {
                Some(ref expected) => {
                    let computed = crate::store::sha1_hex(bytes);
                    if computed.eq_ignore_ascii_case(expected) {
                        true
                    } else {
                        log::warn!(
                            "Stored detail for {} hashes to {}, index says {}",
                            id,
                            computed,
                            expected
                        );
                        false
                    }
                }
                None => true,
            },
            Err(e) => {
                log::warn!(
                    "Could not verify stored detail for {} against the index ({}), using the local copy",
                    id,
                    e
                );
                true
            }
        }
    }

    /// Index lookup with one refresh when the cached index predates the id.
    async fn index_entry(&self, id: &str) -> Result<ManifestEntry, EngineError> {
        let mut cache = self.index_cache.lock().await;

        if cache.is_none() {
            *cache = Some(self.manifest.fetch_index().await?);
        }
        if let Some(entry) = cache.as_ref().and_then(|index| index.find(id)) {
            return Ok(entry.clone());
        }

        let fresh = self.manifest.fetch_index().await?;
        let found = fresh.find(id).cloned();
        *cache = Some(fresh);
        found.ok_or_else(|| EngineError::UnknownVersion(id.to_string()))
    }
}

enum Claim {
    Wait(watch::Receiver<bool>),
    Run(watch::Sender<bool>),
}
