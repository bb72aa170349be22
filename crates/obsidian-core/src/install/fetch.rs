//! Bounded-parallel, verifying, idempotent download engine.

use crate::config::{EngineConfig, MAX_PARALLEL_FETCHES};
use crate::error::EngineError;
use crate::events::CancelToken;
use crate::install::plan::{FetchTask, TaskCategory};
use crate::install::progress::ProgressAggregator;
use crate::manifest::types::AssetIndexFile;
use crate::store::{self, LocalStore};
use futures::StreamExt;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const BACKOFF_BASE_MS: u64 = 500;

/// One task that ended in a terminal failure.
#[derive(Debug)]
pub struct FetchFailure {
    pub rel: String,
    pub category: TaskCategory,
    pub error: EngineError,
}

/// Outcome of a fetch run. Failures are per-task; the caller decides which
/// categories are fatal to its operation.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub failures: Vec<FetchFailure>,
    pub warnings: Vec<String>,
}

impl FetchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }
}

pub struct FetchEngine<'a> {
    http: &'a reqwest::Client,
    store: &'a LocalStore,
    config: &'a EngineConfig,
}

impl<'a> FetchEngine<'a> {
    pub fn new(http: &'a reqwest::Client, store: &'a LocalStore, config: &'a EngineConfig) -> Self {
        Self {
            http,
            store,
            config,
        }
    }

    /// Execute a planned task list.
    ///
    /// The asset-index task runs first and alone; its document then expands
    /// into asset-object tasks. Everything else is dispatched across a
    /// bounded pool. Returns `Err` only for whole-operation failures
    /// (cancellation, strict-mode asset index loss); per-task failures are
    /// collected into the report.
    pub async fn run(
        &self,
        mut tasks: Vec<FetchTask>,
        progress: &ProgressAggregator,
        cancel: &CancelToken,
    ) -> Result<FetchReport, EngineError> {
        let mut report = FetchReport::default();

        let planned: u64 = tasks.iter().map(|t| t.size).sum();
        progress.add_total(planned);

        if let Some(pos) = tasks
            .iter()
            .position(|t| t.category == TaskCategory::AssetIndex)
        {
            let index_task = tasks.remove(pos);
            match self.run_asset_index(&index_task, progress, cancel).await {
                Ok(mut objects) => {
                    progress.add_total(objects.iter().map(|t| t.size).sum());
                    tasks.append(&mut objects);
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) if self.config.strict_assets => return Err(e),
                Err(e) => {
                    log::warn!(
                        "Asset index {} unavailable, continuing without asset objects: {}",
                        index_task.rel,
                        e
                    );
                    report
                        .warnings
                        .push(format!("asset index {}: {}", index_task.rel, e));
                }
            }
        }

        let limit = self.config.parallel_fetches.clamp(1, MAX_PARALLEL_FETCHES);
        let failures: Vec<FetchFailure> = futures::stream::iter(tasks)
            .map(|task| async move {
                match self.fetch_one(&task, progress, cancel).await {
                    Ok(()) => None,
                    Err(error) => {
                        log::warn!("Fetch failed for {}: {}", task.rel, error);
                        Some(FetchFailure {
                            rel: task.rel.clone(),
                            category: task.category,
                            error,
                        })
                    }
                }
            })
            .buffer_unordered(limit)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        report.failures.extend(failures);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        Ok(report)
    }

    /// Fetch and parse the asset index, then derive one task per distinct
    /// object destination.
    async fn run_asset_index(
        &self,
        index_task: &FetchTask,
        progress: &ProgressAggregator,
        cancel: &CancelToken,
    ) -> Result<Vec<FetchTask>, EngineError> {
        self.fetch_one(index_task, progress, cancel).await?;

        let bytes = tokio::fs::read(&index_task.dest)
            .await
            .map_err(|e| EngineError::io(&index_task.dest, e))?;
        let index: AssetIndexFile =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::BadManifest {
                context: format!("asset index {}", index_task.rel),
                source: Some(e),
            })?;

        let base = self.config.objects_base_url.trim_end_matches('/');
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for (logical, object) in &index.objects {
            let hash = object.hash.to_ascii_lowercase();
            if hash.len() != 40 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                log::warn!("Skipping asset {:?} with malformed hash {:?}", logical, hash);
                continue;
            }

            let dest = self.store.asset_object_path(&hash);
            // Many logical paths share one content hash; one download each.
            if !seen.insert(dest.clone()) {
                continue;
            }

            let prefix = &hash[..2];
            tasks.push(FetchTask {
                url: format!("{}/{}/{}", base, prefix, hash),
                dest,
                rel: format!("assets/objects/{}/{}", prefix, hash),
                sha1: hash.clone(),
                size: object.size,
                category: TaskCategory::AssetObject,
            });
        }

        log::info!(
            "Asset index {} expands to {} objects ({} logical paths)",
            index_task.rel,
            tasks.len(),
            index.objects.len()
        );

        Ok(tasks)
    }

    /// Bring one destination into the satisfied state: reuse it when its
    /// size and hash already match, otherwise delete and re-download with
    /// retries.
    async fn fetch_one(
        &self,
        task: &FetchTask,
        progress: &ProgressAggregator,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        if self.store.exists_with(&task.dest, task.size, &task.sha1).await {
            log::debug!("Already satisfied: {}", task.rel);
            progress.add(task.size);
            return Ok(());
        }

        // A file that exists but failed verification must not survive.
        self.store.remove_if_exists(&task.dest).await?;

        let mut reported: u64 = 0; // progress high-water mark across attempts
        let mut attempt: u32 = 0;
        let mut checksum_failures: u32 = 0;

        loop {
            match self
                .download_once(task, progress, &mut reported, cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(error) => {
                    if let EngineError::ChecksumMismatch { .. } = error {
                        checksum_failures += 1;
                        // One corrupt response is common; two means the
                        // source itself disagrees with the manifest.
                        if checksum_failures > 1 {
                            return Err(error);
                        }
                    } else if !error.is_transient() {
                        return Err(error);
                    }

                    if attempt >= self.config.max_retries {
                        return Err(error);
                    }
                    attempt += 1;

                    let delay = backoff_delay(attempt);
                    log::warn!(
                        "Fetch attempt {}/{} for {} failed: {}. Retrying in {:?}",
                        attempt,
                        self.config.max_retries,
                        task.rel,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;

                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                }
            }
        }
    }

    async fn download_once(
        &self,
        task: &FetchTask,
        progress: &ProgressAggregator,
        reported: &mut u64,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        if let Some(parent) = task.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::io(parent, e))?;
        }

        let response = self
            .http
            .get(&task.url)
            .send()
            .await
            .map_err(|e| EngineError::Network {
                url: task.url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                url: task.url.clone(),
            });
        }

        let tmp = store::part_path(&task.dest);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| EngineError::io(&tmp, e))?;
        let mut hasher = Sha1::new();
        let mut received: u64 = 0;

        let read_budget = Duration::from_millis(self.config.read_timeout_ms);
        let mut stream = response.bytes_stream();
        loop {
            // Inactivity budget applies per chunk; a stalled body read
            // aborts the attempt and goes through retry.
            let next = match tokio::time::timeout(read_budget, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(EngineError::Timeout {
                        url: task.url.clone(),
                    });
                }
            };
            let Some(chunk) = next else {
                break;
            };

            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(EngineError::Cancelled);
            }

            let chunk = chunk.map_err(|e| EngineError::Network {
                url: task.url.clone(),
                source: e,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| EngineError::io(&tmp, e))?;
            hasher.update(&chunk);

            received += chunk.len() as u64;
            // Report only bytes beyond what an earlier attempt already
            // counted, so retries keep the aggregate monotonic and exact.
            if received > *reported {
                progress.add(received - *reported);
                *reported = received;
            }
        }

        file.flush().await.map_err(|e| EngineError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| EngineError::io(&tmp, e))?;
        drop(file);

        let computed = format!("{:x}", hasher.finalize());
        if !computed.eq_ignore_ascii_case(&task.sha1) {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(EngineError::ChecksumMismatch {
                path: task.dest.clone(),
                expected: task.sha1.to_ascii_lowercase(),
                actual: computed,
            });
        }

        store::commit(&tmp, &task.dest).await?;

        if *reported < task.size {
            progress.add(task.size - *reported);
            *reported = task.size;
        }

        log::debug!("Fetched {} ({} bytes)", task.rel, received);
        Ok(())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1 << (attempt.saturating_sub(1)).min(6));
    let jitter = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((base as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_jitter_bounds() {
        for attempt in 1..=4u32 {
            let base = BACKOFF_BASE_MS * (1 << (attempt - 1));
            for _ in 0..32 {
                let delay = backoff_delay(attempt).as_millis() as u64;
                assert!(delay >= base * 3 / 4, "attempt {}: {} too small", attempt, delay);
                assert!(delay <= base * 5 / 4 + 1, "attempt {}: {} too large", attempt, delay);
            }
        }
    }
}
