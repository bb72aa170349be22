//! Turns a version detail into the flat list of files to fetch.
//!
//! Asset objects are deliberately absent here: they are only knowable once
//! the asset index itself has been fetched, so the fetch engine expands
//! them at run time.

use crate::error::EngineError;
use crate::manifest::types::{Artifact, VersionDetail};
use crate::maven;
use crate::platform::RuleEnv;
use crate::rules;
use crate::store::LocalStore;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    Client,
    AssetIndex,
    Library,
    Native,
    AssetObject,
}

/// One file to download and verify.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub url: String,
    /// Absolute destination inside the store.
    pub dest: PathBuf,
    /// Store-relative label for reporting.
    pub rel: String,
    pub sha1: String,
    pub size: u64,
    pub category: TaskCategory,
}

/// Plan the fetch tasks for a version: client jar, asset index, then each
/// rule-allowed library's artifacts in source order. Destinations are
/// unique; on a collision the first occurrence wins.
pub fn plan(
    detail: &VersionDetail,
    env: &RuleEnv,
    store: &LocalStore,
) -> Result<Vec<FetchTask>, EngineError> {
    let mut tasks = Vec::new();
    let mut seen = HashSet::new();

    let client = detail
        .client_artifact()
        .ok_or_else(|| EngineError::BadManifest {
            context: format!("version {} has no client download", detail.id),
            source: None,
        })?;

    push_unique(
        &mut tasks,
        &mut seen,
        FetchTask {
            url: client.url.clone(),
            dest: store.client_jar_path(&detail.id),
            rel: format!("versions/{}/{}.jar", detail.id, detail.id),
            sha1: client.sha1.clone(),
            size: client.size,
            category: TaskCategory::Client,
        },
    );

    let assets_id = detail.assets_id().to_string();
    push_unique(
        &mut tasks,
        &mut seen,
        FetchTask {
            url: detail.asset_index.url.clone(),
            dest: store.asset_index_path(&assets_id),
            rel: format!("assets/indexes/{}.json", assets_id),
            sha1: detail.asset_index.sha1.clone(),
            size: detail.asset_index.size,
            category: TaskCategory::AssetIndex,
        },
    );

    for library in &detail.libraries {
        if !rules::evaluate(library.rules(), env)? {
            log::debug!("Skipping library {} (rules)", library.name);
            continue;
        }

        if let Some(artifact) = library.main_artifact() {
            if let Some(rel) = artifact_rel_path(&library.name, artifact, None)? {
                push_unique(
                    &mut tasks,
                    &mut seen,
                    FetchTask {
                        url: artifact.url.clone(),
                        dest: store.library_path(&rel),
                        rel: format!("libraries/{}", rel),
                        sha1: artifact.sha1.clone(),
                        size: artifact.size,
                        category: TaskCategory::Library,
                    },
                );
            }
        }

        if let Some((classifier, artifact)) = library.native_artifact(env) {
            if let Some(rel) = artifact_rel_path(&library.name, artifact, Some(&classifier))? {
                push_unique(
                    &mut tasks,
                    &mut seen,
                    FetchTask {
                        url: artifact.url.clone(),
                        dest: store.library_path(&rel),
                        rel: format!("libraries/{}", rel),
                        sha1: artifact.sha1.clone(),
                        size: artifact.size,
                        category: TaskCategory::Native,
                    },
                );
            }
        }
    }

    Ok(tasks)
}

/// Repository-relative path for a library artifact: the metadata's own
/// `path` when present and safe, otherwise derived from the coordinate.
/// Returns `None` for metadata paths that try to escape the store.
pub fn artifact_rel_path(
    coordinate: &str,
    artifact: &Artifact,
    classifier: Option<&str>,
) -> Result<Option<String>, EngineError> {
    if let Some(ref rel) = artifact.path {
        if !is_safe_relative(rel) {
            log::error!("Rejecting artifact path from metadata: {}", rel);
            return Ok(None);
        }
        return Ok(Some(rel.clone()));
    }
    maven::to_jar_path(coordinate, classifier).map(Some)
}

fn is_safe_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !path.is_absolute()
        && !path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

fn push_unique(tasks: &mut Vec<FetchTask>, seen: &mut HashSet<PathBuf>, task: FetchTask) {
    if seen.insert(task.dest.clone()) {
        tasks.push(task);
    } else {
        log::debug!("Dropping duplicate fetch destination {:?}", task.dest);
    }
}
