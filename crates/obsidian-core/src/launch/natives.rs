//! Per-launch staging of platform-native libraries.

use crate::error::EngineError;
use crate::install::plan::artifact_rel_path;
use crate::manifest::types::VersionDetail;
use crate::platform::RuleEnv;
use crate::rules;
use crate::store::LocalStore;
use std::path::{Component, Path, PathBuf};

/// Extract every rule-allowed native archive for this platform into
/// `out_dir`, in library source order. Later archives may replace files
/// from earlier ones; each replacement is logged.
pub async fn stage_natives(
    detail: &VersionDetail,
    store: &LocalStore,
    env: &RuleEnv,
    out_dir: &Path,
) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| EngineError::io(out_dir, e))?;

    for library in &detail.libraries {
        if !rules::evaluate(library.rules(), env)? {
            continue;
        }

        let Some((classifier, artifact)) = library.native_artifact(env) else {
            continue;
        };

        let Some(rel) = artifact_rel_path(&library.name, artifact, Some(&classifier))? else {
            continue;
        };
        let archive_path = store.library_path(&rel);

        let bytes = match tokio::fs::read(&archive_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    "Native archive missing for {}: {:?} ({})",
                    library.name,
                    archive_path,
                    e
                );
                continue;
            }
        };

        let excludes = library.extract_excludes().to_vec();
        let out = out_dir.to_path_buf();
        let name = library.name.clone();
        tokio::task::spawn_blocking(move || extract_archive(&bytes, &out, &excludes, &name))
            .await
            .map_err(|e| {
                EngineError::io(out_dir, std::io::Error::new(std::io::ErrorKind::Other, e))
            })??;
    }

    Ok(())
}

fn extract_archive(
    zip_bytes: &[u8],
    dest: &Path,
    excludes: &[String],
    library_name: &str,
) -> Result<(), EngineError> {
    use std::io::Cursor;

    let cursor = Cursor::new(zip_bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| {
        EngineError::io(dest, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Unreadable entry {} in {}: {}", i, library_name, e);
                continue;
            }
        };
        let entry_name = entry.name().to_string();

        if excludes.iter().any(|prefix| entry_name.starts_with(prefix)) {
            continue;
        }

        let Some(relative) = sanitize_entry_name(&entry_name) else {
            log::warn!("Skipping unsafe entry {:?} in {}", entry_name, library_name);
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| EngineError::io(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }

        if outpath.exists() {
            log::warn!(
                "Overwriting staged native {:?} with copy from {}",
                outpath,
                library_name
            );
        }

        let mut outfile = std::fs::File::create(&outpath).map_err(|e| EngineError::io(&outpath, e))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| EngineError::io(&outpath, e))?;
    }

    Ok(())
}

/// Zip entry names come from the archive, not from us; keep them inside the
/// staging directory.
fn sanitize_entry_name(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return None;
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return None;
    }
    Some(path.to_path_buf())
}
