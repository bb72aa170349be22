//! Locating a usable Java-compatible runtime executable.

use crate::error::EngineError;
use std::path::{Path, PathBuf};

/// Find a runtime executable: caller hint first, then `JAVA_HOME`, then
/// `PATH`. On Windows `javaw.exe` is preferred over `java.exe` so the game
/// runs without a console window.
pub fn locate_runtime(hint: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(root) = hint {
        if let Some(found) = probe_root(root) {
            log::debug!("Runtime from caller hint: {:?}", found);
            return Ok(found);
        }
        log::warn!("Runtime hint {:?} has no usable executable", root);
    }

    if let Ok(java_home) = std::env::var("JAVA_HOME") {
        if !java_home.is_empty() {
            if let Some(found) = probe_root(Path::new(&java_home)) {
                log::debug!("Runtime from JAVA_HOME: {:?}", found);
                return Ok(found);
            }
            log::warn!("JAVA_HOME {:?} has no usable executable", java_home);
        }
    }

    for name in executable_names() {
        if let Ok(found) = which::which(name) {
            if is_executable(&found) {
                log::debug!("Runtime from PATH: {:?}", found);
                return Ok(found);
            }
        }
    }

    Err(EngineError::NoRuntime)
}

/// Probe a runtime root for its launch executable. JDK layouts keep it in
/// `bin/`; macOS bundles nest it under `Contents/Home/bin`.
fn probe_root(root: &Path) -> Option<PathBuf> {
    for name in executable_names() {
        for candidate in [
            root.join("bin").join(name),
            root.join("Contents/Home/bin").join(name),
            root.join(name),
        ] {
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn executable_names() -> &'static [&'static str] {
    #[cfg(windows)]
    {
        &["javaw.exe", "java.exe"]
    }
    #[cfg(not(windows))]
    {
        &["java"]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn hint_root_with_bin_layout_wins() {
        let tmp = tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("java");
        make_executable(&exe);

        let found = locate_runtime(Some(tmp.path())).unwrap();
        assert_eq!(found, exe);
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_rejected() {
        let tmp = tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("java"), b"not executable").unwrap();

        assert!(!is_executable(&bin.join("java")));
    }

    #[cfg(unix)]
    #[test]
    fn macos_bundle_layout_probed() {
        let tmp = tempdir().unwrap();
        let bin = tmp.path().join("Contents/Home/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("java");
        make_executable(&exe);

        assert_eq!(probe_root(tmp.path()).unwrap(), exe);
    }

    #[test]
    fn empty_hint_falls_through() {
        let tmp = tempdir().unwrap();
        // No executable anywhere under the hint; outcome then depends on the
        // host environment, so only assert it doesn't pick the empty hint.
        if let Ok(found) = locate_runtime(Some(tmp.path())) {
            assert!(!found.starts_with(tmp.path()));
        }
    }
}
