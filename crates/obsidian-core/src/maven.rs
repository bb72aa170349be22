//! Maven coordinate handling.
//!
//! Coordinates are `group:artifact:version`; the group's dots become path
//! separators, everything else is verbatim. A classifier, when one applies
//! (native archives), is passed separately rather than smuggled into the
//! coordinate.

use crate::error::EngineError;

/// Convert a coordinate to a repository-relative path.
///
/// `"com.google.guava:guava:21.0"` -> `"com/google/guava/guava/21.0/guava-21.0.jar"`.
/// With classifier `natives-linux` the filename becomes
/// `guava-21.0-natives-linux.jar`.
pub fn to_path(coord: &str, classifier: Option<&str>, ext: &str) -> Result<String, EngineError> {
    let parts: Vec<&str> = coord.split(':').collect();

    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(EngineError::BadCoordinate(coord.to_string()));
    }

    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let version = parts[2];

    let filename = match classifier {
        Some(clf) if !clf.is_empty() => format!("{}-{}-{}{}", artifact, version, clf, ext),
        _ => format!("{}-{}{}", artifact, version, ext),
    };

    Ok(format!("{}/{}/{}/{}", group, artifact, version, filename))
}

/// Shorthand for the common `.jar` case.
pub fn to_jar_path(coord: &str, classifier: Option<&str>) -> Result<String, EngineError> {
    to_path(coord, classifier, ".jar")
}

/// Recover a classifier-less coordinate from a repository-relative path
/// produced by [`to_path`].
pub fn from_path(rel: &str) -> Result<String, EngineError> {
    let segments: Vec<&str> = rel.split('/').collect();
    if segments.len() < 4 {
        return Err(EngineError::BadCoordinate(rel.to_string()));
    }

    let filename = segments[segments.len() - 1];
    let version = segments[segments.len() - 2];
    let artifact = segments[segments.len() - 3];
    let group = segments[..segments.len() - 3].join(".");

    let expected = format!("{}-{}.jar", artifact, version);
    if filename != expected || group.is_empty() {
        return Err(EngineError::BadCoordinate(rel.to_string()));
    }

    Ok(format!("{}:{}:{}", group, artifact, version))
}
