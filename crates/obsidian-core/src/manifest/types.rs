//! Wire types for the version index, per-version detail and asset index
//! JSON documents.
//!
//! Decoding is lenient: unknown fields are ignored and argument elements
//! accept both the plain-string and the rule-annotated object shape.

use crate::platform::RuleEnv;
use crate::rules::Rule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a published version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum VersionKind {
    Release,
    Snapshot,
    OldBeta,
    OldAlpha,
    Unknown,
}

impl From<String> for VersionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "release" => VersionKind::Release,
            "snapshot" => VersionKind::Snapshot,
            "old_beta" => VersionKind::OldBeta,
            "old_alpha" => VersionKind::OldAlpha,
            other => {
                log::debug!("Unrecognized version kind {:?}", other);
                VersionKind::Unknown
            }
        }
    }
}

/// The top-level version index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<LatestPointers>,

    pub versions: Vec<ManifestEntry>,
}

impl ManifestIndex {
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|entry| entry.id == id)
    }

    pub fn latest_release(&self) -> Option<&str> {
        self.latest.as_ref().map(|l| l.release.as_str())
    }

    pub fn latest_snapshot(&self) -> Option<&str> {
        self.latest.as_ref().map(|l| l.snapshot.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPointers {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: VersionKind,

    /// Where the per-version detail JSON lives.
    pub url: String,

    pub time: DateTime<Utc>,

    pub release_time: DateTime<Utc>,

    /// Expected SHA-1 of the detail document (modern index shape).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// A single downloadable file: URL, expected size, expected SHA-1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    pub sha1: String,
    pub size: u64,

    /// Repository-relative destination, when the metadata spells it out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Reference to the asset index document for a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRules {
    /// Entry-name prefixes skipped during native extraction.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A dependency jar, regular or natives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Maven coordinate.
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,

    /// OS name -> native classifier, possibly templated with `${arch}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
}

impl Library {
    pub fn rules(&self) -> &[Rule] {
        self.rules.as_deref().unwrap_or(&[])
    }

    pub fn main_artifact(&self) -> Option<&Artifact> {
        self.downloads.as_ref().and_then(|d| d.artifact.as_ref())
    }

    /// Resolve the native classifier for the given environment, expanding
    /// the `${arch}` template some manifests use.
    pub fn native_classifier(&self, env: &RuleEnv) -> Option<String> {
        self.natives
            .as_ref()
            .and_then(|map| map.get(env.os.as_str()))
            .map(|clf| clf.replace("${arch}", env.arch.bits()))
    }

    /// The native archive artifact for the given environment, when both the
    /// natives map and the classifier table agree one exists.
    pub fn native_artifact(&self, env: &RuleEnv) -> Option<(String, &Artifact)> {
        let classifier = self.native_classifier(env)?;
        let artifact = self
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(&classifier))?;
        Some((classifier, artifact))
    }

    pub fn extract_excludes(&self) -> &[String] {
        self.extract
            .as_ref()
            .map(|e| e.exclude.as_slice())
            .unwrap_or(&[])
    }
}

/// One element of `arguments.game` / `arguments.jvm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Literal(String),

    Conditional { rules: Vec<Rule>, value: ArgValue },

    /// Anything else upstream might emit; treated as an empty value list.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Single(String),
    Many(Vec<String>),
}

impl ArgValue {
    pub fn parts(&self) -> Vec<&str> {
        match self {
            ArgValue::Single(s) => vec![s.as_str()],
            ArgValue::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentsSpec {
    #[serde(default)]
    pub game: Vec<Arg>,

    #[serde(default)]
    pub jvm: Vec<Arg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionRef {
    pub major_version: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// The per-version detail document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetail {
    pub id: String,

    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    pub main_class: String,

    pub asset_index: AssetIndexRef,

    /// Legacy assets id field; `asset_index.id` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,

    /// Role -> artifact. Always carries at least `client`.
    pub downloads: HashMap<String, Artifact>,

    #[serde(default)]
    pub libraries: Vec<Library>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<ArgumentsSpec>,

    /// Pre-structured-arguments versions carry a single space-joined string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionRef>,
}

impl VersionDetail {
    pub fn assets_id(&self) -> &str {
        self.assets.as_deref().unwrap_or(&self.asset_index.id)
    }

    pub fn client_artifact(&self) -> Option<&Artifact> {
        self.downloads.get("client")
    }

    pub fn java_major(&self) -> Option<u32> {
        self.java_version.as_ref().map(|j| j.major_version)
    }
}

fn default_kind() -> String {
    "release".to_string()
}

/// The asset index document: logical path -> content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIndexFile {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}
