//! HTTP client for the version index and per-version detail documents.

use crate::error::EngineError;
use crate::manifest::types::{Arg, ArgumentsSpec, ManifestIndex, VersionDetail};
use sha1::{Digest, Sha1};

pub struct ManifestClient {
    http: reqwest::Client,
    index_url: String,
    request_timeout: std::time::Duration,
    max_retries: u32,
}

impl ManifestClient {
    pub fn new(
        http: reqwest::Client,
        index_url: impl Into<String>,
        request_timeout: std::time::Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            http,
            index_url: index_url.into(),
            request_timeout,
            max_retries,
        }
    }

    /// Fetch and decode the version index.
    pub async fn fetch_index(&self) -> Result<ManifestIndex, EngineError> {
        log::debug!("Fetching version index from {}", self.index_url);
        let bytes = self.get_bytes(&self.index_url).await?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::BadManifest {
            context: format!("version index at {}", self.index_url),
            source: Some(e),
        })
    }

    /// Fetch the raw detail document, verifying its SHA-1 when the index
    /// provided one.
    pub async fn fetch_detail_bytes(
        &self,
        url: &str,
        expected_sha1: Option<&str>,
    ) -> Result<Vec<u8>, EngineError> {
        log::debug!("Fetching version detail from {}", url);
        let bytes = self.get_bytes(url).await?;

        if let Some(expected) = expected_sha1 {
            let mut hasher = Sha1::new();
            hasher.update(&bytes);
            let computed = format!("{:x}", hasher.finalize());
            if !computed.eq_ignore_ascii_case(expected) {
                return Err(EngineError::ChecksumMismatch {
                    path: url.into(),
                    expected: expected.to_ascii_lowercase(),
                    actual: computed,
                });
            }
        }

        Ok(bytes)
    }

    /// Fetch and decode a version detail document.
    pub async fn fetch_detail(
        &self,
        url: &str,
        expected_sha1: Option<&str>,
    ) -> Result<VersionDetail, EngineError> {
        let bytes = self.fetch_detail_bytes(url, expected_sha1).await?;
        decode_detail(&bytes, url)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let mut retries = 0u32;
        loop {
            match self.get_bytes_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    log::warn!(
                        "Manifest fetch failed (attempt {}/{}): {}. Retrying...",
                        retries,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(1000 * retries as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_bytes_once(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    EngineError::Network {
                        url: url.to_string(),
                        source: e,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| EngineError::Network {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Decode a detail document and normalize its argument shape.
pub fn decode_detail(bytes: &[u8], origin: &str) -> Result<VersionDetail, EngineError> {
    let mut detail: VersionDetail =
        serde_json::from_slice(bytes).map_err(|e| EngineError::BadManifest {
            context: format!("version detail at {}", origin),
            source: Some(e),
        })?;
    normalize_arguments(&mut detail);
    Ok(detail)
}

/// Versions predating structured arguments carry a single space-joined
/// string. Tokenize it into `arguments.game` and synthesize an empty JVM
/// list so downstream code only ever sees the structured shape. The split
/// is a best-effort fallback; old versions never quote their tokens.
fn normalize_arguments(detail: &mut VersionDetail) {
    if detail.arguments.is_some() {
        return;
    }

    let Some(legacy) = detail.minecraft_arguments.clone() else {
        return;
    };

    log::debug!(
        "Version {} uses legacy argument string, tokenizing",
        detail.id
    );

    let game: Vec<Arg> = legacy
        .split_whitespace()
        .map(|token| Arg::Literal(token.to_string()))
        .collect();

    detail.arguments = Some(ArgumentsSpec { game, jvm: vec![] });
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_MODERN: &str = r#"{
        "id": "1.20.4",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "12",
        "assetIndex": {"id": "12", "sha1": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                       "size": 10, "url": "https://example/12.json"},
        "downloads": {"client": {"url": "https://example/client.jar",
                                 "sha1": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "size": 100}},
        "libraries": [],
        "arguments": {"game": ["--username", "${auth_player_name}"], "jvm": ["-cp", "${classpath}"]},
        "unknownFutureField": {"ignored": true}
    }"#;

    const DETAIL_LEGACY: &str = r#"{
        "id": "1.7.10",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "1.7.10",
        "assetIndex": {"id": "1.7.10", "sha1": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                       "size": 10, "url": "https://example/1.7.10.json"},
        "downloads": {"client": {"url": "https://example/client.jar",
                                 "sha1": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "size": 100}},
        "minecraftArguments": "--username ${auth_player_name} --version ${version_name}"
    }"#;

    #[test]
    fn modern_detail_decodes_with_unknown_fields() {
        let detail = decode_detail(DETAIL_MODERN.as_bytes(), "test").unwrap();
        assert_eq!(detail.id, "1.20.4");
        assert_eq!(detail.assets_id(), "12");
        assert!(detail.client_artifact().is_some());
        let args = detail.arguments.unwrap();
        assert_eq!(args.game.len(), 2);
        assert_eq!(args.jvm.len(), 2);
    }

    #[test]
    fn legacy_detail_gets_tokenized_game_arguments() {
        let detail = decode_detail(DETAIL_LEGACY.as_bytes(), "test").unwrap();
        let args = detail.arguments.unwrap();
        assert!(args.jvm.is_empty());
        let tokens: Vec<_> = args
            .game
            .iter()
            .map(|a| match a {
                Arg::Literal(s) => s.as_str(),
                other => panic!("expected literal, got {:?}", other),
            })
            .collect();
        assert_eq!(
            tokens,
            vec![
                "--username",
                "${auth_player_name}",
                "--version",
                "${version_name}"
            ]
        );
    }

    #[test]
    fn missing_required_field_is_bad_manifest() {
        let err = decode_detail(br#"{"id": "x"}"#, "test").unwrap_err();
        assert!(matches!(err, EngineError::BadManifest { .. }));
    }
}
