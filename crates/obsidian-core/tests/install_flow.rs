//! Install flows against a recorded-fixture HTTP server.

use obsidian_core::{cancel_pair, CancelToken, Engine, EngineConfig, EngineEvent, EventSink};
use sha1::{Digest, Sha1};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_BYTES: &[u8] = b"client-jar-fixture-content-0123456789";
const LIB_BYTES: &[u8] = b"brigadier-library-fixture";
const ASSET_A: &[u8] = b"ogg-fixture-aaaa";
const ASSET_B: &[u8] = b"png-fixture-bb";

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct Fixture {
    server: MockServer,
    store: TempDir,
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl Fixture {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();

        let hash_a = sha1_hex(ASSET_A);
        let hash_b = sha1_hex(ASSET_B);
        let asset_index = serde_json::json!({
            "objects": {
                "minecraft/sounds/one.ogg": {"hash": hash_a, "size": ASSET_A.len()},
                "minecraft/sounds/two.ogg": {"hash": hash_a, "size": ASSET_A.len()},
                "minecraft/icons/icon.png": {"hash": hash_b, "size": ASSET_B.len()}
            }
        });
        let asset_index_bytes = serde_json::to_vec(&asset_index).unwrap();

        let detail = serde_json::json!({
            "id": "1.20.4",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "assets": "12",
            "assetIndex": {
                "id": "12",
                "sha1": sha1_hex(&asset_index_bytes),
                "size": asset_index_bytes.len(),
                "url": format!("{}/assets/12.json", base)
            },
            "downloads": {
                "client": {
                    "url": format!("{}/client.jar", base),
                    "sha1": sha1_hex(CLIENT_BYTES),
                    "size": CLIENT_BYTES.len()
                }
            },
            "libraries": [
                {
                    "name": "com.mojang:brigadier:1.0.18",
                    "downloads": {"artifact": {
                        "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                        "url": format!("{}/lib/brigadier.jar", base),
                        "sha1": sha1_hex(LIB_BYTES),
                        "size": LIB_BYTES.len()
                    }}
                }
            ],
            "arguments": {"game": ["--version", "${version_name}"], "jvm": ["-cp", "${classpath}"]}
        });
        let detail_bytes = serde_json::to_vec(&detail).unwrap();

        let index = serde_json::json!({
            "latest": {"release": "1.20.4", "snapshot": "1.20.4"},
            "versions": [{
                "id": "1.20.4",
                "type": "release",
                "url": format!("{}/v/1.20.4.json", base),
                "time": "2024-01-01T00:00:00+00:00",
                "releaseTime": "2024-01-01T00:00:00+00:00",
                "sha1": sha1_hex(&detail_bytes)
            }]
        });

        mount_raw(&server, "/manifest.json", serde_json::to_vec(&index).unwrap()).await;
        mount_raw(&server, "/v/1.20.4.json", detail_bytes).await;
        mount_raw(&server, "/client.jar", CLIENT_BYTES.to_vec()).await;
        mount_raw(&server, "/lib/brigadier.jar", LIB_BYTES.to_vec()).await;
        mount_raw(&server, "/assets/12.json", asset_index_bytes).await;
        mount_raw(
            &server,
            &format!("/objects/{}/{}", &hash_a[..2], hash_a),
            ASSET_A.to_vec(),
        )
        .await;
        mount_raw(
            &server,
            &format!("/objects/{}/{}", &hash_b[..2], hash_b),
            ASSET_B.to_vec(),
        )
        .await;

        Self {
            server,
            store: TempDir::new().unwrap(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn engine(&self) -> Engine {
        self.engine_with(|_| {})
    }

    fn engine_with(&self, tweak: impl FnOnce(&mut EngineConfig)) -> Engine {
        let mut config = EngineConfig::new(self.store.path());
        config.index_url = format!("{}/manifest.json", self.server.uri());
        config.objects_base_url = format!("{}/objects", self.server.uri());
        tweak(&mut config);
        Engine::new(config).unwrap()
    }

    fn sink(&self) -> EventSink {
        let events = self.events.clone();
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    async fn request_count(&self, url_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == url_path)
            .count()
    }
}

async fn mount_raw(server: &MockServer, url_path: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "application/octet-stream"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn clean_install_of_a_modern_release() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    let report = engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    assert!(report.warnings.is_empty());

    let store = engine.store();
    let jar = store.client_jar_path("1.20.4");
    assert!(jar.exists());
    assert!(
        store
            .exists_with(&jar, CLIENT_BYTES.len() as u64, &sha1_hex(CLIENT_BYTES))
            .await
    );
    assert!(store
        .library_path("com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar")
        .exists());
    assert!(store.asset_index_path("12").exists());
    assert!(store.asset_object_path(&sha1_hex(ASSET_A)).exists());
    assert!(store.asset_object_path(&sha1_hex(ASSET_B)).exists());

    // Final progress event reports completion.
    let events = fixture.events.lock().unwrap();
    let last_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            EngineEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .expect("no progress events emitted");
    assert_eq!(last_progress, 1.0);
}

#[tokio::test]
async fn shared_asset_hash_is_fetched_once() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();

    // Two logical paths share one content hash; the object downloads once.
    let hash = sha1_hex(ASSET_A);
    let object_path = format!("/objects/{}/{}", &hash[..2], hash);
    assert_eq!(fixture.request_count(&object_path).await, 1);
}

#[tokio::test]
async fn reinstall_performs_no_artifact_body_gets() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    let report = engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    assert!(report.warnings.is_empty());

    for artifact in ["/client.jar", "/lib/brigadier.jar", "/assets/12.json"] {
        assert_eq!(
            fixture.request_count(artifact).await,
            1,
            "{} fetched more than once",
            artifact
        );
    }
    let hash = sha1_hex(ASSET_B);
    assert_eq!(
        fixture
            .request_count(&format!("/objects/{}/{}", &hash[..2], hash))
            .await,
        1
    );
}

#[tokio::test]
async fn stale_local_detail_is_refetched() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(fixture.request_count("/v/1.20.4.json").await, 1);

    // Well-formed JSON that no longer hashes to what the index declares.
    let detail_path = engine.store().detail_path("1.20.4");
    let mut doctored: serde_json::Value =
        serde_json::from_slice(&tokio::fs::read(&detail_path).await.unwrap()).unwrap();
    doctored["mainClass"] = serde_json::Value::String("com.evil.Main".to_string());
    tokio::fs::write(&detail_path, serde_json::to_vec(&doctored).unwrap())
        .await
        .unwrap();

    // inspect must not trust the doctored copy.
    let inspected = engine.inspect("1.20.4").await.unwrap();
    assert_eq!(inspected.main_class, "net.minecraft.client.main.Main");
    assert_eq!(fixture.request_count("/v/1.20.4.json").await, 2);

    // A reinstall refetches the detail and rewrites the stored file, while
    // the verified artifacts are still not re-downloaded.
    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    let restored: serde_json::Value =
        serde_json::from_slice(&tokio::fs::read(&detail_path).await.unwrap()).unwrap();
    assert_eq!(restored["mainClass"], "net.minecraft.client.main.Main");
    assert_eq!(fixture.request_count("/v/1.20.4.json").await, 3);
    assert_eq!(fixture.request_count("/client.jar").await, 1);
}

#[tokio::test]
async fn truncated_client_jar_is_redownloaded() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    // Pre-populate the client jar with half its bytes.
    let jar = engine.store().client_jar_path("1.20.4");
    tokio::fs::create_dir_all(jar.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&jar, &CLIENT_BYTES[..CLIENT_BYTES.len() / 2])
        .await
        .unwrap();

    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();

    assert!(
        engine
            .store()
            .exists_with(&jar, CLIENT_BYTES.len() as u64, &sha1_hex(CLIENT_BYTES))
            .await
    );
    assert_eq!(fixture.request_count("/client.jar").await, 1);
}

#[tokio::test]
async fn corrupted_library_is_replaced() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    // Right size, wrong content.
    let lib = engine
        .store()
        .library_path("com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar");
    tokio::fs::create_dir_all(lib.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&lib, vec![0u8; LIB_BYTES.len()]).await.unwrap();

    engine
        .install("1.20.4", fixture.sink(), CancelToken::never())
        .await
        .unwrap();

    assert!(
        engine
            .store()
            .exists_with(&lib, LIB_BYTES.len() as u64, &sha1_hex(LIB_BYTES))
            .await
    );
    assert_eq!(fixture.request_count("/lib/brigadier.jar").await, 1);
}

#[tokio::test]
async fn corrupt_response_retries_once_and_recovers() {
    let fixture = Fixture::new().await;

    // A second server whose first client-jar response is corrupt.
    let flaky = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/client.jar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"garbage-bytes-with-same-length-....".to_vec(), "application/octet-stream"),
        )
        .up_to_n_times(1)
        .mount(&flaky)
        .await;
    mount_raw(&flaky, "/client.jar", CLIENT_BYTES.to_vec()).await;

    // Point the detail's client URL at the flaky server by rebuilding the
    // manifest chain on the main server.
    let detail = serde_json::json!({
        "id": "1.20.4-flaky",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "12f",
        "assetIndex": {
            "id": "12f",
            "sha1": sha1_hex(b"{\"objects\": {}}"),
            "size": 15,
            "url": format!("{}/assets/12f.json", flaky.uri())
        },
        "downloads": {"client": {
            "url": format!("{}/client.jar", flaky.uri()),
            "sha1": sha1_hex(CLIENT_BYTES),
            "size": CLIENT_BYTES.len()
        }},
        "libraries": []
    });
    let detail_bytes = serde_json::to_vec(&detail).unwrap();
    mount_raw(&flaky, "/assets/12f.json", b"{\"objects\": {}}".to_vec()).await;
    mount_raw(&flaky, "/v/1.20.4-flaky.json", detail_bytes.clone()).await;
    let index = serde_json::json!({
        "versions": [{
            "id": "1.20.4-flaky",
            "type": "release",
            "url": format!("{}/v/1.20.4-flaky.json", flaky.uri()),
            "time": "2024-01-01T00:00:00+00:00",
            "releaseTime": "2024-01-01T00:00:00+00:00",
            "sha1": sha1_hex(&detail_bytes)
        }]
    });
    mount_raw(&flaky, "/manifest.json", serde_json::to_vec(&index).unwrap()).await;

    let mut config = EngineConfig::new(fixture.store.path());
    config.index_url = format!("{}/manifest.json", flaky.uri());
    config.objects_base_url = format!("{}/objects", flaky.uri());
    let engine = Engine::new(config).unwrap();

    engine
        .install("1.20.4-flaky", fixture.sink(), CancelToken::never())
        .await
        .unwrap();

    // One corrupt body, one good one.
    let requests = flaky.received_requests().await.unwrap_or_default();
    let jar_gets = requests
        .iter()
        .filter(|r| r.url.path() == "/client.jar")
        .count();
    assert_eq!(jar_gets, 2);

    let jar = engine.store().client_jar_path("1.20.4-flaky");
    assert!(
        engine
            .store()
            .exists_with(&jar, CLIENT_BYTES.len() as u64, &sha1_hex(CLIENT_BYTES))
            .await
    );
}

#[tokio::test]
async fn missing_asset_index_is_a_warning_by_default() {
    let fixture = Fixture::new().await;

    let server = MockServer::start().await;
    let detail = serde_json::json!({
        "id": "1.20.4-noassets",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "99",
        "assetIndex": {
            "id": "99",
            "sha1": "0000000000000000000000000000000000000000",
            "size": 10,
            "url": format!("{}/assets/99.json", server.uri())
        },
        "downloads": {"client": {
            "url": format!("{}/client.jar", server.uri()),
            "sha1": sha1_hex(CLIENT_BYTES),
            "size": CLIENT_BYTES.len()
        }},
        "libraries": []
    });
    let detail_bytes = serde_json::to_vec(&detail).unwrap();
    let index = serde_json::json!({
        "versions": [{
            "id": "1.20.4-noassets",
            "type": "release",
            "url": format!("{}/v/d.json", server.uri()),
            "time": "2024-01-01T00:00:00+00:00",
            "releaseTime": "2024-01-01T00:00:00+00:00",
            "sha1": sha1_hex(&detail_bytes)
        }]
    });
    mount_raw(&server, "/manifest.json", serde_json::to_vec(&index).unwrap()).await;
    mount_raw(&server, "/v/d.json", detail_bytes).await;
    mount_raw(&server, "/client.jar", CLIENT_BYTES.to_vec()).await;
    Mock::given(method("GET"))
        .and(path("/assets/99.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = EngineConfig::new(fixture.store.path());
    config.index_url = format!("{}/manifest.json", server.uri());
    config.objects_base_url = format!("{}/objects", server.uri());
    config.max_retries = 0;
    let engine = Engine::new(config).unwrap();

    let report = engine
        .install("1.20.4-noassets", fixture.sink(), CancelToken::never())
        .await
        .unwrap();
    assert_eq!(report.warnings.len(), 1);

    // Strict mode turns the same situation into a failure.
    let strict_store = TempDir::new().unwrap();
    let mut config = EngineConfig::new(strict_store.path());
    config.index_url = format!("{}/manifest.json", server.uri());
    config.objects_base_url = format!("{}/objects", server.uri());
    config.max_retries = 0;
    config.strict_assets = true;
    let strict = Engine::new(config).unwrap();
    let err = strict
        .install("1.20.4-noassets", fixture.sink(), CancelToken::never())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn cancelled_install_reports_cancelled() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    let (handle, token) = cancel_pair();
    handle.cancel();

    let err = engine
        .install("1.20.4", fixture.sink(), token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "cancelled");
    assert_eq!(err.exit_code(), 7);
}

#[tokio::test]
async fn unknown_version_is_rejected() {
    let fixture = Fixture::new().await;
    let engine = fixture.engine();

    let err = engine
        .install("9.99.9", fixture.sink(), CancelToken::never())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unknown_version");
}

#[tokio::test]
async fn concurrent_installs_of_one_id_converge() {
    let fixture = Fixture::new().await;
    let engine = Arc::new(fixture.engine());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let sink = fixture.sink();
        handles.push(tokio::spawn(async move {
            engine.install("1.20.4", sink, CancelToken::never()).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Concurrent callers join the in-flight run; each artifact body still
    // travels the wire exactly once.
    assert_eq!(fixture.request_count("/client.jar").await, 1);
    assert_eq!(fixture.request_count("/lib/brigadier.jar").await, 1);
}
