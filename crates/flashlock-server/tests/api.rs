//! Router-level tests for the flash session protocol.
//!
//! Each test drives the real router with in-memory requests against a
//! vault provisioned into a temp directory.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rsa::RsaPrivateKey;
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock};
use tower::ServiceExt;

use flashlock_crypto::{
    aead, base64_std_decode, generate_keypair, generate_random_bytes, public_key_to_pem,
    unwrap_key, SecretKey,
};
use flashlock_proto::{CompleteResponse, ErrorBody, SessionResponse};
use flashlock_server::catalog::DeviceCatalog;
use flashlock_server::config::{Config, RunMode};
use flashlock_server::credits::CreditLedger;
use flashlock_server::state::AppState;
use flashlock_server::{create_router, vault};

const HWID: &str = "8EFC8F567BCCED17791359A306F0BA623D8B9EE3EA5F60C991BBAA086CF6CCFD";

const SYSTEM_IMAGE: &[u8] = b"system partition image contents";
const LOADER_IMAGE: &[u8] = b"usb loader image contents";

fn client_keypair() -> &'static RsaPrivateKey {
    static KEYPAIR: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEYPAIR.get_or_init(|| generate_keypair(2048).unwrap())
}

fn client_pem() -> String {
    public_key_to_pem(&client_keypair().to_public_key()).unwrap()
}

#[derive(Default)]
struct RecordingLedger {
    burns: Mutex<Vec<(String, u32)>>,
}

impl CreditLedger for RecordingLedger {
    fn record_burn(&self, session_id: &str, _device_type: &str, cost: u32) {
        self.burns
            .lock()
            .unwrap()
            .push((session_id.to_string(), cost));
    }
}

struct TestServer {
    app: Router,
    storage_dir: tempfile::TempDir,
    ledger: Arc<RecordingLedger>,
}

fn test_server(ttl_secs: u64) -> TestServer {
    let storage_dir = tempfile::tempdir().unwrap();
    let master_bytes: [u8; 32] = generate_random_bytes();
    let master = SecretKey::new(master_bytes);

    vault::provision_artifact(storage_dir.path(), &master, "system.bin", SYSTEM_IMAGE).unwrap();
    vault::provision_artifact(storage_dir.path(), &master, "usbloader-5577.bin", LOADER_IMAGE)
        .unwrap();

    let config = Config::from_parts(
        "127.0.0.1:0".parse().unwrap(),
        storage_dir.path().to_path_buf(),
        SecretKey::new(master_bytes),
        ttl_secs,
        DeviceCatalog::builtin(),
        RunMode::Dev,
    );

    let ledger = Arc::new(RecordingLedger::default());
    let state = AppState::new(config)
        .unwrap()
        .with_credit_ledger(ledger.clone());

    TestServer {
        app: create_router(Arc::new(state)),
        storage_dir,
        ledger,
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn create_session(app: &Router, hwid: &str, device_type: &str) -> (StatusCode, Vec<u8>) {
    send(
        app,
        Method::POST,
        "/api/flash/sessions",
        Some(json!({
            "HWID": hwid,
            "DeviceType": device_type,
            "ClientPublicKeyPem": client_pem(),
        })),
    )
    .await
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body).unwrap().error
}

#[tokio::test]
async fn test_happy_path_full_session_lifecycle() {
    let server = test_server(900);

    // Create.
    let (status, body) = create_session(&server.app, HWID, "MTK6580").await;
    assert_eq!(status, StatusCode::CREATED);
    let session: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(format!("{}", session.status), "Active");
    assert_eq!(session.firmware_files, vec!["system.bin", "usbloader-5577.bin"]);
    assert_eq!(session.credit_cost, 1);

    // Unwrap the session key the way the client would.
    let wrapped = base64_std_decode(&session.wrapped_session_key_base64).unwrap();
    let session_key = unwrap_key(client_keypair(), &wrapped).unwrap();

    // Fetch both artifacts; each blob must decrypt to the vault
    // plaintext under the session key.
    for (name, expected) in [("system.bin", SYSTEM_IMAGE), ("usbloader-5577.bin", LOADER_IMAGE)] {
        let uri = format!(
            "/api/flash/sessions/{}/firmware/{}?hwid={}",
            session.session_id, name, HWID
        );
        let (status, blob) = send(&server.app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let plaintext = aead::open(session_key.as_bytes(), &blob).unwrap();
        assert_eq!(plaintext.as_slice(), expected);
    }

    // Complete successfully: credits are deducted.
    let uri = format!("/api/flash/sessions/{}/complete", session.session_id);
    let (status, body) = send(
        &server.app,
        Method::POST,
        &uri,
        Some(json!({"HWID": HWID, "Success": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let complete: CompleteResponse = serde_json::from_slice(&body).unwrap();
    assert!(complete.success);
    assert!(complete.credits_deducted);
    assert_eq!(
        server.ledger.burns.lock().unwrap().as_slice(),
        &[(session.session_id.clone(), 1)]
    );

    // A fetch after the burn is a 400 naming the terminal status.
    let uri = format!(
        "/api/flash/sessions/{}/firmware/system.bin?hwid={}",
        session.session_id, HWID
    );
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("Burned"));

    // So is a second completion, reported as not accepted.
    let uri = format!("/api/flash/sessions/{}/complete", session.session_id);
    let (status, body) = send(
        &server.app,
        Method::POST,
        &uri,
        Some(json!({"HWID": HWID, "Success": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let complete: CompleteResponse = serde_json::from_slice(&body).unwrap();
    assert!(!complete.success);
    assert!(!complete.credits_deducted);
    assert_eq!(server.ledger.burns.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_hwid_mismatch_is_404_and_session_stays_active() {
    let server = test_server(900);
    let (_, body) = create_session(&server.app, HWID, "MTK6580").await;
    let session: SessionResponse = serde_json::from_slice(&body).unwrap();

    let uri = format!(
        "/api/flash/sessions/{}/firmware/system.bin?hwid=DIFFERENT",
        session.session_id
    );
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_message(&body), "session not found");

    // Same answer for a session that does not exist at all.
    let (status, _) = send(
        &server.app,
        Method::GET,
        &format!("/api/flash/sessions/no-such-session/firmware/system.bin?hwid={HWID}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The session is untouched.
    let uri = format!("/api/flash/sessions/{}?hwid={}", session.session_id, HWID);
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let read: SessionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(format!("{}", read.status), "Active");
    assert_eq!(
        read.wrapped_session_key_base64,
        session.wrapped_session_key_base64
    );
}

#[tokio::test]
async fn test_expired_session_rejects_fetch_and_completion() {
    let server = test_server(1);
    let (_, body) = create_session(&server.app, HWID, "MTK6580").await;
    let session: SessionResponse = serde_json::from_slice(&body).unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let uri = format!(
        "/api/flash/sessions/{}/firmware/system.bin?hwid={}",
        session.session_id, HWID
    );
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("Expired"));

    let uri = format!("/api/flash/sessions/{}/complete", session.session_id);
    let (status, body) = send(
        &server.app,
        Method::POST,
        &uri,
        Some(json!({"HWID": HWID, "Success": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let complete: CompleteResponse = serde_json::from_slice(&body).unwrap();
    assert!(!complete.success);
    assert!(!complete.credits_deducted);
}

#[tokio::test]
async fn test_tampered_artifact_is_an_integrity_failure() {
    let server = test_server(900);
    let (_, body) = create_session(&server.app, HWID, "MTK6580").await;
    let session: SessionResponse = serde_json::from_slice(&body).unwrap();

    // Corrupt one ciphertext byte after the session was minted; create
    // is lazy and must not have noticed.
    let path = server.storage_dir.path().join("system.bin.enc");
    let mut blob = std::fs::read(&path).unwrap();
    let index = blob.len() - 1;
    blob[index] ^= 0x01;
    std::fs::write(&path, blob).unwrap();

    let uri = format!(
        "/api/flash/sessions/{}/firmware/system.bin?hwid={}",
        session.session_id, HWID
    );
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(&body).contains("integrity"));

    // The untampered artifact still serves.
    let uri = format!(
        "/api/flash/sessions/{}/firmware/usbloader-5577.bin?hwid={}",
        session.session_id, HWID
    );
    let (status, _) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_rejects_bad_requests() {
    let server = test_server(900);

    // Empty fingerprint.
    let (status, _) = create_session(&server.app, "", "MTK6580").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown device type.
    let (status, body) = create_session(&server.app, HWID, "QUALCOMM9999").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("unknown device type"));

    // Garbage public key.
    let (status, _) = send(
        &server.app,
        Method::POST,
        "/api/flash/sessions",
        Some(json!({
            "HWID": HWID,
            "DeviceType": "MTK6580",
            "ClientPublicKeyPem": "garbage",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fetch_outside_manifest_is_rejected() {
    let server = test_server(900);
    let (_, body) = create_session(&server.app, HWID, "MTK6580").await;
    let session: SessionResponse = serde_json::from_slice(&body).unwrap();

    // usbloader-6739.bin exists for another device family but is not in
    // this session's manifest.
    let uri = format!(
        "/api/flash/sessions/{}/firmware/usbloader-6739.bin?hwid={}",
        session.session_id, HWID
    );
    let (status, body) = send(&server.app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("manifest"));
}

#[tokio::test]
async fn test_create_rejects_unprovisioned_device_type() {
    // MTK6739 needs usbloader-6739.bin, which test_server never writes.
    let server = test_server(900);
    let (status, body) = create_session(&server.app, HWID, "MTK6739").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("not fully provisioned"));
}
