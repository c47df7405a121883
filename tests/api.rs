//! End-to-end tests against a real listening server.
//!
//! Each test binds the full application to an ephemeral port and speaks
//! plain HTTP/1.1 over a TCP socket, so routing, middleware, body
//! streaming, and response framing are all exercised exactly as a client
//! would see them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use stowage::config::{AuthConfig, Config, ServerConfig, StorageConfig};
use stowage::gate::AdmissionGate;
use stowage::server::app;
use stowage::signer::Signer;
use stowage::storage::FsStore;
use stowage::AppState;

const ACCESS_KEY: &str = "integration-access-key";
const SECRET_KEY: &str = "integration-secret-key";

struct TestServer {
    addr: SocketAddr,
    _tempdir: tempfile::TempDir,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_server() -> TestServer {
    let tempdir = tempfile::tempdir().expect("failed to create temp dir");
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        auth: AuthConfig {
            access_key_id: ACCESS_KEY.to_string(),
            secret_access_key: SECRET_KEY.to_string(),
        },
        storage: StorageConfig {
            root: tempdir.path().display().to_string(),
        },
    };
    let store = FsStore::new(tempdir.path()).expect("failed to create store");
    let state = Arc::new(AppState {
        signer: Signer::new(config.auth.secret_access_key.as_bytes().to_vec()),
        config,
        store: Arc::new(store),
        gate: AdmissionGate::default(),
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("failed to read local addr");

    let router = app(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            eprintln!("server error: {err}");
        }
    });

    TestServer {
        addr,
        _tempdir: tempdir,
        _handle: handle,
    }
}

/// A parsed HTTP response.
struct HttpResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Send one request and read the full response (the connection is closed
/// after each exchange).  Handles both content-length and chunked bodies.
async fn send_request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.expect("failed to connect");

    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    stream
        .write_all(request.as_bytes())
        .await
        .expect("failed to write request head");
    stream.write_all(body).await.expect("failed to write body");

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .expect("failed to read response");

    parse_response(&raw)
}

fn parse_response(raw: &[u8]) -> HttpResponse {
    let header_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header terminator in response");
    let head = std::str::from_utf8(&raw[..header_end]).expect("response head not UTF-8");
    let mut lines = head.split("\r\n");

    let status_line = lines.next().expect("empty response");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .expect("no status code")
        .parse()
        .expect("unparseable status code");

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let mut body = raw[header_end + 4..].to_vec();
    if headers
        .get("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        body = decode_chunked(&body);
    }

    HttpResponse {
        status,
        headers,
        body,
    }
}

/// Decode a chunked transfer-encoded body.
fn decode_chunked(mut raw: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let line_end = raw
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("no chunk size line");
        let size_str = std::str::from_utf8(&raw[..line_end]).expect("chunk size not UTF-8");
        let size = usize::from_str_radix(size_str.trim(), 16).expect("bad chunk size");
        raw = &raw[line_end + 2..];
        if size == 0 {
            break;
        }
        body.extend_from_slice(&raw[..size]);
        raw = &raw[size + 2..];
    }
    body
}

fn auth() -> (&'static str, String) {
    ("Authorization", format!("{ACCESS_KEY}={SECRET_KEY}"))
}

async fn authed(
    addr: SocketAddr,
    method: &str,
    path: &str,
    extra: &[(&str, &str)],
    body: &[u8],
) -> HttpResponse {
    let (name, value) = auth();
    let mut headers = vec![(name, value.as_str())];
    headers.extend_from_slice(extra);
    send_request(addr, method, path, &headers, body).await
}

fn body_json(response: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).expect("response body is not JSON")
}

// ── bucket scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn bucket_create_head_delete() {
    let server = start_server().await;

    let response = authed(server.addr, "PUT", "/b1", &[], b"").await;
    assert_eq!(response.status, 200);

    let response = authed(server.addr, "HEAD", "/b1", &[], b"").await;
    assert_eq!(response.status, 200);

    let response = authed(server.addr, "DELETE", "/b1", &[], b"").await;
    assert_eq!(response.status, 204);

    let response = authed(server.addr, "HEAD", "/b1", &[], b"").await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn bucket_name_rules_over_http() {
    let server = start_server().await;

    // Length boundaries: 2 is too short, 3 and 63 are fine, 64 is too long.
    let name63 = "a".repeat(63);
    let name64 = "a".repeat(64);
    for (name, expected) in [
        ("ab", 400),
        ("abc", 200),
        (name63.as_str(), 200),
        (name64.as_str(), 400),
        ("-bad", 400),
        ("192.168.1.1", 400),
        ("a..b", 400),
    ] {
        let response = authed(server.addr, "PUT", &format!("/{name}"), &[], b"").await;
        assert_eq!(response.status, expected, "bucket name {name:?}");
    }
}

#[tokio::test]
async fn bucket_delete_refuses_until_empty() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/x", &[], b"payload").await;

    let response = authed(server.addr, "DELETE", "/b1", &[], b"").await;
    assert_eq!(response.status, 409);
    let json = body_json(&response);
    assert_eq!(json["code"], "409");
    assert_eq!(json["message"], "Bucket not empty");

    let response = authed(server.addr, "DELETE", "/b1/x", &[], b"").await;
    assert_eq!(response.status, 204);

    let response = authed(server.addr, "DELETE", "/b1", &[], b"").await;
    assert_eq!(response.status, 204);
}

// ── object scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn object_put_get_roundtrip_with_etag() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    let response = authed(
        server.addr,
        "PUT",
        "/b1/a/b.txt",
        &[("Content-Type", "text/plain")],
        b"hi",
    )
    .await;
    assert_eq!(response.status, 200);
    let json = body_json(&response);
    assert_eq!(json["key"], "a/b.txt");
    assert_eq!(json["size"], 2);
    assert_eq!(json["etag"], "\"49f68a5c8493ec2c0bf489821c21fc3b\"");

    let response = authed(server.addr, "GET", "/b1/a/b.txt", &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hi");
    assert_eq!(
        response.headers["etag"],
        "\"49f68a5c8493ec2c0bf489821c21fc3b\""
    );
    assert_eq!(response.headers["content-type"], "text/plain");
    assert!(response.headers.contains_key("last-modified"));
}

#[tokio::test]
async fn object_zero_byte_body() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    let response = authed(server.addr, "PUT", "/b1/empty", &[], b"").await;
    assert_eq!(response.status, 200);
    let json = body_json(&response);
    assert_eq!(json["size"], 0);
    assert_eq!(json["etag"], "\"d41d8cd98f00b204e9800998ecf8427e\"");
}

#[tokio::test]
async fn object_large_body_streams_intact() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    // 1 MiB of patterned data, large enough to cross many body chunks.
    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    let expected_etag = format!("\"{}\"", hex::encode(Md5::digest(&payload)));

    let response = authed(server.addr, "PUT", "/b1/blob.bin", &[], &payload).await;
    assert_eq!(response.status, 200);
    let json = body_json(&response);
    assert_eq!(json["size"], payload.len() as i64);
    assert_eq!(json["etag"], expected_etag.as_str());

    let response = authed(server.addr, "GET", "/b1/blob.bin", &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body.len(), payload.len());
    assert_eq!(response.body, payload);
}

#[tokio::test]
async fn object_key_rules_over_http() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    // Length boundaries: 1024 bytes is accepted, 1025 is not.
    let key1024 = "k".repeat(1024);
    let key1025 = "k".repeat(1025);
    let response = authed(server.addr, "PUT", &format!("/b1/{key1024}"), &[], b"x").await;
    assert_eq!(response.status, 200);
    let response = authed(server.addr, "PUT", &format!("/b1/{key1025}"), &[], b"x").await;
    assert_eq!(response.status, 400);

    let response = authed(server.addr, "PUT", "/b1/.hidden", &[], b"x").await;
    assert_eq!(response.status, 400);
    let json = body_json(&response);
    assert_eq!(json["message"], "key cannot start with .");
}

#[tokio::test]
async fn object_head_reports_metadata() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(
        server.addr,
        "PUT",
        "/b1/doc",
        &[("Content-Type", "application/json")],
        b"{\"a\":1}",
    )
    .await;

    let response = authed(server.addr, "HEAD", "/b1/doc", &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["content-length"], "7");
    assert_eq!(response.headers["content-type"], "application/json");
    assert!(response.headers["etag"].starts_with('"'));
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn object_overwrite_then_get_sees_latest() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/k", &[], b"version one").await;
    authed(server.addr, "PUT", "/b1/k", &[], b"two").await;

    let response = authed(server.addr, "GET", "/b1/k", &[], b"").await;
    assert_eq!(response.body, b"two");
}

#[tokio::test]
async fn object_concurrent_put_and_get_never_tears() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/k", &[], b"aaaaaaaaaa").await;

    // Overwrite while reading: the reader must observe one complete
    // version, never a mix or truncation.
    let addr = server.addr;
    let (put, get) = tokio::join!(
        authed(addr, "PUT", "/b1/k", &[], b"bbbb"),
        authed(addr, "GET", "/b1/k", &[], b""),
    );
    assert_eq!(put.status, 200);
    assert_eq!(get.status, 200);
    assert!(
        get.body == b"aaaaaaaaaa" || get.body == b"bbbb",
        "saw torn body: {:?}",
        String::from_utf8_lossy(&get.body)
    );
}

// ── listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn list_reflects_puts_and_deletes() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/logs/a", &[], b"1").await;
    authed(server.addr, "PUT", "/b1/logs/b", &[], b"22").await;
    authed(server.addr, "PUT", "/b1/other", &[], b"333").await;

    let response = authed(server.addr, "GET", "/b1", &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["content-type"], "application/json");
    let json = body_json(&response);
    assert_eq!(json["name"], "b1");
    assert_eq!(json["contents"].as_array().unwrap().len(), 3);

    let response = authed(server.addr, "GET", "/b1?prefix=logs/", &[], b"").await;
    let json = body_json(&response);
    let contents = json["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0]["key"], "logs/a");
    assert_eq!(contents[0]["size"], 1);
    assert!(contents[0]["etag"].as_str().unwrap().starts_with('"'));

    authed(server.addr, "DELETE", "/b1/logs/a", &[], b"").await;
    let response = authed(server.addr, "GET", "/b1?prefix=logs/", &[], b"").await;
    let json = body_json(&response);
    assert_eq!(json["contents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn list_trailing_slash_is_a_list() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/x", &[], b"x").await;

    let response = authed(server.addr, "GET", "/b1/", &[], b"").await;
    assert_eq!(response.status, 200);
    let json = body_json(&response);
    assert_eq!(json["contents"].as_array().unwrap().len(), 1);
}

// ── authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn requests_without_credentials_are_rejected() {
    let server = start_server().await;

    let response = send_request(server.addr, "PUT", "/b1", &[], b"").await;
    assert_eq!(response.status, 401);
    let json = body_json(&response);
    assert_eq!(json["code"], "401");

    let response = send_request(
        server.addr,
        "PUT",
        "/b1",
        &[("Authorization", "wrong=credentials")],
        b"",
    )
    .await;
    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn options_preflight_needs_no_credentials() {
    let server = start_server().await;

    let response = send_request(server.addr, "OPTIONS", "/b1/k", &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["access-control-allow-origin"], "*");
}

// ── presigned downloads ─────────────────────────────────────────────

fn presign_path(expiration: i64, bucket: &str, key: &str) -> String {
    let signature = Signer::new(SECRET_KEY.as_bytes().to_vec()).sign(expiration, bucket, key);
    format!("/presign/{bucket}/{key}?expiration={expiration}&signature={signature}")
}

#[tokio::test]
async fn presigned_url_grants_unauthenticated_read() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(
        server.addr,
        "PUT",
        "/b1/report.txt",
        &[("Content-Type", "text/plain")],
        b"signed content",
    )
    .await;

    let expiration = Utc::now().timestamp() + 300;
    let path = presign_path(expiration, "b1", "report.txt");

    // No Authorization header at all.
    let response = send_request(server.addr, "GET", &path, &[], b"").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"signed content");
    assert_eq!(response.headers["content-type"], "text/plain");
}

#[tokio::test]
async fn presigned_url_rejects_tampering_and_expiry() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;
    authed(server.addr, "PUT", "/b1/x", &[], b"data").await;

    let expiration = Utc::now().timestamp() + 300;

    // Signature for a different key does not open this one.
    let path = presign_path(expiration, "b1", "y");
    let swapped = path.replace("/presign/b1/y", "/presign/b1/x");
    let response = send_request(server.addr, "GET", &swapped, &[], b"").await;
    assert_eq!(response.status, 403);

    // Expired URL.
    let path = presign_path(Utc::now().timestamp() - 1, "b1", "x");
    let response = send_request(server.addr, "GET", &path, &[], b"").await;
    assert_eq!(response.status, 403);
    let json = body_json(&response);
    assert_eq!(json["message"], "URL has expired");

    // Missing parameters.
    let response = send_request(server.addr, "GET", "/presign/b1/x", &[], b"").await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn presigned_url_for_missing_object_is_404() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    let expiration = Utc::now().timestamp() + 300;
    let path = presign_path(expiration, "b1", "ghost");
    let response = send_request(server.addr, "GET", &path, &[], b"").await;
    assert_eq!(response.status, 404);
}

// ── error document shape ────────────────────────────────────────────

#[tokio::test]
async fn error_document_carries_code_resource_timestamp() {
    let server = start_server().await;
    authed(server.addr, "PUT", "/b1", &[], b"").await;

    let response = authed(server.addr, "GET", "/b1/missing", &[], b"").await;
    assert_eq!(response.status, 404);
    assert_eq!(response.headers["content-type"], "application/json");
    let json = body_json(&response);
    assert_eq!(json["code"], "404");
    assert_eq!(json["message"], "Object not found");
    assert_eq!(json["resource"], "b1/missing");
    // RFC 3339 UTC timestamp.
    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}
