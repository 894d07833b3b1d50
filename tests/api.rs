use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use choretrack::auth::StaticTokens;
use choretrack::db::Database;
use choretrack::notify::Notifier;
use choretrack::photos::PhotoStore;
use choretrack::repository::ChoreRepository;
use choretrack::server::{build_router, AppState};
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    upload_root: PathBuf,
    alice: i64,
    bob: i64,
    _dir: TempDir,
}

async fn spawn_server() -> TestServer {
    let dir = tempdir().expect("tempdir");
    let db = Database::open(&dir.path().join("chores.db")).expect("open db");
    db.initialize().expect("init db");

    let mut tokens = BTreeMap::new();
    tokens.insert(ALICE.to_string(), "alice".to_string());
    tokens.insert(BOB.to_string(), "bob".to_string());
    let auth = StaticTokens::provision(&db, &tokens).expect("provision tokens");
    let alice = db.find_user("alice").expect("query").expect("alice").id;
    let bob = db.find_user("bob").expect("query").expect("bob").id;

    let upload_root = dir.path().join("public");
    let photos = PhotoStore::new(upload_root.clone(), "uploads/photos");
    let repo = ChoreRepository::new(Arc::new(db), photos, Arc::new(Notifier::new()));
    let state = AppState::new(Arc::new(repo), Arc::new(auth)).with_expose_errors(false);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        addr,
        state,
        upload_root,
        alice,
        bob,
        _dir: dir,
    }
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\n");
    req.push_str("Connection: close\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    if !body.is_empty() {
        req.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    req.push_str("\r\n");
    let mut bytes = req.into_bytes();
    bytes.extend_from_slice(body);
    stream.write_all(&bytes).await.expect("write request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn call(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let auth = token.map(|t| format!("Bearer {t}"));
    let mut headers = Vec::new();
    if let Some(auth) = auth.as_deref() {
        headers.push(("Authorization", auth));
    }
    let payload = match body {
        Some(body) => {
            headers.push(("Content-Type", "application/json"));
            serde_json::to_vec(&body).expect("encode body")
        }
        None => Vec::new(),
    };
    let (status, _, text) = send_raw(addr, method, path, &headers, &payload).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("json body")
    };
    (status, value)
}

async fn create(addr: SocketAddr, token: &str, body: Value) -> Value {
    let (status, chore) = call(addr, "POST", "/api/chores", Some(token), Some(body)).await;
    assert_eq!(status, 201, "create failed: {chore}");
    chore
}

#[tokio::test]
async fn wash_dishes_lifecycle() {
    let server = spawn_server().await;
    let addr = server.addr;

    let chore = create(addr, ALICE, json!({"title": "Wash dishes"})).await;
    assert_eq!(chore["title"], "Wash dishes");
    assert_eq!(chore["status"], "pending");
    assert_eq!(chore["completed"], false);
    assert_eq!(chore["points"], 0);
    assert_eq!(chore["priority"], "medium");
    assert_eq!(chore["user_id"], server.alice);
    let path = format!("/api/chores/{}", chore["id"]);

    let (status, updated) = call(addr, "PUT", &path, Some(ALICE), Some(json!({"status": "completed"}))).await;
    assert_eq!(status, 200);
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["title"], "Wash dishes");

    let (status, body) = call(addr, "DELETE", &path, Some(ALICE), None).await;
    assert_eq!(status, 204);
    assert!(body.is_null());

    let (status, body) = call(addr, "GET", &path, Some(ALICE), None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Chore not found");
}

#[tokio::test]
async fn missing_title_is_rejected_and_nothing_is_stored() {
    let server = spawn_server().await;
    let addr = server.addr;

    for body in [json!({}), json!({"title": "   "}), json!({"description": "no title"})] {
        let (status, error) = call(addr, "POST", "/api/chores", Some(ALICE), Some(body)).await;
        assert_eq!(status, 400);
        assert_eq!(error["error"], "Title is required");
    }

    let (status, page) = call(addr, "GET", "/api/chores", Some(ALICE), None).await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 0);
    assert_eq!(page["items"], json!([]));
}

#[tokio::test]
async fn invalid_fields_and_bodies_are_client_errors() {
    let server = spawn_server().await;
    let addr = server.addr;

    let (status, _) = call(addr, "POST", "/api/chores", Some(ALICE), Some(json!({"title": "x", "status": "done"}))).await;
    assert_eq!(status, 400);
    let (status, _) = call(addr, "POST", "/api/chores", Some(ALICE), Some(json!({"title": "x", "priority": "urgent"}))).await;
    assert_eq!(status, 400);
    let (status, _) = call(addr, "POST", "/api/chores", Some(ALICE), Some(json!({"title": "x", "latitude": 91.0}))).await;
    assert_eq!(status, 400);

    let auth = format!("Bearer {ALICE}");
    let (status, _, body) = send_raw(
        addr,
        "POST",
        "/api/chores",
        &[("Authorization", auth.as_str()), ("Content-Type", "application/json")],
        b"{not json",
    )
    .await;
    assert_eq!(status, 400);
    assert!(serde_json::from_str::<Value>(&body).expect("json error")["error"].is_string());
}

#[tokio::test]
async fn completed_flag_promotes_status() {
    let server = spawn_server().await;
    let addr = server.addr;

    let chore = create(addr, ALICE, json!({"title": "Mop", "points": "15"})).await;
    assert_eq!(chore["points"], 15);
    let path = format!("/api/chores/{}", chore["id"]);

    let (status, updated) = call(addr, "PUT", &path, Some(ALICE), Some(json!({"completed": true}))).await;
    assert_eq!(status, 200);
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["completed"], true);

    let (_, updated) = call(addr, "PUT", &path, Some(ALICE), Some(json!({"status": "in-progress", "description": null}))).await;
    assert_eq!(updated["status"], "in-progress");
    assert_eq!(updated["completed"], false);
    assert_eq!(updated["points"], 15);
}

#[tokio::test]
async fn list_filters_by_status_and_search() {
    let server = spawn_server().await;
    let addr = server.addr;

    create(addr, ALICE, json!({"title": "Buy FOO", "status": "completed"})).await;
    create(addr, ALICE, json!({"title": "Sweep", "description": "under the foo rug", "completed": true})).await;
    create(addr, ALICE, json!({"title": "Foo again"})).await;
    create(addr, ALICE, json!({"title": "Dust", "status": "completed"})).await;
    create(addr, BOB, json!({"title": "foo for bob", "status": "completed"})).await;

    let (status, page) = call(addr, "GET", "/api/chores?status=completed", Some(ALICE), None).await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 3);
    let items = page["items"].as_array().expect("items");
    assert!(items.iter().all(|c| c["status"] == "completed" && c["completed"] == true));

    let (_, page) = call(addr, "GET", "/api/chores?status=completed&q=foo", Some(ALICE), None).await;
    let titles: Vec<&str> = page["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|c| c["title"].as_str().expect("title"))
        .collect();
    assert_eq!(titles, vec!["Sweep", "Buy FOO"]);
    assert_eq!(page["total"], 2);
}

#[tokio::test]
async fn paging_is_clamped() {
    let server = spawn_server().await;
    let addr = server.addr;
    for title in ["One", "Two", "Three"] {
        create(addr, ALICE, json!({"title": title})).await;
    }

    let (_, page) = call(addr, "GET", "/api/chores?page=0&limit=500", Some(ALICE), None).await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 100);
    assert_eq!(page["items"].as_array().expect("items").len(), 3);

    let (_, page) = call(addr, "GET", "/api/chores?page=-2&limit=0", Some(ALICE), None).await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"][0]["title"], "Three");

    let (_, page) = call(addr, "GET", "/api/chores?page=2&limit=2", Some(ALICE), None).await;
    assert_eq!(page["items"].as_array().expect("items").len(), 1);
    assert_eq!(page["items"][0]["title"], "One");
}

#[tokio::test]
async fn authentication_and_ownership() {
    let server = spawn_server().await;
    let addr = server.addr;

    let (status, body) = call(addr, "GET", "/api/chores", None, None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Access denied. No token provided.");

    let (status, body) = call(addr, "GET", "/api/chores", Some("forged"), None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid token");

    let chore = create(addr, ALICE, json!({"title": "Private"})).await;
    let path = format!("/api/chores/{}", chore["id"]);

    let (status, _) = call(addr, "GET", &path, Some(BOB), None).await;
    assert_eq!(status, 404);
    let (status, _) = call(addr, "PUT", &path, Some(BOB), Some(json!({"title": "Mine now"}))).await;
    assert_eq!(status, 404);
    let (status, _) = call(addr, "DELETE", &path, Some(BOB), None).await;
    assert_eq!(status, 404);

    let (status, still_there) = call(addr, "GET", &path, Some(ALICE), None).await;
    assert_eq!(status, 200);
    assert_eq!(still_there["title"], "Private");

    let (status, _) = call(addr, "GET", "/api/chores/not-a-number", Some(ALICE), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn health_fallback_and_request_ids() {
    let server = spawn_server().await;
    let addr = server.addr;

    let (status, body) = call(addr, "GET", "/api/health", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "OK");
    assert!(body["timestamp"].is_string());

    let (status, body) = call(addr, "GET", "/api/nothing-here", Some(ALICE), None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Route not found");

    let (_, head, _) = send_raw(addr, "GET", "/api/health", &[("x-request-id", "trace-me-42")], b"").await;
    assert!(head.to_ascii_lowercase().contains("x-request-id: trace-me-42"));

    let (_, head, _) = send_raw(addr, "GET", "/api/health", &[], b"").await;
    assert!(head.to_ascii_lowercase().contains("x-request-id: req-"));
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn websocket_requires_a_token() {
    let server = spawn_server().await;

    for url in [
        format!("ws://{}/ws", server.addr),
        format!("ws://{}/ws?token=forged", server.addr),
    ] {
        match tokio_tungstenite::connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
            other => panic!("expected a 401 handshake, got {:?}", other.map(|(_, r)| r.status())),
        }
    }
}

#[tokio::test]
async fn websocket_streams_owner_events_until_closed() {
    let server = spawn_server().await;
    let addr = server.addr;
    let notifier = Arc::clone(server.state.repo.notifier());

    let (mut alice_ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={ALICE}"))
        .await
        .expect("alice connects with a query token");

    let mut request = format!("ws://{addr}/ws").into_client_request().expect("ws request");
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {BOB}").parse().expect("header value"),
    );
    let (mut bob_ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("bob connects with a bearer header");

    wait_until(|| {
        notifier.connection_count(server.alice) == 1 && notifier.connection_count(server.bob) == 1
    })
    .await;

    let chore = create(addr, ALICE, json!({"title": "Feed cat"})).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), alice_ws.next())
        .await
        .expect("event within 5s")
        .expect("socket open")
        .expect("frame");
    let WsMessage::Text(text) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    let event: Value = serde_json::from_str(&text).expect("event json");
    assert_eq!(event["type"], "CHORE_CREATED");
    assert_eq!(event["chore"]["id"], chore["id"]);

    let nothing = tokio::time::timeout(Duration::from_millis(200), bob_ws.next()).await;
    assert!(nothing.is_err(), "bob must not see alice's events");

    alice_ws.close(None).await.expect("close");
    wait_until(|| notifier.connection_count(server.alice) == 0).await;
    assert_eq!(notifier.connection_count(server.bob), 1);
}

#[tokio::test]
async fn client_supplied_photo_path_is_ignored() {
    let server = spawn_server().await;
    let addr = server.addr;

    let bobs = create(addr, BOB, json!({"title": "Bob's"})).await;
    let body = multipart_photo("XCHOREBOUNDARY", "bob.jpg", b"bob");
    let (status, uploaded) = upload(addr, &bobs["id"], BOB, &body).await;
    assert_eq!(status, 200);
    let bobs_path = uploaded["photo_path"].as_str().expect("photo_path").to_string();
    let bobs_file = server.upload_root.join(&bobs_path);

    let sneaky = create(addr, ALICE, json!({"title": "Sneaky", "photo_path": bobs_path})).await;
    assert!(sneaky["photo_path"].is_null());
    let path = format!("/api/chores/{}", sneaky["id"]);
    let (status, updated) = call(addr, "PUT", &path, Some(ALICE), Some(json!({"photo_path": bobs_path}))).await;
    assert_eq!(status, 200);
    assert!(updated["photo_path"].is_null());

    let (status, _) = call(addr, "DELETE", &path, Some(ALICE), None).await;
    assert_eq!(status, 204);
    assert!(bobs_file.exists());
}

fn multipart_photo(boundary: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn upload(addr: SocketAddr, id: &Value, token: &str, body: &[u8]) -> (u16, Value) {
    let auth = format!("Bearer {token}");
    let (status, _, text) = send_raw(
        addr,
        "POST",
        &format!("/api/chores/{id}/photo"),
        &[
            ("Authorization", auth.as_str()),
            ("Content-Type", "multipart/form-data; boundary=XCHOREBOUNDARY"),
        ],
        body,
    )
    .await;
    (status, serde_json::from_str(&text).expect("json body"))
}

#[tokio::test]
async fn photo_upload_replace_and_delete_cleanup() {
    let server = spawn_server().await;
    let addr = server.addr;

    let chore = create(addr, ALICE, json!({"title": "Clean oven"})).await;
    let body = multipart_photo("XCHOREBOUNDARY", "oven.JPG", b"\xff\xd8\xff\xe0 first");
    let (status, first) = upload(addr, &chore["id"], ALICE, &body).await;
    assert_eq!(status, 200, "{first}");
    assert_eq!(first["message"], "Photo uploaded successfully");
    let first_path = first["photo_path"].as_str().expect("photo_path").to_string();
    assert!(first_path.starts_with("uploads/photos/chore-"));
    assert!(first_path.ends_with(".jpg"));
    assert_eq!(first["chore"]["photo_path"], first_path.as_str());
    assert_eq!(first["photo_url"], format!("/{first_path}"));
    let first_file = server.upload_root.join(&first_path);
    assert_eq!(std::fs::read(&first_file).expect("stored photo"), b"\xff\xd8\xff\xe0 first");

    let body = multipart_photo("XCHOREBOUNDARY", "oven.png", b"second");
    let (status, second) = upload(addr, &chore["id"], ALICE, &body).await;
    assert_eq!(status, 200);
    let second_file = server.upload_root.join(second["photo_path"].as_str().expect("photo_path"));
    assert!(second_file.exists());
    assert!(!first_file.exists(), "replaced photo must be removed");

    let (status, _) = upload(addr, &chore["id"], BOB, &body).await;
    assert_eq!(status, 404);

    let (status, _) = call(addr, "DELETE", &format!("/api/chores/{}", chore["id"]), Some(ALICE), None).await;
    assert_eq!(status, 204);
    assert!(!second_file.exists(), "deleting the chore removes its photo");

    let plain = create(addr, ALICE, json!({"title": "No photo"})).await;
    let (status, _) = call(addr, "DELETE", &format!("/api/chores/{}", plain["id"]), Some(ALICE), None).await;
    assert_eq!(status, 204);
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let server = spawn_server().await;
    let addr = server.addr;
    let chore = create(addr, ALICE, json!({"title": "Water plants"})).await;

    let body = b"--XCHOREBOUNDARY\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--XCHOREBOUNDARY--\r\n";
    let (status, error) = upload(addr, &chore["id"], ALICE, body).await;
    assert_eq!(status, 400);
    assert_eq!(error["error"], "No photo file uploaded");

    let (status, _) = upload(addr, &json!(9999), ALICE, body).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn events_reach_only_the_owner() {
    let server = spawn_server().await;
    let addr = server.addr;
    let notifier = Arc::clone(server.state.repo.notifier());

    let mut phone = notifier.subscribe(server.alice);
    let mut laptop = notifier.subscribe(server.alice);
    let mut other = notifier.subscribe(server.bob);

    let chore = create(addr, ALICE, json!({"title": "Take out trash"})).await;
    let path = format!("/api/chores/{}", chore["id"]);
    call(addr, "PUT", &path, Some(ALICE), Some(json!({"priority": "high"}))).await;
    call(addr, "DELETE", &path, Some(ALICE), None).await;

    for subscription in [&mut phone, &mut laptop] {
        let created: Value = serde_json::from_str(&subscription.try_recv().expect("created")).expect("json");
        assert_eq!(created["type"], "CHORE_CREATED");
        assert_eq!(created["chore"]["title"], "Take out trash");

        let updated: Value = serde_json::from_str(&subscription.try_recv().expect("updated")).expect("json");
        assert_eq!(updated["type"], "CHORE_UPDATED");
        assert_eq!(updated["chore"]["priority"], "high");

        let deleted: Value = serde_json::from_str(&subscription.try_recv().expect("deleted")).expect("json");
        assert_eq!(deleted, json!({"type": "CHORE_DELETED", "choreId": chore["id"]}));

        assert!(subscription.try_recv().is_none());
    }
    assert!(other.try_recv().is_none());

    // A rejected request broadcasts nothing.
    let (status, _) = call(addr, "POST", "/api/chores", Some(ALICE), Some(json!({}))).await;
    assert_eq!(status, 400);
    assert!(phone.try_recv().is_none());

    drop(phone);
    assert_eq!(notifier.connection_count(server.alice), 1);
}
