//! Integration tests for the message write path, live relay, and history fallback.

use futures_util::StreamExt;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Helper: start the server on a random port and return (base_url, addr, state).
async fn start_test_server() -> (String, SocketAddr, parley_server::state::AppState) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = parley_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let state = parley_server::state::AppState::new(db, jwt_secret);

    let app = parley_server::routes::build_router(
        state.clone(),
        &parley_server::config::RateLimitConfig::default(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, state)
}

fn token_for(state: &parley_server::state::AppState, user_id: &str) -> String {
    parley_server::auth::jwt::issue_access_token(&state.jwt_secret, user_id).unwrap()
}

/// Connect as `user_id` and drain presence broadcasts until the socket is quiet.
async fn connect_as(addr: SocketAddr, state: &parley_server::state::AppState, user_id: &str) -> WsRead {
    let url = format!("ws://{}/ws?token={}", addr, token_for(state, user_id));
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    let (write, mut read) = ws_stream.split();
    // Keep the sink alive for the duration of the test
    tokio::spawn(async move {
        let _write = write;
        std::future::pending::<()>().await;
    });
    drain_presence_messages(&mut read).await;
    read
}

/// Drain any presence broadcasts sent on connect.
async fn drain_presence_messages(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(200), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) if text.as_str().contains("online-users") => continue,
            _ => break,
        }
    }
}

async fn send_message(
    base_url: &str,
    token: &str,
    receiver_id: &str,
    body: serde_json::Value,
) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/message/send/{}", base_url, receiver_id))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_message_relayed_to_recipient_only() {
    let (base_url, addr, state) = start_test_server().await;

    let mut alice = connect_as(addr, &state, "alice").await;
    let mut bob = connect_as(addr, &state, "bob").await;
    drain_presence_messages(&mut alice).await;

    let resp = send_message(&base_url, &token_for(&state, "alice"), "bob", json!({"text": "hi bob"})).await;
    assert_eq!(resp.status(), 201);
    let stored: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(stored["senderId"], "alice");
    assert_eq!(stored["receiverId"], "bob");

    let msg = tokio::time::timeout(Duration::from_secs(2), bob.next())
        .await
        .expect("Expected new-message within timeout");
    match msg {
        Some(Ok(Message::Text(text))) => {
            let event: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(event["event"], "new-message");
            assert_eq!(event["data"]["_id"], stored["_id"]);
            assert_eq!(event["data"]["text"], "hi bob");
            assert_eq!(event["data"]["senderId"], "alice");
        }
        other => panic!("Expected text frame, got: {:?}", other),
    }

    // Exactly one event for bob, none for the sender
    assert!(tokio::time::timeout(Duration::from_millis(300), bob.next()).await.is_err());
    assert!(tokio::time::timeout(Duration::from_millis(300), alice.next()).await.is_err());
}

#[tokio::test]
async fn test_offline_recipient_gets_history_not_event() {
    let (base_url, addr, state) = start_test_server().await;

    let mut alice = connect_as(addr, &state, "alice").await;

    let resp = send_message(
        &base_url,
        &token_for(&state, "alice"),
        "carol",
        json!({"image": "https://images.example/cat.png"}),
    )
    .await;
    assert_eq!(resp.status(), 201);
    assert!(tokio::time::timeout(Duration::from_millis(300), alice.next()).await.is_err());

    // Carol comes online later and reads history over REST
    let history: Vec<serde_json::Value> = reqwest::Client::new()
        .get(format!("{}/api/message/alice", base_url))
        .bearer_auth(token_for(&state, "carol"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["image"], "https://images.example/cat.png");
    assert!(history[0]["text"].is_null());
}

#[tokio::test]
async fn test_history_is_ordered_and_scoped_to_pair() {
    let (base_url, _addr, state) = start_test_server().await;
    let alice = token_for(&state, "alice");
    let bob = token_for(&state, "bob");

    send_message(&base_url, &alice, "bob", json!({"text": "one"})).await;
    send_message(&base_url, &bob, "alice", json!({"text": "two"})).await;
    send_message(&base_url, &alice, "dave", json!({"text": "elsewhere"})).await;

    let history: Vec<serde_json::Value> = reqwest::Client::new()
        .get(format!("{}/api/message/bob", base_url))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let texts: Vec<&str> = history.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn test_send_rejects_empty_body_and_missing_auth() {
    let (base_url, _addr, state) = start_test_server().await;

    let resp = send_message(&base_url, &token_for(&state, "alice"), "bob", json!({"text": "   "})).await;
    assert_eq!(resp.status(), 400);

    let resp = reqwest::Client::new()
        .post(format!("{}/api/message/send/bob", base_url))
        .json(&json!({"text": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = send_message(&base_url, "not-a-jwt", "bob", json!({"text": "hi"})).await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_presence_endpoint_lists_online_users() {
    let (base_url, addr, state) = start_test_server().await;
    let _bob = connect_as(addr, &state, "bob").await;
    let _alice = connect_as(addr, &state, "alice").await;

    let resp = reqwest::Client::new()
        .get(format!("{}/api/presence", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/api/presence", base_url))
        .bearer_auth(token_for(&state, "observer"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["online_users"], json!(["alice", "bob"]));
}

#[tokio::test]
async fn test_health() {
    let (base_url, _addr, _state) = start_test_server().await;
    let resp = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
