#![allow(clippy::unwrap_used)]
// Integration tests for `Connection` against an in-process WebSocket server.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use amaran_api::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState, Request};

// ── Helpers ─────────────────────────────────────────────────────────

const CLIENT_ID: &str = "amaran-test";

async fn setup(reconnect: Duration) -> (TcpListener, Connection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ConnectionConfig {
        host: "127.0.0.1".into(),
        port,
        reconnect_interval: reconnect,
        request_timeout: Duration::from_millis(500),
    };
    (listener, Connection::with_client_id(config, CLIENT_ID))
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Next text frame from the client, decoded.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn reply(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn wait_for(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    pred: impl Fn(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for connection event")
}

/// Accept, consume the version query, and negotiate `version`.
async fn open_session(
    listener: &TcpListener,
    conn: &Connection,
    version: u32,
) -> WebSocketStream<TcpStream> {
    let mut rx = conn.subscribe();
    conn.connect();
    let mut ws = accept(listener).await;

    let query = next_json(&mut ws).await;
    assert_eq!(query["action"], "get_protocol_versions");
    reply(
        &mut ws,
        json!({
            "type": "response",
            "client_id": CLIENT_ID,
            "action": "get_protocol_versions",
            "code": 0,
            "version": version,
            "data": [version]
        }),
    )
    .await;

    wait_for(&mut rx, |e| matches!(e, ConnectionEvent::Response(_))).await;
    ws
}

// ── Connection lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn test_open_sends_version_query_in_current_envelope() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut rx = conn.subscribe();

    conn.connect();
    let mut ws = accept(&listener).await;

    let query = next_json(&mut ws).await;
    assert_eq!(query["version"], 2);
    assert_eq!(query["type"], "request");
    assert_eq!(query["client_id"], CLIENT_ID);
    assert_eq!(query["request_id"], "req-1");
    assert_eq!(query["action"], "get_protocol_versions");
    assert!(query["token"].as_str().is_some_and(|t| !t.is_empty()));

    wait_for(&mut rx, |e| matches!(e, ConnectionEvent::Connected)).await;
    assert_eq!(conn.state(), ConnectionState::Open);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_connect_while_open_is_noop() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    conn.connect();
    conn.connect();

    let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(second.is_err(), "no second transport may be opened");

    conn.send(&Request::new("toggle_sleep").node("N")).unwrap();
    assert_eq!(next_json(&mut ws).await["action"], "toggle_sleep");

    conn.disconnect().await;
}

#[tokio::test]
async fn test_legacy_version_switches_envelope() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 0).await;
    assert_eq!(conn.protocol_version(), Some(0));

    conn.send(
        &Request::new("increase_intensity")
            .node("light-1")
            .args(json!({ "delta": 100 }).as_object().unwrap().clone()),
    )
    .unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({
            "version": 0,
            "type": "increment_intensity",
            "client_id": CLIENT_ID,
            "node_id": "light-1",
            "args": { "delta": 100 }
        })
    );

    conn.disconnect().await;
}

// ── Request correlation ─────────────────────────────────────────────

#[tokio::test]
async fn test_send_and_await_resolves_matching_response() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    let waiter = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.send_and_await_with_timeout(&Request::new("get_device_list"), Duration::from_secs(5))
                .await
        })
    };

    let request = next_json(&mut ws).await;
    assert_eq!(request["action"], "get_device_list");

    // Different action first: must not resolve the waiter.
    reply(
        &mut ws,
        json!({"type": "response", "client_id": CLIENT_ID, "action": "get_scene_list", "code": 0, "data": []}),
    )
    .await;
    reply(
        &mut ws,
        json!({
            "type": "response",
            "client_id": CLIENT_ID,
            "action": "get_device_list",
            "code": 0,
            "data": [{ "node_id": "N1", "name": "Key Light" }]
        }),
    )
    .await;

    let response = waiter.await.unwrap().expect("response expected");
    assert_eq!(response.action.as_deref(), Some("get_device_list"));
    assert_eq!(response.data[0]["node_id"], "N1");
    assert_eq!(conn.pending_requests(), 0);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_send_and_await_times_out_with_none() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    let timeout = Duration::from_millis(250);
    let started = Instant::now();
    let waiter = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.send_and_await_with_timeout(&Request::new("get_scene_list"), timeout)
                .await
        })
    };

    // Reply to a different client id: never matches.
    let _request = next_json(&mut ws).await;
    reply(
        &mut ws,
        json!({"type": "response", "client_id": "someone-else", "action": "get_scene_list", "code": 0}),
    )
    .await;

    let result = waiter.await.unwrap();
    let elapsed = started.elapsed();

    assert!(result.is_none());
    assert!(elapsed >= timeout, "resolved early after {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(1), "resolved late after {elapsed:?}");
    assert_eq!(conn.pending_requests(), 0);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_replaced_request_resolves_none_at_its_own_deadline() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    let timeout = Duration::from_millis(400);
    let request = Request::new("get_cct").node("N1");

    let started = Instant::now();
    let first = {
        let (conn, request) = (conn.clone(), request.clone());
        tokio::spawn(async move { conn.send_and_await_with_timeout(&request, timeout).await })
    };
    assert_eq!(next_json(&mut ws).await["action"], "get_cct");

    let second = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.send_and_await_with_timeout(&request, Duration::from_secs(5))
                .await
        })
    };
    assert_eq!(next_json(&mut ws).await["action"], "get_cct");

    // One answer for the shared client id and action.
    reply(
        &mut ws,
        json!({"type": "response", "client_id": CLIENT_ID, "action": "get_cct", "node_id": "N1", "code": 0, "data": {"cct": 5600}}),
    )
    .await;

    let response = second.await.unwrap().expect("newest caller gets the response");
    assert_eq!(response.data["cct"], 5600);

    let replaced = first.await.unwrap();
    let elapsed = started.elapsed();
    assert!(replaced.is_none());
    assert!(elapsed >= timeout, "replaced caller resolved early after {elapsed:?}");
    assert_eq!(conn.pending_requests(), 0);

    conn.disconnect().await;
}

#[tokio::test]
async fn test_error_response_still_reaches_caller() {
    let (listener, conn) = setup(Duration::from_secs(5)).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    let waiter = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.send_and_await(&Request::new("get_preset_list")).await })
    };

    let _request = next_json(&mut ws).await;
    reply(
        &mut ws,
        json!({"type": "response", "client_id": CLIENT_ID, "action": "get_preset_list", "code": 3, "data": null}),
    )
    .await;

    let response = waiter.await.unwrap().expect("error responses are still delivered");
    assert_eq!(response.code, Some(3));
    assert!(!response.is_success());

    conn.disconnect().await;
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test]
async fn test_unexpected_close_reconnects_once_after_interval() {
    let interval = Duration::from_millis(300);
    let (listener, conn) = setup(interval).await;
    let mut rx = conn.subscribe();
    let mut ws = open_session(&listener, &conn, 2).await;

    ws.close(None).await.unwrap();
    drop(ws);
    let closed_at = Instant::now();

    wait_for(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected)).await;
    assert_eq!(conn.protocol_version(), None, "version must be renegotiated");

    let mut ws = tokio::time::timeout(Duration::from_secs(5), accept(&listener))
        .await
        .expect("client should reconnect");
    assert!(closed_at.elapsed() >= interval - Duration::from_millis(50));

    // The new session re-queries the version.
    assert_eq!(next_json(&mut ws).await["action"], "get_protocol_versions");

    // Exactly one reconnect: nothing else knocks while this session is open.
    let extra = tokio::time::timeout(interval * 2, listener.accept()).await;
    assert!(extra.is_err(), "duplicate reconnect attempt");

    conn.disconnect().await;
}

#[tokio::test]
async fn test_explicit_disconnect_stops_reconnecting() {
    let interval = Duration::from_millis(200);
    let (listener, conn) = setup(interval).await;
    let mut ws = open_session(&listener, &conn, 2).await;

    conn.send(&Request::new("set_sleep").node("N")).unwrap();
    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    // The queued frame is flushed before the close frame.
    assert_eq!(next_json(&mut ws).await["action"], "set_sleep");

    let again = tokio::time::timeout(interval * 4, listener.accept()).await;
    assert!(again.is_err(), "no reconnect after explicit disconnect");
}

#[tokio::test]
async fn test_refused_connection_reports_error_and_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let conn = Connection::with_client_id(
        ConnectionConfig {
            host: "127.0.0.1".into(),
            port,
            reconnect_interval: Duration::from_secs(60),
            request_timeout: Duration::from_millis(500),
        },
        CLIENT_ID,
    );
    let mut rx = conn.subscribe();
    let mut state = conn.watch_state();

    conn.connect();

    wait_for(&mut rx, |e| matches!(e, ConnectionEvent::Error(_))).await;
    wait_for(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected)).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::ReconnectPending),
    )
    .await
    .unwrap()
    .unwrap();

    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_cuts_reconnect_wait_short() {
    let interval = Duration::from_secs(30);
    let (listener, conn) = setup(interval).await;
    let mut state = conn.watch_state();
    let ws = open_session(&listener, &conn, 2).await;

    drop(ws);
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::ReconnectPending),
    )
    .await
    .unwrap()
    .unwrap();

    let started = Instant::now();
    conn.connect();
    let mut ws = tokio::time::timeout(Duration::from_secs(5), accept(&listener))
        .await
        .expect("connect() should reconnect without waiting out the interval");
    assert!(started.elapsed() < interval);
    assert_eq!(next_json(&mut ws).await["action"], "get_protocol_versions");

    conn.disconnect().await;
}
