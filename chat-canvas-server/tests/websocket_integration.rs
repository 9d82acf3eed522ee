//! WebSocket round-trip integration tests.
//!
//! Tests real WebSocket connections to verify message flow.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use common::TestServer;

/// Helper to receive and parse a JSON message with timeout.
async fn recv_json(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Option<Value> {
    let msg = timeout(Duration::from_secs(5), stream.next())
        .await
        .ok()??
        .ok()?;

    match msg {
        Message::Text(text) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

/// Receive messages until one has the given type, skipping others.
async fn recv_until_type(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    msg_type: &str,
    max_messages: usize,
) -> Option<Value> {
    for _ in 0..max_messages {
        let msg = recv_json(stream).await?;
        if msg["type"] == msg_type {
            return Some(msg);
        }
    }
    None
}

/// Helper to send a JSON message.
async fn send_json<S>(sink: &mut S, value: &Value) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text))
        .await
        .map_err(|_| "send failed".to_string())
}

#[tokio::test]
async fn connect_and_receive_welcome() {
    let server = TestServer::start().await;
    server
        .sessions()
        .create(Some("ws-1".to_string()))
        .expect("should create");

    let (ws_stream, _) = connect_async(server.ws_url("ws-1"))
        .await
        .expect("Failed to connect");
    let (_, mut read) = ws_stream.split();

    let msg = recv_json(&mut read).await.expect("No welcome message");
    assert_eq!(msg["type"], "welcome");
    assert!(msg["version"].is_string());
    assert_eq!(msg["snapshot"]["session_id"], "ws-1");

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_session_rejects_upgrade() {
    let server = TestServer::start().await;
    assert!(connect_async(server.ws_url("missing")).await.is_err());
    server.shutdown().await;
}

#[tokio::test]
async fn fragments_stream_updates() {
    let server = TestServer::start().await;
    server
        .sessions()
        .create(Some("ws-2".to_string()))
        .expect("should create");

    let (ws_stream, _) = connect_async(server.ws_url("ws-2"))
        .await
        .expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();
    recv_until_type(&mut read, "welcome", 1).await.expect("welcome");

    let fragments = [
        "Tasks: ::tasks::{\"tasks\":[{\"text\":\"Write\",",
        "\"status\":\"pending\"}]}::/tasks:: done",
    ];
    let mut visible = String::new();
    for (seq, text) in fragments.iter().enumerate() {
        send_json(&mut write, &json!({ "type": "fragment", "text": text, "seq": seq }))
            .await
            .expect("send");
        let msg = recv_until_type(&mut read, "event", 5).await.expect("update");
        assert_eq!(msg["event"]["type"], "update");
        let result = &msg["event"]["result"];
        assert!(!result["text"].as_str().expect("text").contains("::"));
        visible.push_str(result["textDelta"].as_str().expect("textDelta"));
    }
    assert_eq!(visible, "Tasks:  done");

    send_json(&mut write, &json!({ "type": "finish" }))
        .await
        .expect("send");
    let msg = recv_until_type(&mut read, "event", 5).await.expect("finish update");
    assert_eq!(msg["event"]["result"]["finished"], true);
    assert_eq!(msg["event"]["result"]["state"][0]["type"], "TaskWindow");

    server.shutdown().await;
}

#[tokio::test]
async fn errors_and_ping() {
    let server = TestServer::start().await;
    server
        .sessions()
        .create(Some("ws-3".to_string()))
        .expect("should create");

    let (ws_stream, _) = connect_async(server.ws_url("ws-3"))
        .await
        .expect("Failed to connect");
    let (mut write, mut read) = ws_stream.split();
    recv_until_type(&mut read, "welcome", 1).await.expect("welcome");

    send_json(&mut write, &json!({ "type": "fragment", "text": "x", "seq": 7 }))
        .await
        .expect("send");
    let msg = recv_until_type(&mut read, "error", 5).await.expect("error");
    assert_eq!(msg["code"], "out_of_order");

    write
        .send(Message::Text("not json".to_string()))
        .await
        .expect("send");
    let msg = recv_until_type(&mut read, "error", 5).await.expect("error");
    assert_eq!(msg["code"], "invalid_message");

    send_json(&mut write, &json!({ "type": "ping" }))
        .await
        .expect("send");
    let msg = recv_until_type(&mut read, "pong", 5).await.expect("pong");
    assert!(msg["timestamp"].is_u64());

    server.shutdown().await;
}

#[tokio::test]
async fn http_updates_reach_websocket_and_delete_closes() {
    let server = TestServer::start().await;
    server
        .sessions()
        .create(Some("ws-4".to_string()))
        .expect("should create");

    let (ws_stream, _) = connect_async(server.ws_url("ws-4"))
        .await
        .expect("Failed to connect");
    let (_, mut read) = ws_stream.split();
    recv_until_type(&mut read, "welcome", 1).await.expect("welcome");

    let client = reqwest::Client::new();
    client
        .post(server.url("/api/sessions/ws-4/commands"))
        .body(r#"{"action":"render","componentId":"p","type":"TextPanel","props":{"content":"hi"}}"#)
        .send()
        .await
        .expect("request");

    let msg = recv_until_type(&mut read, "event", 5).await.expect("update");
    assert_eq!(msg["event"]["result"]["state"][0]["id"], "p");

    client
        .delete(server.url("/api/sessions/ws-4"))
        .send()
        .await
        .expect("request");
    let msg = recv_until_type(&mut read, "event", 5).await.expect("closed");
    assert_eq!(msg["event"]["type"], "closed");

    server.shutdown().await;
}
