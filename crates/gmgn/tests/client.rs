//! End-to-end tests against a real loopback WebSocket server.
//!
//! The server side is plain `tokio-tungstenite`; the client side is the
//! full `GmgnClient` stack with the default WebSocket connector.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gmgn::prelude::*;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

const POOL_FRAME: &str = r#"{"action":"message","channel":"new_pool_info","id":"m1","data":{"pool_address":"0x123","chain":"sol"}}"#;

/// Binds a loopback listener and spawns a task accepting one WebSocket.
async fn spawn_server() -> (String, JoinHandle<WebSocketStream<TcpStream>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    });
    (url, server)
}

fn client_for(url: &str) -> GmgnClient {
    GmgnClient::builder()
        .endpoint(url)
        .auto_reconnect(false)
        .listen_idle_timeout(Duration::from_millis(20))
        .build()
        .expect("valid config")
}

async fn buggy_handler(_payload: Value) -> HandlerResult {
    panic!("handler bug")
}

/// A handler forwarding `(tag, payload)` to `tx`.
fn forward(tx: &mpsc::UnboundedSender<(&'static str, Value)>, tag: &'static str) -> Handler {
    let tx = tx.clone();
    Handler::sync(move |payload| {
        let _ = tx.send((tag, payload));
        Ok(())
    })
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Value {
    let msg = ws.next().await.expect("frame").expect("valid frame");
    serde_json::from_str(msg.to_text().expect("text frame")).expect("json frame")
}

// =========================================================================
// Subscribe and deliver
// =========================================================================

#[tokio::test]
async fn test_subscribe_frame_ack_and_delivery() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("new_pool_info", forward(&tx, "first"));
    client.on("new_pool_info", forward(&tx, "second"));
    client.on("ack", forward(&tx, "ack"));

    client.connect().await.expect("should connect");
    assert!(client.is_connected());
    let mut ws = server.await.unwrap();

    // --- Outbound subscribe frame ---
    client.subscribe_new_pools("sol").await.expect("should subscribe");
    let frame = next_text(&mut ws).await;
    assert_eq!(frame["action"], "subscribe");
    assert_eq!(frame["channel"], "new_pool_info");
    assert_eq!(frame["f"], "w");
    assert_eq!(frame["data"], json!([{"chain": "sol"}]));
    assert_eq!(frame["id"].as_str().unwrap().len(), 16);
    assert!(frame.get("access_token").is_none());

    // --- Ack is dropped, data frame fans out ---
    ws.send(Message::Text(r#"{"channel":"ack","id":"x"}"#.into())).await.unwrap();
    ws.send(Message::Text(POOL_FRAME.into())).await.unwrap();

    let expected = json!({"pool_address": "0x123", "chain": "sol"});
    assert_eq!(rx.recv().await.unwrap(), ("first", expected.clone()));
    assert_eq!(rx.recv().await.unwrap(), ("second", expected));

    let mut listener = client.listen().await;
    let envelope = listener.next().await.expect("queued envelope");
    assert_eq!(envelope.channel, "new_pool_info");
    assert_eq!(envelope.id.as_deref(), Some("m1"));

    let stats = client.stats();
    assert_eq!(stats.dropped_acks, 1);
    assert_eq!(stats.delivered, 1);

    client.disconnect().await;
    assert!(listener.next().await.is_none(), "nothing queued, client closed");
    assert!(rx.try_recv().is_err(), "ack never reached a handler");
}

#[tokio::test]
async fn test_faulting_handlers_do_not_stop_delivery() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("new_pool_info", Handler::sync(|_| Err("rejected".into())));
    client.on("new_pool_info", Handler::new(buggy_handler));
    client.on("new_pool_info", forward(&tx, "survivor"));

    client.connect().await.unwrap();
    let mut ws = server.await.unwrap();
    ws.send(Message::Text(POOL_FRAME.into())).await.unwrap();
    ws.send(Message::Text("definitely not json".into())).await.unwrap();
    ws.send(Message::Text(POOL_FRAME.into())).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().0, "survivor");
    assert_eq!(rx.recv().await.unwrap().0, "survivor");
    assert!(client.is_connected(), "receive loop keeps running");

    let stats = client.stats();
    assert_eq!(stats.handler_faults, 4);
    assert_eq!(stats.malformed, 1);
    client.disconnect().await;
}

#[tokio::test]
async fn test_off_removes_handler() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let removed = forward(&tx, "removed");
    client.on("chain_stat", removed.clone());
    client.on("chain_stat", forward(&tx, "kept"));
    client.off("chain_stat", Some(&removed));

    client.connect().await.unwrap();
    let mut ws = server.await.unwrap();
    ws.send(Message::Text(r#"{"channel":"chain_stat","data":{"tps":1}}"#.into()))
        .await
        .unwrap();

    assert_eq!(rx.recv().await.unwrap().0, "kept");
    client.disconnect().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_wallet_trades_frame_carries_credential() {
    let (url, server) = spawn_server().await;
    let client = GmgnClient::builder()
        .endpoint(&url)
        .credential("configured-jwt")
        .build()
        .unwrap();

    client.connect().await.unwrap();
    let mut ws = server.await.unwrap();
    client
        .subscribe_wallet_trades("sol", "Wa11et", None)
        .await
        .expect("should subscribe");

    let frame = next_text(&mut ws).await;
    assert_eq!(frame["channel"], "wallet_trade_data");
    assert_eq!(frame["access_token"], "configured-jwt");
    assert_eq!(frame["retry"], 1);
    assert_eq!(frame["data"], json!([{"chain": "sol", "addresses": "Wa11et"}]));
    client.disconnect().await;
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_connect_twice_is_noop() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);

    client.connect().await.unwrap();
    let _ws = server.await.unwrap();
    // Only one connection is ever accepted, so a second open would hang
    // or fail here.
    client.connect().await.expect("second connect is a no-op");

    assert_eq!(client.state(), ConnectionState::Connected);
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_to_closed_port_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);
    let client = client_for(&url);

    let result = client.connect().await;

    assert!(matches!(result, Err(GmgnError::Connection(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_server_close_without_reconnect_ends_listener() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);

    client.connect().await.unwrap();
    let mut ws = server.await.unwrap();
    ws.send(Message::Text(POOL_FRAME.into())).await.unwrap();
    ws.close(None).await.unwrap();

    let mut listener = client.listen().await;
    assert!(listener.next().await.is_some(), "queued frame survives the close");
    assert!(listener.next().await.is_none());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_subscribe_after_disconnect_is_not_connected() {
    let (url, server) = spawn_server().await;
    let client = client_for(&url);
    client.connect().await.unwrap();
    let _ws = server.await.unwrap();
    client.disconnect().await;

    let result = client.subscribe_token_launches("sol").await;

    assert!(matches!(result, Err(GmgnError::NotConnected)));
    assert_eq!(
        client.subscribed_channels(),
        vec![Channel::NewLaunchedInfo],
        "kept for replay"
    );
}
