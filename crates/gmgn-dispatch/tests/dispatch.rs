//! Integration tests for dispatch: handlers, the delivery queue and the
//! listener's end-of-stream rules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use gmgn_dispatch::{Dispatcher, Handler, HandlerResult, UnexpectedFramePolicy};
use gmgn_transport::ConnectionState;
use serde_json::{Value, json};
use tokio::sync::watch;

const POOL_FRAME: &[u8] =
    br#"{"action":"message","channel":"new_pool_info","id":"p1","data":{"pool_address":"0x123","chain":"sol"}}"#;

/// A handler that appends `(tag, payload)` to a shared log.
fn recording(log: &Arc<Mutex<Vec<(&'static str, Value)>>>, tag: &'static str) -> Handler {
    let log = log.clone();
    Handler::sync(move |payload| {
        log.lock().unwrap().push((tag, payload));
        Ok(())
    })
}

async fn buggy_handler(_payload: Value) -> HandlerResult {
    panic!("handler bug")
}

fn liveness(state: ConnectionState) -> (watch::Sender<ConnectionState>, watch::Receiver<ConnectionState>) {
    watch::channel(state)
}

// =========================================================================
// Handlers
// =========================================================================

#[tokio::test]
async fn test_dispatch_invokes_handlers_in_registration_order() {
    let dispatcher = Dispatcher::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    dispatcher.handlers().register("new_pool_info", recording(&log, "first"));
    dispatcher.handlers().register("new_pool_info", recording(&log, "second"));
    dispatcher.handlers().register("chain_stat", recording(&log, "other"));

    dispatcher.handle_frame(POOL_FRAME).await;

    let log = log.lock().unwrap();
    let expected = json!({"pool_address": "0x123", "chain": "sol"});
    assert_eq!(
        *log,
        vec![("first", expected.clone()), ("second", expected)],
        "only new_pool_info handlers run, in order"
    );
}

#[tokio::test]
async fn test_dispatch_faulting_handler_does_not_stop_others() {
    let dispatcher = Dispatcher::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    dispatcher
        .handlers()
        .register("new_pool_info", Handler::sync(|_| Err("bad payload".into())));
    dispatcher.handlers().register(
        "new_pool_info",
        Handler::new(buggy_handler),
    );
    dispatcher.handlers().register("new_pool_info", recording(&log, "survivor"));

    dispatcher.handle_frame(POOL_FRAME).await;
    dispatcher.handle_frame(POOL_FRAME).await;

    assert_eq!(log.lock().unwrap().len(), 2, "last handler runs for both frames");
    let stats = dispatcher.stats();
    assert_eq!(stats.handler_faults, 4);
    assert_eq!(stats.delivered, 2);
}

#[tokio::test]
async fn test_dispatch_ack_reaches_neither_handlers_nor_queue() {
    let dispatcher = Dispatcher::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    dispatcher.handlers().register("ack", recording(&log, "ack"));
    let (_tx, rx) = liveness(ConnectionState::Disconnected);

    dispatcher.handle_frame(br#"{"channel":"ack","id":"sub1"}"#).await;

    assert!(log.lock().unwrap().is_empty());
    let mut listener = dispatcher.listener(rx, Duration::from_millis(10)).await;
    assert!(listener.next().await.is_none());
}

#[tokio::test]
async fn test_dispatch_deliver_policy_routes_to_unknown_channel() {
    let dispatcher = Dispatcher::new(UnexpectedFramePolicy::Deliver);
    let log = Arc::new(Mutex::new(Vec::new()));
    dispatcher.handlers().register("unknown", recording(&log, "unknown"));

    dispatcher.handle_frame(b"[1,2,3]").await;

    assert_eq!(*log.lock().unwrap(), vec![("unknown", json!([1, 2, 3]))]);
}

#[tokio::test]
async fn test_handler_may_unregister_itself_while_running() {
    let dispatcher = Arc::new(Dispatcher::default());
    let weak = Arc::downgrade(&dispatcher);
    let handler = Handler::sync(move |_| {
        if let Some(d) = weak.upgrade() {
            d.handlers().unregister("new_pool_info", None);
        }
        Ok(())
    });
    dispatcher.handlers().register("new_pool_info", handler);

    dispatcher.handle_frame(POOL_FRAME).await;

    assert_eq!(dispatcher.handlers().count("new_pool_info"), 0);
}

// =========================================================================
// Listener
// =========================================================================

#[tokio::test]
async fn test_listener_yields_in_arrival_order() {
    let dispatcher = Dispatcher::default();
    let (_tx, rx) = liveness(ConnectionState::Connected);
    for id in ["a", "b", "c"] {
        let frame = format!(r#"{{"channel":"chain_stat","id":"{id}","data":{{}}}}"#);
        dispatcher.handle_frame(frame.as_bytes()).await;
    }

    let mut listener = dispatcher.listener(rx, Duration::from_millis(10)).await;

    for id in ["a", "b", "c"] {
        let env = listener.next().await.expect("queued envelope");
        assert_eq!(env.id.as_deref(), Some(id));
    }
}

#[tokio::test]
async fn test_listener_drains_queue_after_close_then_ends() {
    let dispatcher = Dispatcher::default();
    let (_tx, rx) = liveness(ConnectionState::Disconnected);
    dispatcher.handle_frame(POOL_FRAME).await;
    dispatcher.handle_frame(POOL_FRAME).await;

    let mut listener = dispatcher.listener(rx, Duration::from_millis(10)).await;

    assert!(listener.next().await.is_some());
    assert!(listener.next().await.is_some());
    assert!(listener.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_listener_rechecks_liveness_on_idle_timeout() {
    let dispatcher = Dispatcher::default();
    let (tx, rx) = liveness(ConnectionState::Connected);
    let mut listener = dispatcher.listener(rx, Duration::from_secs(1)).await;

    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        tx.send_replace(ConnectionState::Disconnected);
    });

    let started = tokio::time::Instant::now();
    assert!(listener.next().await.is_none());
    // Noticed on the first idle wake-up after the close, not before.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(2500), "{waited:?}");
    assert!(waited <= Duration::from_secs(3), "{waited:?}");
    closer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_listener_keeps_waiting_while_reconnecting() {
    let dispatcher = Arc::new(Dispatcher::default());
    let (tx, rx) = liveness(ConnectionState::Reconnecting);
    let mut listener = dispatcher.listener(rx, Duration::from_secs(1)).await;

    let producer = dispatcher.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send_replace(ConnectionState::Connected);
        producer.handle_frame(POOL_FRAME).await;
        // Keep the state sender alive past the delivery.
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let env = listener.next().await.expect("delivered after reconnect");
    assert_eq!(env.channel, "new_pool_info");
}

#[tokio::test]
async fn test_listener_ends_when_dispatcher_dropped() {
    let dispatcher = Dispatcher::default();
    let (_tx, rx) = liveness(ConnectionState::Connected);
    let mut listener = dispatcher.listener(rx, Duration::from_secs(60)).await;

    drop(dispatcher);

    assert!(listener.next().await.is_none());
}

#[tokio::test]
async fn test_second_listener_waits_for_first_to_drop() {
    let dispatcher = Arc::new(Dispatcher::default());
    let (_tx, rx) = liveness(ConnectionState::Connected);
    let first = dispatcher.listener(rx.clone(), Duration::from_millis(10)).await;

    let contender = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.listener(rx, Duration::from_millis(10)).await })
    };
    tokio::task::yield_now().await;
    assert!(!contender.is_finished());

    drop(first);

    let second = contender.await.unwrap();
    drop(second);
}

#[tokio::test]
async fn test_into_stream_collects_until_end() {
    let dispatcher = Dispatcher::default();
    let (_tx, rx) = liveness(ConnectionState::Disconnected);
    dispatcher.handle_frame(POOL_FRAME).await;
    dispatcher.handle_frame(br#"{"channel":"chain_stat","data":{"tps":1}}"#).await;

    let listener = dispatcher.listener(rx, Duration::from_millis(10)).await;
    let channels: Vec<String> = listener.into_stream().map(|e| e.channel).collect().await;

    assert_eq!(channels, vec!["new_pool_info", "chain_stat"]);
}
