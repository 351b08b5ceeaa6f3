//! Connection lifecycle, handshake, and command pipelining tests

mod common;

use common::{
    bulk_reply, error_reply, integer_reply, wait_until, MockServer, ServerConfig,
};
use redis_vigil::{Client, ConnectionOptions, EventHandlers, RedisValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn error_recorder() -> (EventHandlers, Arc<Mutex<Vec<String>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_clone = Arc::clone(&errors);
    let handlers = EventHandlers::new().on_error(move |error| {
        errors_clone.lock().unwrap().push(error.to_string());
    });
    (handlers, errors)
}

fn options_for(server: &MockServer) -> ConnectionOptions {
    common::init_tracing();
    ConnectionOptions::new(server.host(), server.port())
        .with_reconnect_delay(Duration::from_millis(50))
}

#[tokio::test]
async fn test_pipelined_commands_pair_with_chunked_replies() {
    let server = MockServer::start(ServerConfig::default()).await;
    let client = Client::connect(options_for(&server)).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    // Both commands go out before either reply; the server then answers
    // both in one stream, split at awkward byte boundaries.
    server.push_silence();
    server.push_silence();
    let set_client = client.clone();
    let set_task = tokio::spawn(async move { set_client.set("foo", "bar").await });
    let get_client = client.clone();
    let get_task = tokio::spawn(async move { get_client.get("foo").await });

    assert!(wait_until(|| server.received("get")).await);
    server.send_raw(&b"+OK\r"[..]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.send_raw(&b"\n$3\r\nb"[..]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.send_raw(&b"ar\r\n"[..]);

    assert_eq!(
        set_task.await.unwrap().unwrap(),
        RedisValue::String("OK".to_string())
    );
    assert_eq!(
        get_task.await.unwrap().unwrap(),
        RedisValue::Bytes("bar".into())
    );
}

#[tokio::test]
async fn test_command_error_scoped_to_one_command() {
    let server = MockServer::start(ServerConfig::default()).await;
    let (handlers, errors) = error_recorder();
    let options = options_for(&server).with_reconnect_on_error(false);
    let client = Client::connect_with(options, handlers).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    server.push_reply(error_reply("ERR unknown command 'bogus'"));
    let result = client.execute("bogus", vec![]).await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "redis returned error code: ERR unknown command 'bogus'"
    );
    assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);
    assert_eq!(
        errors.lock().unwrap()[0],
        "redis returned error code: ERR unknown command 'bogus'"
    );

    // The connection survives and later commands still pair correctly.
    assert!(client.connected());
    server.push_reply(bulk_reply("still here"));
    assert_eq!(
        client.get("foo").await.unwrap(),
        RedisValue::Bytes("still here".into())
    );
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_command_error_recycles_connection_when_configured() {
    let server = MockServer::start(ServerConfig::default()).await;
    let (handlers, errors) = error_recorder();
    let client = Client::connect_with(options_for(&server), handlers)
        .await
        .unwrap();
    assert!(wait_until(|| client.connected()).await);

    server.push_reply(error_reply("ERR bad"));
    let result = client.execute("bogus", vec![]).await;
    assert!(result.is_err());
    assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);

    // reconnect_on_error tears the connection down and builds a new one.
    assert!(wait_until(|| server.connection_count() == 2).await);
    assert!(wait_until(|| client.connected()).await);
}

#[tokio::test]
async fn test_reconnects_after_unexpected_close() {
    let server = MockServer::start(ServerConfig::default()).await;
    let before = Arc::new(Mutex::new(0usize));
    let after = Arc::new(Mutex::new(0usize));
    let before_clone = Arc::clone(&before);
    let after_clone = Arc::clone(&after);
    let handlers = EventHandlers::new()
        .before_reconnect(move || *before_clone.lock().unwrap() += 1)
        .after_reconnect(move || *after_clone.lock().unwrap() += 1);

    let client = Client::connect_with(options_for(&server), handlers)
        .await
        .unwrap();
    assert!(wait_until(|| client.connected()).await);
    assert_eq!(server.connection_count(), 1);

    server.drop_connection();
    assert!(wait_until(|| server.connection_count() == 2).await);
    assert!(wait_until(|| client.connected()).await);
    assert_eq!(*before.lock().unwrap(), 1);
    assert_eq!(*after.lock().unwrap(), 1);

    // Commands flow again on the fresh connection.
    assert_eq!(
        client.set("foo", "bar").await.unwrap(),
        RedisValue::String("OK".to_string())
    );
}

#[tokio::test]
async fn test_pending_commands_fail_when_connection_drops() {
    let server = MockServer::start(ServerConfig::default()).await;
    let options = options_for(&server)
        .with_auto_reconnect(false)
        .with_reconnect_on_error(false);
    let client = Client::connect(options).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    server.push_silence();
    let pending_client = client.clone();
    let pending = tokio::spawn(async move { pending_client.get("foo").await });
    assert!(wait_until(|| server.received("get")).await);

    server.drop_connection();
    let result = pending.await.unwrap();
    assert_eq!(
        result.unwrap_err().to_string(),
        "connection error: connection closed"
    );
    assert!(wait_until(|| !client.connected()).await);
}

#[tokio::test]
async fn test_handshake_authenticates_and_selects_db() {
    let server = MockServer::start(ServerConfig {
        password: Some("sekrit".to_string()),
        ..Default::default()
    })
    .await;
    let options = options_for(&server).with_password("sekrit").with_db(1);
    let client = Client::connect(options).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    let commands = server.commands();
    assert_eq!(commands[0], vec!["auth", "sekrit"]);
    assert_eq!(commands[1], vec!["select", "1"]);
    assert_eq!(commands[2], vec!["info"]);
}

#[tokio::test]
async fn test_auth_failure_reported() {
    let server = MockServer::start(ServerConfig {
        password: Some("sekrit".to_string()),
        ..Default::default()
    })
    .await;
    let (handlers, errors) = error_recorder();
    let options = options_for(&server)
        .with_password("wrong")
        .with_auto_reconnect(false)
        .with_reconnect_on_error(false);
    let client = Client::connect_with(options, handlers).await.unwrap();

    assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);
    assert_eq!(
        errors.lock().unwrap()[0],
        "connection error: redis authenticate failed"
    );
    assert!(wait_until(|| !client.connected()).await);
}

#[tokio::test]
async fn test_version_gate_rejects_old_server() {
    let server = MockServer::start(ServerConfig {
        redis_version: "1.2.6".to_string(),
        ..Default::default()
    })
    .await;
    let (handlers, errors) = error_recorder();
    let options = options_for(&server)
        .with_auto_reconnect(false)
        .with_reconnect_on_error(false);
    let client = Client::connect_with(options, handlers).await.unwrap();

    assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);
    assert_eq!(
        errors.lock().unwrap()[0],
        "connection error: redis version must be >= 2.0 RC 1"
    );
    assert!(wait_until(|| !client.connected()).await);
}

#[tokio::test]
async fn test_close_interrupts_stalled_handshake() {
    let server = MockServer::start(ServerConfig {
        stall_handshake: true,
        ..Default::default()
    })
    .await;
    let client = Client::connect(options_for(&server)).await.unwrap();
    // The server accepted the connection and swallowed INFO; the handshake
    // is now stuck waiting for a reply that never comes.
    assert!(wait_until(|| server.received("info")).await);

    let closed = tokio::time::timeout(Duration::from_secs(2), client.close()).await;
    assert!(
        closed.is_ok(),
        "close() must interrupt a stalled handshake"
    );
    assert!(!client.connected());

    // No reconnect follows; the connection is gone.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_info_error_during_handshake_keeps_server_message() {
    let server = MockServer::start(ServerConfig {
        info_error: Some("ERR info unavailable".to_string()),
        ..Default::default()
    })
    .await;
    let (handlers, errors) = error_recorder();
    let options = options_for(&server)
        .with_auto_reconnect(false)
        .with_reconnect_on_error(false);
    let client = Client::connect_with(options, handlers).await.unwrap();

    assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);
    assert_eq!(
        errors.lock().unwrap()[0],
        "redis returned error code: ERR info unavailable"
    );
    assert!(wait_until(|| !client.connected()).await);
}

#[tokio::test]
async fn test_close_is_terminal() {
    let server = MockServer::start(ServerConfig::default()).await;
    let client = Client::connect(options_for(&server)).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    client.close().await;
    assert!(!client.connected());

    // No reconnect follows an explicit close.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count(), 1);
    assert!(client.get("foo").await.is_err());
}

#[tokio::test]
async fn test_response_transforms_end_to_end() {
    let server = MockServer::start(ServerConfig::default()).await;
    let client = Client::connect(options_for(&server)).await.unwrap();
    assert!(wait_until(|| client.connected()).await);

    server.push_reply(integer_reply(1));
    assert_eq!(client.exists("events").await.unwrap(), RedisValue::Bool(true));

    server.push_reply(integer_reply(0));
    assert_eq!(
        client.exists("missing").await.unwrap(),
        RedisValue::Bool(false)
    );

    server.push_reply(common::array_reply(&["name", "keepalive", "interval", "20"]));
    let map = client.hgetall("check").await.unwrap().as_map().unwrap();
    assert_eq!(map["name"], "keepalive");
    assert_eq!(map["interval"], "20");

    let info = client.info().await.unwrap().as_map().unwrap();
    assert_eq!(info["redis_version"], "7.2.4");
}

#[tokio::test]
async fn test_commands_issued_before_ready_are_flushed() {
    let server = MockServer::start(ServerConfig::default()).await;
    // Issue the command immediately after connect, before the handshake has
    // had a chance to complete.
    let client = Client::connect(options_for(&server)).await.unwrap();
    server.push_reply(bulk_reply("early"));
    assert_eq!(
        client.get("foo").await.unwrap(),
        RedisValue::Bytes("early".into())
    );
    assert!(client.connected());
}
