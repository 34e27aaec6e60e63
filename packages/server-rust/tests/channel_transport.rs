//! Channel transport against a live server on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use actionhub_server::demo;
use actionhub_server::network::handlers::CALLER_ID_HEADER;
use actionhub_server::network::{NetworkConfig, NetworkModule};
use actionhub_server::service::{CompositeObserver, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    port: u16,
    stop: oneshot::Sender<()>,
    done: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn spawn_server() -> Server {
    let config = NetworkConfig {
        host: "127.0.0.1".to_string(),
        ..NetworkConfig::default()
    };
    let mut module = NetworkModule::new(
        config,
        &ServerConfig::default(),
        Arc::new(demo::registry().unwrap()),
        CompositeObserver::default(),
    );
    let port = module.start().await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let done = tokio::spawn(module.serve(async {
        let _ = stopped.await;
    }));
    Server { port, stop, done }
}

async fn connect(port: u16, path: &str, caller: Option<&'static str>) -> Client {
    let mut request = format!("ws://127.0.0.1:{port}{path}")
        .into_client_request()
        .unwrap();
    if let Some(id) = caller {
        request
            .headers_mut()
            .insert(CALLER_ID_HEADER, HeaderValue::from_static(id));
    }
    let (client, _) = connect_async(request).await.unwrap();
    client
}

async fn call(client: &mut Client, id: u64, event: &str, params: Value) -> Value {
    let frame = json!({"id": id, "event": event, "params": params}).to_string();
    client.send(Message::Text(frame.into())).await.unwrap();
    next_json(client).await
}

async fn next_json(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("reply within timeout")
        .unwrap()
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn request_reply_over_default_namespace() {
    let server = spawn_server().await;
    let mut client = connect(server.port, "/ws", None).await;

    let reply = call(&mut client, 1, "/docs/get", json!({"id": "a", "populate": "tags"})).await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["tags"][1]["label"], "two");

    let reply = call(&mut client, 2, "/v2/tags/get", json!({"id": ["t1"]})).await;
    assert_eq!(reply["data"][0]["id"], "t1");

    let reply = call(&mut client, 3, "/tags/getByIds", json!({"id": "t1"})).await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["name"], "UnknownAction");

    let _ = server.stop.send(());
}

#[tokio::test]
async fn upgrade_headers_set_connection_caller() {
    let server = spawn_server().await;

    let mut anonymous = connect(server.port, "/ws", None).await;
    let reply = call(&mut anonymous, 1, "/docs/whoami", json!({})).await;
    assert_eq!(reply["error"]["name"], "Forbidden");

    let mut user = connect(server.port, "/ws", Some("u2")).await;
    let reply = call(&mut user, 1, "/docs/whoami", json!({})).await;
    assert_eq!(reply["data"]["id"], "u2");

    let _ = server.stop.send(());
}

#[tokio::test]
async fn frames_on_one_connection_are_answered_independently() {
    let server = spawn_server().await;
    let mut client = connect(server.port, "/ws", None).await;

    for id in 1..=5_u64 {
        let frame = json!({"id": id, "event": "/docs/get", "params": {"id": "b"}}).to_string();
        client.send(Message::Text(frame.into())).await.unwrap();
    }
    let mut ids = Vec::new();
    for _ in 0..5 {
        let reply = next_json(&mut client).await;
        assert_eq!(reply["data"]["title"], "B");
        ids.push(reply["id"].as_u64().unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let _ = server.stop.send(());
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let server = spawn_server().await;
    let mut client = connect(server.port, "/ws", None).await;
    let reply = call(&mut client, 1, "/docs/get", json!({"id": "a"})).await;
    assert_eq!(reply["ok"], true);

    server.stop.send(()).unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("close within timeout");
    assert!(matches!(msg, Some(Ok(Message::Close(_))) | None));
    // Polling again completes the close handshake.
    let _ = tokio::time::timeout(Duration::from_secs(1), client.next()).await;

    let result = tokio::time::timeout(Duration::from_secs(5), server.done)
        .await
        .expect("server stops")
        .unwrap();
    assert!(result.is_ok());
}
