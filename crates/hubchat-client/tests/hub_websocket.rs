//! The WebSocket hub transport and connection manager against an axum hub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use hubchat_client::error::HubError;
use hubchat_client::hub::{ConnectionManager, RetryPolicy, TransportOptions, WsTransportFactory};
use hubchat_shared::{ConnectionState, UserId};

const SEPARATOR: char = '\u{1e}';

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Serve,
    RejectHandshake,
    DropFirstConnection,
    CloseWithError,
}

#[derive(Clone)]
struct Hub {
    mode: Mode,
    tokens: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(hub): State<Hub>,
) -> Response {
    let token = params.get("access_token").cloned().unwrap_or_default();
    hub.tokens.lock().unwrap().push(token);
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

fn record(value: Value) -> String {
    format!("{value}{SEPARATOR}")
}

async fn serve_socket(mut socket: WebSocket, hub: Hub) {
    let index = hub.connections.fetch_add(1, Ordering::SeqCst);

    let Some(Ok(WsMessage::Text(hello))) = socket.recv().await else {
        return;
    };
    assert!(hello.contains("\"protocol\":\"json\""));

    if hub.mode == Mode::RejectHandshake {
        let _ = socket
            .send(WsMessage::Text(record(json!({"error": "Unauthorized"}))))
            .await;
        return;
    }
    if socket.send(WsMessage::Text(record(json!({})))).await.is_err() {
        return;
    }

    match hub.mode {
        Mode::DropFirstConnection if index == 0 => return,
        Mode::CloseWithError => {
            let _ = socket
                .send(WsMessage::Text(record(
                    json!({"type": 7, "error": "Server shutting down", "allowReconnect": false}),
                )))
                .await;
            return;
        }
        _ => {}
    }

    while let Some(Ok(frame)) = socket.recv().await {
        let WsMessage::Text(text) = frame else {
            continue;
        };
        for raw in text.split(SEPARATOR).filter(|r| !r.is_empty()) {
            let invocation: Value = serde_json::from_str(raw).unwrap();
            if invocation["type"] != 1 {
                continue;
            }

            let args = &invocation["arguments"];
            let mut reply = String::new();
            match invocation["target"].as_str() {
                Some("SendMessage") => reply.push_str(&record(json!({
                    "type": 1,
                    "target": "MessageSent",
                    "arguments": [{
                        "id": 100,
                        "senderId": 1,
                        "receiverId": args[0],
                        "content": args[1],
                        "timestamp": "2024-05-01T10:00:00Z"
                    }]
                }))),
                Some("GetConversation") => reply.push_str(&record(json!({
                    "type": 1,
                    "target": "ConversationHistory",
                    "arguments": [[{
                        "id": 7,
                        "senderId": args[0],
                        "receiverId": 1,
                        "content": "earlier",
                        "timestamp": "2024-05-01T09:00:00.123"
                    }]]
                }))),
                _ => {}
            }
            reply.push_str(&record(json!({
                "type": 3,
                "invocationId": invocation["invocationId"],
                "result": null
            })));

            if socket.send(WsMessage::Text(reply)).await.is_err() {
                return;
            }
        }
    }
}

async fn spawn_hub(mode: Mode) -> (String, Hub) {
    let hub = Hub {
        mode,
        tokens: Arc::new(Mutex::new(Vec::new())),
        connections: Arc::new(AtomicUsize::new(0)),
    };
    let router = Router::new()
        .route("/hubs/chat", get(upgrade))
        .with_state(hub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/hubs/chat"), hub)
}

fn manager(hub_url: &str) -> ConnectionManager {
    let options = TransportOptions {
        handshake_timeout: Duration::from_secs(2),
        keepalive_interval: Duration::from_millis(200),
        server_timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(vec![Duration::ZERO, Duration::from_millis(50)]),
    };
    ConnectionManager::new(Arc::new(WsTransportFactory::new(hub_url, options)))
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn send_and_history_round_trip_over_the_socket() {
    let (url, hub) = spawn_hub(Mode::Serve).await;
    let manager = manager(&url);

    let confirmed = Arc::new(Mutex::new(Vec::new()));
    let c = confirmed.clone();
    let _sent = manager.on_message_sent(move |m| c.lock().unwrap().push(m.content.clone()));
    let history = Arc::new(Mutex::new(Vec::new()));
    let h = history.clone();
    let _history = manager.on_conversation_history(move |ms| h.lock().unwrap().extend(ms.iter().map(|m| m.id)));

    manager.connect("tok-ana").await.unwrap();
    assert_eq!(manager.connection_state(), ConnectionState::Connected);
    assert_eq!(*hub.tokens.lock().unwrap(), vec!["tok-ana".to_string()]);

    manager.send_message(UserId(2), "hello").await;
    manager.get_conversation(UserId(2)).await;

    wait_until(|| !history.lock().unwrap().is_empty()).await;
    assert_eq!(*confirmed.lock().unwrap(), vec!["hello".to_string()]);
    assert_eq!(*history.lock().unwrap(), vec![7]);
    assert_eq!(manager.queue_len(), 0);

    manager.disconnect().await;
    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn offline_messages_flush_after_connecting() {
    let (url, _hub) = spawn_hub(Mode::Serve).await;
    let manager = manager(&url);

    let confirmed = Arc::new(Mutex::new(Vec::new()));
    let c = confirmed.clone();
    let _sent = manager.on_message_sent(move |m| c.lock().unwrap().push(m.content.clone()));

    manager.send_message(UserId(5), "hi").await;
    assert_eq!(manager.queue_len(), 1);

    manager.connect("tok").await.unwrap();
    wait_until(|| !confirmed.lock().unwrap().is_empty()).await;
    assert_eq!(*confirmed.lock().unwrap(), vec!["hi".to_string()]);
    assert_eq!(manager.queue_len(), 0);
}

#[tokio::test]
async fn rejected_handshake_is_an_error_state() {
    let (url, _hub) = spawn_hub(Mode::RejectHandshake).await;
    let manager = manager(&url);

    let result = manager.connect("bad").await;
    assert!(matches!(result, Err(HubError::Handshake(_))));
    assert_eq!(manager.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn unreachable_hub_fails_to_connect() {
    let manager = manager("http://127.0.0.1:1/hubs/chat");
    assert!(manager.connect("tok").await.is_err());
    assert_eq!(manager.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn dropped_connection_reconnects() {
    let (url, hub) = spawn_hub(Mode::DropFirstConnection).await;
    let manager = manager(&url);

    let states = Arc::new(Mutex::new(Vec::new()));
    let s = states.clone();
    let _states = manager.on_connection_state_changed(move |state| s.lock().unwrap().push(*state));

    manager.connect("tok").await.unwrap();
    wait_until(|| states.lock().unwrap().len() == 4).await;

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(hub.connections.load(Ordering::SeqCst), 2);
    assert_eq!(*hub.tokens.lock().unwrap(), vec!["tok".to_string(), "tok".to_string()]);

    let confirmed = Arc::new(Mutex::new(Vec::new()));
    let c = confirmed.clone();
    let _sent = manager.on_message_sent(move |m| c.lock().unwrap().push(m.id));
    manager.send_message(UserId(3), "after reconnect").await;
    wait_until(|| !confirmed.lock().unwrap().is_empty()).await;

    manager.disconnect().await;
}

#[tokio::test]
async fn server_close_without_reconnect_is_an_error() {
    let (url, _hub) = spawn_hub(Mode::CloseWithError).await;
    let manager = manager(&url);

    manager.connect("tok").await.unwrap();
    wait_until(|| manager.connection_state() == ConnectionState::Error).await;

    manager.send_message(UserId(2), "queued").await;
    assert_eq!(manager.queue_len(), 1);
}
