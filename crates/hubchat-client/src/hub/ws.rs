//! WebSocket transport speaking the JSON hub protocol.
//!
//! `start` opens the socket and completes the handshake, then hands the
//! socket to a supervisor task. The supervisor drives reads, writes and
//! keep-alives, and on loss walks the [`RetryPolicy`] until a new socket is
//! up or the transport is stopped.
//!
//! [`RetryPolicy`]: crate::hub::retry::RetryPolicy

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use hubchat_shared::constants::ACCESS_TOKEN_PARAM;
use hubchat_shared::protocol::{handshake_request, parse_handshake_response, split_records};
use hubchat_shared::HubMessage;

use crate::error::HubError;
use crate::hub::transport::{EventSink, HubTransport, TransportEvent, TransportOptions};
use crate::lock;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Completion = oneshot::Sender<Result<Value, HubError>>;

/// Turn the configured hub URL into the socket URL: `http`→`ws`,
/// `https`→`wss`, credential appended as `access_token`.
pub fn build_hub_url(hub_url: &str, credential: &str) -> Result<String, HubError> {
    let mut url = reqwest::Url::parse(hub_url)
        .map_err(|e| HubError::InvalidUrl(format!("{hub_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::InvalidUrl(format!(
                "{hub_url}: unsupported scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| HubError::InvalidUrl(format!("{hub_url}: cannot switch to {scheme}")))?;
    url.query_pairs_mut().append_pair(ACCESS_TOKEN_PARAM, credential);

    Ok(url.to_string())
}

struct Shared {
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    pending: Mutex<HashMap<String, Completion>>,
    next_invocation: AtomicU64,
    stopping: AtomicBool,
    stop: Notify,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Open a fresh outbound channel for the next socket.
    fn install_outbound(&self) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        rx
    }

    fn complete(&self, invocation_id: &str, outcome: Result<Value, HubError>) {
        match lock(&self.pending).remove(invocation_id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!(invocation = invocation_id, "Completion for unknown invocation"),
        }
    }

    /// Drop the outbound channel and fail every invocation still waiting.
    fn fail_pending(&self, reason: &str) {
        *lock(&self.outbound) = None;
        let waiting: Vec<Completion> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        if !waiting.is_empty() {
            debug!(count = waiting.len(), reason, "Failing pending invocations");
        }
        for tx in waiting {
            let _ = tx.send(Err(HubError::ConnectionLost(reason.to_string())));
        }
    }
}

enum DriveOutcome {
    Stopped,
    Closed {
        error: Option<String>,
        allow_reconnect: bool,
    },
    Lost(String),
}

pub struct WsHubTransport {
    endpoint: String,
    url: String,
    options: TransportOptions,
    events: EventSink,
    shared: Arc<Shared>,
}

impl WsHubTransport {
    pub fn new(
        hub_url: &str,
        credential: &str,
        options: TransportOptions,
        events: EventSink,
    ) -> Result<Self, HubError> {
        let url = build_hub_url(hub_url, credential)?;
        Ok(Self {
            endpoint: hub_url.to_string(),
            url,
            options,
            events,
            shared: Arc::new(Shared {
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_invocation: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
                stop: Notify::new(),
                supervisor: Mutex::new(None),
            }),
        })
    }
}

#[async_trait]
impl HubTransport for WsHubTransport {
    async fn start(&self) -> Result<(), HubError> {
        if lock(&self.shared.supervisor).is_some() {
            debug!(endpoint = %self.endpoint, "Hub transport already started");
            return Ok(());
        }

        let (socket, leftover) = open_socket(&self.url, self.options.handshake_timeout).await?;

        if self.shared.stopping.load(Ordering::SeqCst) {
            let mut socket = socket;
            let _ = socket.close(None).await;
            return Err(HubError::ConnectionLost("stopped during handshake".into()));
        }

        info!(endpoint = %self.endpoint, "Hub connection established");

        let outbound = self.shared.install_outbound();
        let task = tokio::spawn(supervise(
            self.shared.clone(),
            self.url.clone(),
            self.options.clone(),
            self.events.clone(),
            socket,
            leftover,
            outbound,
        ));
        *lock(&self.shared.supervisor) = Some(task);

        Ok(())
    }

    async fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.stop.notify_one();

        let task = lock(&self.shared.supervisor).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Hub supervisor task failed");
            }
        }

        self.shared.fail_pending("connection stopped");
        debug!(endpoint = %self.endpoint, "Hub transport stopped");
    }

    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, HubError> {
        let sender = lock(&self.shared.outbound)
            .clone()
            .ok_or(HubError::NotConnected)?;

        let id = self
            .shared
            .next_invocation
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let record = HubMessage::invocation(Some(id.clone()), target, arguments).to_record()?;

        // Registered before the write so a racing disconnect always fails it.
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id.clone(), tx);

        if sender.send(WsMessage::Text(record)).is_err() {
            lock(&self.shared.pending).remove(&id);
            return Err(HubError::NotConnected);
        }
        trace!(invocation = %id, method = target, "Invocation sent");

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(HubError::ConnectionLost("invocation abandoned".into())),
        }
    }
}

impl Drop for WsHubTransport {
    fn drop(&mut self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.stop.notify_one();
    }
}

async fn open_socket(url: &str, handshake_timeout: Duration) -> Result<(Socket, Vec<String>), HubError> {
    time::timeout(handshake_timeout, handshake(url))
        .await
        .map_err(|_| HubError::HandshakeTimeout)?
}

/// Connect and exchange handshake records. Returns any records that arrived
/// in the same frame as the handshake reply.
async fn handshake(url: &str) -> Result<(Socket, Vec<String>), HubError> {
    let (mut socket, _response) = connect_async(url).await?;
    socket.send(WsMessage::Text(handshake_request()?)).await?;

    while let Some(frame) = socket.next().await {
        match frame? {
            WsMessage::Text(text) => {
                let mut records = split_records(&text);
                let reply = records
                    .next()
                    .ok_or_else(|| HubError::Handshake("empty handshake reply".into()))?;
                parse_handshake_response(reply).map_err(|e| HubError::Handshake(e.to_string()))?;
                let leftover = records.map(str::to_string).collect();
                return Ok((socket, leftover));
            }
            WsMessage::Close(frame) => return Err(HubError::Handshake(close_reason(frame.as_ref()))),
            WsMessage::Binary(_) => {
                return Err(HubError::Handshake("unexpected binary frame".into()))
            }
            _ => continue,
        }
    }

    Err(HubError::Handshake("socket ended during handshake".into()))
}

async fn supervise(
    shared: Arc<Shared>,
    url: String,
    options: TransportOptions,
    events: EventSink,
    mut socket: Socket,
    mut leftover: Vec<String>,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
) {
    loop {
        let outcome = drive(&shared, &events, &options, socket, leftover, outbound).await;

        let error = match outcome {
            DriveOutcome::Stopped => {
                shared.fail_pending("connection stopped");
                info!("Hub connection closed");
                let _ = events.send(TransportEvent::Closed { error: None });
                return;
            }
            DriveOutcome::Closed {
                error,
                allow_reconnect: false,
            } => {
                shared.fail_pending("closed by server");
                warn!(error = ?error, "Hub closed the connection");
                let _ = events.send(TransportEvent::Closed { error });
                return;
            }
            DriveOutcome::Closed {
                error,
                allow_reconnect: true,
            } => error,
            DriveOutcome::Lost(reason) => Some(reason),
        };

        let reason = error
            .clone()
            .unwrap_or_else(|| "server requested reconnect".to_string());
        shared.fail_pending(&reason);
        warn!(reason = %reason, "Hub connection lost; reconnecting");
        let _ = events.send(TransportEvent::Reconnecting { error });

        match reconnect(&shared, &url, &options).await {
            Some((next_socket, next_leftover)) => {
                socket = next_socket;
                leftover = next_leftover;
                outbound = shared.install_outbound();
                info!("Hub connection re-established");
                let _ = events.send(TransportEvent::Reconnected);
            }
            None => {
                shared.fail_pending("connection stopped");
                info!("Reconnect abandoned; transport stopped");
                let _ = events.send(TransportEvent::Closed { error: None });
                return;
            }
        }
    }
}

async fn reconnect(
    shared: &Shared,
    url: &str,
    options: &TransportOptions,
) -> Option<(Socket, Vec<String>)> {
    let mut attempt = 0usize;
    loop {
        let delay = options.retry.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect attempt");

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shared.stop.notified() => return None,
        }
        if shared.stopping.load(Ordering::SeqCst) {
            return None;
        }

        tokio::select! {
            result = open_socket(url, options.handshake_timeout) => match result {
                Ok(opened) => return Some(opened),
                Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
            },
            _ = shared.stop.notified() => return None,
        }

        attempt += 1;
    }
}

async fn drive(
    shared: &Shared,
    events: &EventSink,
    options: &TransportOptions,
    socket: Socket,
    leftover: Vec<String>,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
) -> DriveOutcome {
    for record in &leftover {
        if let Some(outcome) = handle_record(shared, events, record) {
            return outcome;
        }
    }

    let ping = match HubMessage::Ping.to_record() {
        Ok(record) => record,
        Err(e) => return DriveOutcome::Lost(e.to_string()),
    };

    let (mut sink, mut stream) = socket.split();
    let mut keepalive = time::interval_at(
        Instant::now() + options.keepalive_interval,
        options.keepalive_interval,
    );
    let mut last_received = Instant::now();

    loop {
        let silence_deadline = last_received + options.server_timeout;

        tokio::select! {
            _ = shared.stop.notified() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return DriveOutcome::Stopped;
            }

            Some(message) = outbound.recv() => {
                if let Err(e) = sink.send(message).await {
                    return DriveOutcome::Lost(e.to_string());
                }
            }

            _ = keepalive.tick() => {
                if let Err(e) = sink.send(WsMessage::Text(ping.clone())).await {
                    return DriveOutcome::Lost(e.to_string());
                }
                trace!("Keep-alive ping sent");
            }

            _ = time::sleep_until(silence_deadline) => {
                return DriveOutcome::Lost(format!(
                    "no message from server within {:?}",
                    options.server_timeout
                ));
            }

            frame = stream.next() => {
                last_received = Instant::now();
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        for record in split_records(&text) {
                            if let Some(outcome) = handle_record(shared, events, record) {
                                return outcome;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return DriveOutcome::Lost(close_reason(frame.as_ref()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return DriveOutcome::Lost(e.to_string()),
                    None => return DriveOutcome::Lost("socket ended".to_string()),
                }
            }
        }
    }
}

fn handle_record(shared: &Shared, events: &EventSink, record: &str) -> Option<DriveOutcome> {
    let message = match HubMessage::from_record(record) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Discarding malformed hub record");
            return None;
        }
    };

    match message {
        HubMessage::Invocation {
            target, arguments, ..
        } => {
            trace!(method = %target, "Server invocation");
            let _ = events.send(TransportEvent::Invocation { target, arguments });
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            let outcome = match error {
                Some(error) => Err(HubError::Invocation(error)),
                None => Ok(result.unwrap_or(Value::Null)),
            };
            shared.complete(&invocation_id, outcome);
        }
        HubMessage::Ping => trace!("Ping from server"),
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            return Some(DriveOutcome::Closed {
                error,
                allow_reconnect,
            })
        }
        HubMessage::Other(kind) => debug!(kind, "Ignoring unsupported hub record"),
    }

    None
}

fn close_reason(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) => format!(
            "socket closed by server ({}: {})",
            u16::from(frame.code),
            frame.reason
        ),
        None => "socket closed by server".to_string(),
    }
}
