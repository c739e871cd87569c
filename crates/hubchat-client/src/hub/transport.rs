//! Seam between the connection manager and the wire.
//!
//! A transport owns one logical hub connection, including its own
//! reconnect loop. Everything it observes flows back to the manager as
//! [`TransportEvent`]s on the sink handed over at construction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::error::HubError;
use crate::hub::retry::RetryPolicy;
use crate::hub::ws::WsHubTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The server invoked a client method.
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    /// The connection dropped and automatic reconnection has begun.
    Reconnecting { error: Option<String> },
    /// Automatic reconnection succeeded.
    Reconnected,
    /// The connection is gone for good (stopped, or refused by the server).
    Closed { error: Option<String> },
}

pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Open the connection and complete the handshake.
    async fn start(&self) -> Result<(), HubError>;

    /// Close the connection and stop reconnecting.
    async fn stop(&self);

    /// Invoke a hub method and wait for its completion.
    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, HubError>;
}

/// Builds one transport per `connect` call.
pub trait TransportFactory: Send + Sync {
    fn create(&self, credential: &str, events: EventSink) -> Result<Arc<dyn HubTransport>, HubError>;
}

/// Timing knobs for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub handshake_timeout: Duration,
    pub keepalive_interval: Duration,
    pub server_timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&ClientConfig> for TransportOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout,
            keepalive_interval: config.keepalive_interval,
            server_timeout: config.server_timeout,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// Factory for [`WsHubTransport`].
pub struct WsTransportFactory {
    hub_url: String,
    options: TransportOptions,
}

impl WsTransportFactory {
    pub fn new(hub_url: &str, options: TransportOptions) -> Self {
        Self {
            hub_url: hub_url.to_string(),
            options,
        }
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(&self, credential: &str, events: EventSink) -> Result<Arc<dyn HubTransport>, HubError> {
        let transport = WsHubTransport::new(&self.hub_url, credential, self.options.clone(), events)?;
        Ok(Arc::new(transport))
    }
}
