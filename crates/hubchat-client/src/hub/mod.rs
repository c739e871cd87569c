//! Real-time hub connection: transport seam, WebSocket transport, retry
//! schedule, offline queue and the manager tying them together.

pub mod manager;
pub mod queue;
pub mod retry;
pub mod transport;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::ConnectionManager;
pub use retry::RetryPolicy;
pub use transport::{
    EventSink, HubTransport, TransportEvent, TransportFactory, TransportOptions, WsTransportFactory,
};
pub use ws::WsHubTransport;
