//! # hubchat-shared
//!
//! Domain types and the hub wire protocol shared by every hubchat crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{HubMessage, ServerEvent};
pub use types::{ConnectionState, ConversationKey, Message, PendingMessage, Session, User, UserId};
