//! JSON hub protocol spoken over the real-time socket.
//!
//! Every record is a JSON object terminated by [`RECORD_SEPARATOR`]. The
//! connection opens with a handshake record in each direction, after which
//! records carry a numeric `type` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::{Message, User};

const TYPE_INVOCATION: u64 = 1;
const TYPE_COMPLETION: u64 = 3;
const TYPE_PING: u64 = 6;
const TYPE_CLOSE: u64 = 7;

/// All hub records this client understands
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side. Without an id no completion is sent.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },

    /// Result of an invocation that carried an id
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },

    /// Keep-alive
    Ping,

    /// The server is closing the connection
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },

    /// A record type this client ignores (stream items, cancellations, ...)
    Other(u64),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationRecord {
    #[serde(default)]
    invocation_id: Option<String>,
    target: String,
    #[serde(default)]
    arguments: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRecord {
    invocation_id: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseRecord {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

impl HubMessage {
    pub fn invocation(invocation_id: Option<String>, target: &str, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id,
            target: target.to_string(),
            arguments,
        }
    }

    /// Serialize to a single record, separator included.
    pub fn to_record(&self) -> Result<String, ProtocolError> {
        let value = match self {
            Self::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let mut v = json!({
                    "type": TYPE_INVOCATION,
                    "target": target,
                    "arguments": arguments,
                });
                if let Some(id) = invocation_id {
                    v["invocationId"] = Value::String(id.clone());
                }
                v
            }
            Self::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut v = json!({
                    "type": TYPE_COMPLETION,
                    "invocationId": invocation_id,
                });
                if let Some(error) = error {
                    v["error"] = Value::String(error.clone());
                } else if let Some(result) = result {
                    v["result"] = result.clone();
                }
                v
            }
            Self::Ping => json!({ "type": TYPE_PING }),
            Self::Close {
                error,
                allow_reconnect,
            } => {
                let mut v = json!({ "type": TYPE_CLOSE, "allowReconnect": allow_reconnect });
                if let Some(error) = error {
                    v["error"] = Value::String(error.clone());
                }
                v
            }
            Self::Other(kind) => json!({ "type": kind }),
        };

        let mut record = serde_json::to_string(&value)?;
        record.push(RECORD_SEPARATOR);
        Ok(record)
    }

    /// Parse one record (without its separator).
    pub fn from_record(record: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(record)?;
        let kind = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingType)?;

        let msg = match kind {
            TYPE_INVOCATION => {
                let r: InvocationRecord = serde_json::from_value(value)?;
                Self::Invocation {
                    invocation_id: r.invocation_id,
                    target: r.target,
                    arguments: r.arguments,
                }
            }
            TYPE_COMPLETION => {
                let r: CompletionRecord = serde_json::from_value(value)?;
                Self::Completion {
                    invocation_id: r.invocation_id,
                    result: r.result,
                    error: r.error,
                }
            }
            TYPE_PING => Self::Ping,
            TYPE_CLOSE => {
                let r: CloseRecord = serde_json::from_value(value)?;
                Self::Close {
                    error: r.error,
                    allow_reconnect: r.allow_reconnect,
                }
            }
            other => Self::Other(other),
        };

        Ok(msg)
    }
}

/// Split a socket frame into its records. A frame may hold several records
/// and always ends with a separator.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

/// The opening record sent by the client.
pub fn handshake_request() -> Result<String, ProtocolError> {
    let mut record = serde_json::to_string(&HandshakeRequest {
        protocol: HUB_PROTOCOL,
        version: HUB_PROTOCOL_VERSION,
    })?;
    record.push(RECORD_SEPARATOR);
    Ok(record)
}

/// Check the server's handshake reply. `{}` accepts, `{"error": ..}` rejects.
pub fn parse_handshake_response(record: &str) -> Result<(), ProtocolError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(ProtocolError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Typed view of the invocations the hub pushes to clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ReceiveMessage(Message),
    MessageSent(Message),
    ConversationHistory(Vec<Message>),
    UserRegistered(User),
    Error(String),
}

impl ServerEvent {
    /// Decode a pushed invocation. Returns `Ok(None)` for targets this
    /// client does not handle.
    pub fn from_invocation(target: &str, arguments: Vec<Value>) -> Result<Option<Self>, ProtocolError> {
        let first = |arguments: Vec<Value>| {
            arguments
                .into_iter()
                .next()
                .ok_or_else(|| ProtocolError::MissingArgument {
                    target: target.to_string(),
                    index: 0,
                })
        };

        let event = match target {
            EVENT_RECEIVE_MESSAGE => Self::ReceiveMessage(serde_json::from_value(first(arguments)?)?),
            EVENT_MESSAGE_SENT => Self::MessageSent(serde_json::from_value(first(arguments)?)?),
            EVENT_CONVERSATION_HISTORY => {
                Self::ConversationHistory(serde_json::from_value(first(arguments)?)?)
            }
            EVENT_USER_REGISTERED => Self::UserRegistered(serde_json::from_value(first(arguments)?)?),
            EVENT_ERROR => {
                let detail = match first(arguments)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Self::Error(detail)
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}
