use hubchat_shared::ConnectionState;

/// Colour family of the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Pending,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusIndicator {
    pub label: &'static str,
    pub tone: Tone,
}

pub fn indicator(state: ConnectionState) -> StatusIndicator {
    let (label, tone) = match state {
        ConnectionState::Connected => ("Connected", Tone::Positive),
        ConnectionState::Connecting => ("Connecting...", Tone::Pending),
        ConnectionState::Reconnecting => ("Reconnecting...", Tone::Pending),
        ConnectionState::Disconnected => ("Disconnected", Tone::Neutral),
        ConnectionState::Error => ("Connection error", Tone::Negative),
    };
    StatusIndicator { label, tone }
}
