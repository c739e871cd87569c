//! Plain-text rendering for the console front-end.

use hubchat_shared::{ConnectionState, Message};

use crate::views::chat::ChatView;
use crate::views::status::{indicator, Tone};

pub fn status_line(state: ConnectionState) -> String {
    let status = indicator(state);
    let marker = match status.tone {
        Tone::Positive => "+",
        Tone::Pending => "~",
        Tone::Neutral => "-",
        Tone::Negative => "!",
    };
    format!("[{marker}] {}", status.label)
}

/// One line per user; the open conversation is marked with `>`.
pub fn user_list(view: &ChatView) -> Vec<String> {
    if view.users().is_empty() {
        return vec!["  (no other users yet)".to_string()];
    }
    view.users()
        .iter()
        .map(|user| {
            let marker = if view.selected_id() == Some(user.id) { '>' } else { ' ' };
            format!("{marker} {:>4}  {}", user.id.0, user.username)
        })
        .collect()
}

pub fn message_line(view: &ChatView, message: &Message) -> String {
    let author = if message.sender_id == view.me() {
        "you".to_string()
    } else {
        view.user(message.sender_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| format!("user {}", message.sender_id))
    };
    format!(
        "[{}] {author}: {}",
        message.timestamp.format("%H:%M"),
        message.content
    )
}

pub fn thread_lines(view: &ChatView) -> Vec<String> {
    match view.selected_user() {
        None => vec!["  (select a user with /open <id>)".to_string()],
        Some(_) if view.messages().is_empty() => vec!["  (no messages yet)".to_string()],
        Some(_) => view
            .messages()
            .iter()
            .map(|m| message_line(view, m))
            .collect(),
    }
}
