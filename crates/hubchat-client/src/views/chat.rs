//! View state of the chat screen: directory, selection, thread and the
//! connection indicator.

use hubchat_shared::{ConnectionState, ConversationKey, Message, User, UserId};

#[derive(Debug, Clone)]
pub struct ChatView {
    me: UserId,
    users: Vec<User>,
    selected: Option<UserId>,
    messages: Vec<Message>,
    connection: ConnectionState,
}

impl ChatView {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            users: Vec::new(),
            selected: None,
            messages: Vec::new(),
            connection: ConnectionState::Disconnected,
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn selected_id(&self) -> Option<UserId> {
        self.selected
    }

    pub fn selected_user(&self) -> Option<&User> {
        let id = self.selected?;
        self.user(id)
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Replace the directory. The signed-in user and repeated ids are left
    /// out.
    pub fn set_users(&mut self, users: Vec<User>) {
        self.users.clear();
        for user in users {
            self.add_user(user);
        }
    }

    /// Merge a newly announced user. Returns `false` for our own id or an id
    /// already listed.
    pub fn add_user(&mut self, user: User) -> bool {
        if user.id == self.me || self.users.iter().any(|u| u.id == user.id) {
            return false;
        }
        self.users.push(user);
        true
    }

    /// Open the conversation with `id`, emptying the thread until history
    /// arrives. Unknown ids are ignored.
    pub fn select_user(&mut self, id: UserId) -> bool {
        if self.user(id).is_none() {
            return false;
        }
        self.selected = Some(id);
        self.messages.clear();
        true
    }

    pub fn active_conversation(&self) -> Option<ConversationKey> {
        self.selected.map(|other| ConversationKey::new(self.me, other))
    }

    /// Append a pushed or confirmed message if it belongs to the open
    /// conversation.
    pub fn on_message(&mut self, message: &Message) -> bool {
        let Some(key) = self.active_conversation() else {
            return false;
        };
        if !message.belongs_to(key) || self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message.clone());
        true
    }

    /// Replace the thread with a history batch, keeping only messages of the
    /// open conversation, oldest first.
    pub fn on_history(&mut self, messages: &[Message]) {
        let Some(key) = self.active_conversation() else {
            return;
        };
        let mut thread: Vec<Message> = messages
            .iter()
            .filter(|m| m.belongs_to(key))
            .cloned()
            .collect();
        thread.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        thread.dedup_by_key(|m| m.id);
        self.messages = thread;
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    /// Validate composer input: trimmed, non-empty, with a conversation open.
    pub fn compose(&self, text: &str) -> Option<(UserId, String)> {
        let to = self.selected?;
        let content = text.trim();
        if content.is_empty() {
            return None;
        }
        Some((to, content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user(id: i64, name: &str) -> User {
        User {
            id: UserId(id),
            username: name.into(),
        }
    }

    fn msg(id: i64, from: i64, to: i64, secs: i64) -> Message {
        Message {
            id,
            sender_id: UserId(from),
            receiver_id: UserId(to),
            content: format!("m{id}"),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn view() -> ChatView {
        let mut view = ChatView::new(UserId(1));
        view.set_users(vec![user(1, "me"), user(2, "bob"), user(3, "cy"), user(2, "bob")]);
        view
    }

    #[test]
    fn directory_excludes_self_and_duplicates() {
        let view = view();
        let ids: Vec<i64> = view.users().iter().map(|u| u.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn own_registration_announcement_is_ignored() {
        let mut view = view();
        assert!(!view.add_user(user(1, "me")));
        assert!(!view.add_user(user(3, "cy")));
        assert_eq!(view.users().len(), 2);

        assert!(view.add_user(user(4, "dee")));
        assert_eq!(view.users().last().unwrap().username, "dee");
    }

    #[test]
    fn selecting_clears_the_thread_immediately() {
        let mut view = view();
        view.select_user(UserId(2));
        view.on_message(&msg(1, 2, 1, 0));
        assert_eq!(view.messages().len(), 1);

        assert!(view.select_user(UserId(3)));
        assert!(view.messages().is_empty());
        assert!(!view.select_user(UserId(99)));
        assert_eq!(view.selected_id(), Some(UserId(3)));
    }

    #[test]
    fn only_active_conversation_messages_are_appended() {
        let mut view = view();
        assert!(!view.on_message(&msg(1, 2, 1, 0)));

        view.select_user(UserId(2));
        assert!(view.on_message(&msg(2, 2, 1, 0)));
        assert!(view.on_message(&msg(3, 1, 2, 1)));
        assert!(!view.on_message(&msg(4, 3, 1, 2)));
        assert!(!view.on_message(&msg(3, 1, 2, 1)));

        let ids: Vec<i64> = view.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn history_replaces_and_orders_the_thread() {
        let mut view = view();
        view.select_user(UserId(2));
        view.on_message(&msg(9, 2, 1, 50));

        view.on_history(&[msg(5, 1, 2, 20), msg(4, 2, 1, 10), msg(7, 3, 1, 5)]);
        let ids: Vec<i64> = view.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn composer_needs_selection_and_text() {
        let mut view = view();
        assert_eq!(view.compose("hi"), None);

        view.select_user(UserId(3));
        assert_eq!(view.compose("   "), None);
        assert_eq!(view.compose("  hi \n"), Some((UserId(3), "hi".to_string())));
    }
}
