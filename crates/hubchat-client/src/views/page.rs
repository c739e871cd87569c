//! The chat page: wires the connection manager and the user directory into a
//! [`ChatView`] for as long as the page is mounted.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use hubchat_shared::{ConnectionState, Message, User, UserId};

use crate::app::ChatApp;
use crate::directory::UserDirectory;
use crate::error::{ApiError, PageError};
use crate::events::{Listeners, Subscription};
use crate::hub::ConnectionManager;
use crate::lock;
use crate::routes::{Navigator, Route};
use crate::views::chat::ChatView;

/// What changed in the view after a pushed event.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Appended to the open thread.
    ThreadMessage(Message),
    /// Received for a conversation that is not open.
    OtherMessage(Message),
    History,
    UserJoined(User),
    Connection(ConnectionState),
}

pub struct ChatPage {
    view: Arc<Mutex<ChatView>>,
    hub: ConnectionManager,
    directory: UserDirectory,
    events: Arc<Listeners<PageEvent>>,
    subscriptions: Vec<Subscription>,
}

impl ChatPage {
    /// Subscribe to the hub, connect with the stored credential and load the
    /// directory.
    ///
    /// Without a session the router is sent to `/login` and nothing is
    /// mounted. A failed hub connection only shows in the status indicator.
    pub async fn mount(app: &ChatApp) -> Result<Self, PageError> {
        let Some(session) = app.session().current() else {
            app.router().navigate(Route::Login);
            return Err(PageError::NotAuthenticated);
        };

        let hub = app.hub().clone();
        let mut view = ChatView::new(session.user_id);
        view.set_connection_state(hub.connection_state());
        let view = Arc::new(Mutex::new(view));
        let events = Arc::new(Listeners::new("page"));

        let subscriptions = subscribe(&hub, &view, &events);
        let page = Self {
            view,
            hub,
            directory: app.directory().clone(),
            events,
            subscriptions,
        };

        if let Err(e) = page.hub.connect(&session.credential).await {
            warn!(error = %e, "Hub unavailable; chat is offline");
        }

        match page.refresh_users().await {
            Ok(()) => {}
            Err(ApiError::Unauthorized) => {
                page.unmount().await;
                return Err(PageError::Unauthorized);
            }
            Err(e) => warn!(error = %e, "Failed to load user directory"),
        }

        info!(user_id = %session.user_id, "Chat page mounted");
        Ok(page)
    }

    /// Reload the directory from the server.
    pub async fn refresh_users(&self) -> Result<(), ApiError> {
        let users = self.directory.fetch_users().await?;
        lock(&self.view).set_users(users);
        Ok(())
    }

    /// Open a conversation and request its history. The thread is empty
    /// until the history arrives.
    pub async fn select_user(&self, id: UserId) -> bool {
        let selected = lock(&self.view).select_user(id);
        if !selected {
            return false;
        }
        self.hub.get_conversation(id).await;
        true
    }

    /// Send composer text to the open conversation. Returns `false` when
    /// there is nothing to send or no conversation is open.
    pub async fn send(&self, text: &str) -> bool {
        let composed = lock(&self.view).compose(text);
        let Some((to, content)) = composed else {
            return false;
        };
        self.hub.send_message(to, &content).await;
        true
    }

    pub fn snapshot(&self) -> ChatView {
        lock(&self.view).clone()
    }

    /// Called after each pushed event has been applied to the view.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PageEvent, &ChatView) + Send + Sync + 'static,
    {
        let view = self.view.clone();
        self.events.subscribe(move |event| listener(event, &lock(&view)))
    }

    /// Drop every hub subscription and close the connection.
    pub async fn unmount(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        self.hub.disconnect().await;
        info!("Chat page unmounted");
    }
}

fn subscribe(
    hub: &ConnectionManager,
    view: &Arc<Mutex<ChatView>>,
    events: &Arc<Listeners<PageEvent>>,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(5);

    let (v, e) = (view.clone(), events.clone());
    subscriptions.push(hub.on_message_received(move |message| {
        let appended = lock(&v).on_message(message);
        e.emit(&if appended {
            PageEvent::ThreadMessage(message.clone())
        } else {
            PageEvent::OtherMessage(message.clone())
        });
    }));

    let (v, e) = (view.clone(), events.clone());
    subscriptions.push(hub.on_message_sent(move |message| {
        let appended = lock(&v).on_message(message);
        if appended {
            e.emit(&PageEvent::ThreadMessage(message.clone()));
        }
    }));

    let (v, e) = (view.clone(), events.clone());
    subscriptions.push(hub.on_conversation_history(move |messages| {
        lock(&v).on_history(messages);
        e.emit(&PageEvent::History);
    }));

    let (v, e) = (view.clone(), events.clone());
    subscriptions.push(hub.on_connection_state_changed(move |state| {
        lock(&v).set_connection_state(*state);
        e.emit(&PageEvent::Connection(*state));
    }));

    let (v, e) = (view.clone(), events.clone());
    subscriptions.push(hub.on_user_registered(move |user| {
        let added = lock(&v).add_user(user.clone());
        if added {
            e.emit(&PageEvent::UserJoined(user.clone()));
        }
    }));

    subscriptions
}
