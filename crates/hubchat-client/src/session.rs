//! The single session slot: credential plus user identity.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hubchat_shared::constants::{STORAGE_KEY_TOKEN, STORAGE_KEY_USERNAME, STORAGE_KEY_USER_ID};
use hubchat_shared::{Session, UserId};

use crate::error::StorageError;
use crate::storage::KeyValueStore;

const SESSION_KEYS: [&str; 3] = [STORAGE_KEY_TOKEN, STORAGE_KEY_USER_ID, STORAGE_KEY_USERNAME];

/// Reads and writes the session through a [`KeyValueStore`]. The three keys
/// are always written and cleared together.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Overwrite the slot with `session`.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        self.storage.set_many(&[
            (STORAGE_KEY_TOKEN, session.credential.clone()),
            (STORAGE_KEY_USER_ID, session.user_id.to_string()),
            (STORAGE_KEY_USERNAME, session.username.clone()),
        ])?;
        info!(user_id = %session.user_id, username = %session.username, "Session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_many(&SESSION_KEYS)?;
        info!("Session cleared");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// The stored session, or `None` unless all three keys are present and
    /// the user id parses.
    pub fn current(&self) -> Option<Session> {
        let credential = self.storage.get(STORAGE_KEY_TOKEN)?;
        let raw_id = self.storage.get(STORAGE_KEY_USER_ID)?;
        let username = self.storage.get(STORAGE_KEY_USERNAME)?;

        if credential.is_empty() {
            return None;
        }

        let user_id = match raw_id.parse::<UserId>() {
            Ok(id) => id,
            Err(e) => {
                warn!(value = %raw_id, error = %e, "Stored user id is not a number");
                return None;
            }
        };

        Some(Session {
            user_id,
            username,
            credential,
        })
    }

    /// Just the bearer credential, for request decoration.
    pub fn credential(&self) -> Option<String> {
        let token = self.storage.get(STORAGE_KEY_TOKEN);
        if token.is_none() {
            debug!("No stored credential");
        }
        token.filter(|t| !t.is_empty())
    }
}
