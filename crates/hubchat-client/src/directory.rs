use tracing::debug;

use hubchat_shared::constants::PATH_USERS;
use hubchat_shared::User;

use crate::api::ApiClient;
use crate::error::ApiError;

/// Fetches the list of known users.
#[derive(Clone)]
pub struct UserDirectory {
    api: ApiClient,
}

impl UserDirectory {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        let users: Vec<User> = self.api.get(PATH_USERS).await?;
        debug!(count = users.len(), "Fetched user directory");
        Ok(users)
    }
}
