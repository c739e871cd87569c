//! Login, registration and logout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use hubchat_shared::constants::{PATH_LOGIN, PATH_REGISTER};
use hubchat_shared::{Session, UserId};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::session::SessionStore;

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    user_id: UserId,
    username: String,
}

impl From<AuthResponse> for Session {
    fn from(r: AuthResponse) -> Self {
        Self {
            user_id: r.user_id,
            username: r.username,
            credential: r.token,
        }
    }
}

#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    session: Arc<SessionStore>,
}

impl AuthClient {
    pub fn new(api: ApiClient, session: Arc<SessionStore>) -> Self {
        Self { api, session }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        self.authenticate(PATH_LOGIN, username, password).await
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        self.authenticate(PATH_REGISTER, username, password).await
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.clear()?;
        info!("Logged out");
        Ok(())
    }

    async fn authenticate(&self, path: &str, username: &str, password: &str) -> Result<Session, ApiError> {
        let response: AuthResponse = self
            .api
            .post(path, &Credentials { username, password })
            .await?;

        let session = Session::from(response);
        self.session.save(&session)?;

        info!(user_id = %session.user_id, username = %session.username, path, "Authenticated");
        Ok(session)
    }
}
