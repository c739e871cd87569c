//! REST client wrapper.
//!
//! Every request carries the stored credential as a bearer header. A 401 on
//! any call tears down the session and sends the router to `/login`, no
//! matter which screen issued the request.

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::routes::{Navigator, Route};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        reqwest::Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(concat!("hubchat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            navigator,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.http.get(self.url(path));
        self.execute(request).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)).json(body);
        self.execute(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let request = match self.session.credential() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let response = self.check(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        debug!(status = %status, url = %response.url(), "API response");

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %response.url(), "Authentication rejected; ending session");
            if let Err(e) = self.session.clear() {
                error!(error = %e, "Failed to clear session after 401");
            }
            self.navigator.navigate(Route::Login);
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
            warn!(status = status.as_u16(), message = %message, "API request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

/// Pull a human-readable message out of an error body: `{"message": ..}`,
/// `{"error": ..}`, a JSON string, or plain text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) => Some(s),
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Err(_) => Some(body.to_string()),
    }
}
