//! Application context handed to every screen.
//!
//! [`ChatApp`] owns the session store, the router, the REST clients and the
//! one [`ConnectionManager`] of the process. Screens receive it by reference
//! instead of reaching for globals.

use std::sync::Arc;

use tracing::info;

use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::config::ClientConfig;
use crate::directory::UserDirectory;
use crate::error::ApiError;
use crate::hub::{ConnectionManager, TransportFactory, TransportOptions, WsTransportFactory};
use crate::routes::Router;
use crate::session::SessionStore;
use crate::storage::{FileStorage, KeyValueStore};

pub struct ChatApp {
    config: ClientConfig,
    session: Arc<SessionStore>,
    router: Arc<Router>,
    api: ApiClient,
    auth: AuthClient,
    directory: UserDirectory,
    hub: ConnectionManager,
}

impl ChatApp {
    /// File-backed session and the WebSocket hub transport, both taken from
    /// `config`.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let storage: Arc<dyn KeyValueStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileStorage::in_dir(dir)?),
            None => Arc::new(FileStorage::new()?),
        };
        let factory = Arc::new(WsTransportFactory::new(
            &config.hub_url,
            TransportOptions::from(&config),
        ));
        Self::with_parts(config, storage, factory)
    }

    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStore>,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self, ApiError> {
        let session = Arc::new(SessionStore::new(storage));
        let router = Arc::new(Router::new(session.clone()));
        let api = ApiClient::new(&config.api_base_url, session.clone(), router.clone())?;
        let auth = AuthClient::new(api.clone(), session.clone());
        let directory = UserDirectory::new(api.clone());
        let hub = ConnectionManager::new(factory);

        info!(
            api = %config.api_base_url,
            hub = %config.hub_url,
            route = %router.current(),
            "Client initialised"
        );

        Ok(Self {
            config,
            session,
            router,
            api,
            auth,
            directory,
            hub,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn hub(&self) -> &ConnectionManager {
        &self.hub
    }
}
