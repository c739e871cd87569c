pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod hub;
pub mod routes;
pub mod session;
pub mod storage;
pub mod views;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing_subscriber::{fmt, EnvFilter};

pub use app::ChatApp;
pub use config::ClientConfig;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hubchat_client=info,hubchat_shared=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
