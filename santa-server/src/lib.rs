pub mod config;
pub mod error;
pub mod friends;
pub mod identity;
pub mod memories;
pub mod notifications;
pub mod paths;
pub mod planner;
pub mod routes;
pub mod secret_santa;
pub mod store;
#[cfg(test)]
mod testing;
pub mod users;
pub mod wishlist;

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::config::Config;
use crate::store::Store;

pub use crate::error::{AppError, Result, SantaError, SantaResult};
pub use crate::routes::app;

#[derive(Clone)]
pub struct State {
    store: Store,
    origin: Arc<str>,
    relationship_writes: Arc<Mutex<()>>,
    group_writes: Arc<Mutex<()>>,
}

impl State {
    pub fn new(store: Store, origin: impl AsRef<str>) -> Self {
        Self {
            store,
            origin: Arc::from(origin.as_ref()),
            relationship_writes: Arc::new(Mutex::new(())),
            group_writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let store = Store::open(&config.db_path)
            .with_context(|| format!("Error opening store at {}", config.db_path))?;
        Ok(Self::new(store, &config.origin))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Held across the read-check-write sequences of the friend flow so two
    /// requests for the same pair cannot both pass the existence check.
    pub(crate) async fn lock_relationships(&self) -> MutexGuard<'_, ()> {
        self.relationship_writes.lock().await
    }

    /// Held while a group's existence is checked and its membership changed,
    /// so a join cannot land after a delete.
    pub(crate) async fn lock_groups(&self) -> MutexGuard<'_, ()> {
        self.group_writes.lock().await
    }
}

/// Serves the API on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: State,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::Server::from_tcp(listener)?
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
