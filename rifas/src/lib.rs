//! # Rifas
//!
//! Application wiring for the raffle number sales server: configuration,
//! ticket store selection and the expiry reaper.
//!
//! Binaries:
//! - `rifas-server`: REST API over the configured store
//! - `demo`: two visitors competing for numbers through the grid

pub mod config;
pub mod reaper;

pub use config::{ClientConfig, Config, ConfigError, ReservationConfig, ServerConfig, StorageConfig};

use rifas_core::environment::Clock;
use rifas_core::memory::InMemoryTicketStore;
use rifas_core::store::{StoreError, TicketStore};
use rifas_postgres::PostgresTicketStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter for the binaries
pub const DEFAULT_LOG_FILTER: &str = "rifas=info,rifas_web=info,tower_http=debug";

/// Installs the fmt subscriber, preferring `RUST_LOG` over `fallback`
pub fn init_tracing(fallback: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Opens the configured ticket store
///
/// `PostgreSQL` when a database URL is configured (tables are created if
/// missing), the in-memory store otherwise.
///
/// # Errors
///
/// Propagates connection and migration failures.
pub async fn build_store(config: &StorageConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn TicketStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresTicketStore::connect(url, config.max_connections, clock).await?;
            store.migrate().await?;
            tracing::info!("Using PostgreSQL ticket store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory ticket store");
            Ok(Arc::new(InMemoryTicketStore::new(clock)))
        }
    }
}
