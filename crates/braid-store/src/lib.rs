//! `StateRepository` implementations.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use braid_core::config::{StoreBackend, StoreConfig};
use braid_core::error::Result;
use braid_core::traits::StateRepository;

pub use memory::InMemoryStateRepository;
pub use sqlite::SqliteStateRepository;

/// Open the repository selected by `[store]`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn StateRepository>> {
    Ok(match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStateRepository::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStateRepository::open(&config.resolved_path())?),
    })
}
