//! Durable state for soars and flaps.
//!
//! `MemoryStore` keeps everything in process and issues UUIDs; `SqliteStore`
//! survives restarts and issues short base58 IDs from a persisted sequence.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use wyvern_core::config::{StoreBackend, StoreConfig};
use wyvern_core::error::Result;
use wyvern_core::traits::Store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Open the backend selected by configuration.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.resolved_path())?)),
    }
}
