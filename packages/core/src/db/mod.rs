//! Database Layer
//!
//! This module holds the page store abstraction and its implementations:
//!
//! - `NodeStore` - async trait every store implements
//! - `DatabaseService` / `TursoStore` - libsql file database (WAL, busy timeout)
//! - `MemoryStore` - in-process store for tests and tooling
//!
//! Services receive an `Arc<dyn NodeStore>` and never see which one is in use.

mod database;
mod error;
mod memory_store;
mod node_store;
mod turso_store;

pub use database::{DatabaseService, DbNodeParams};
pub use error::DatabaseError;
pub use memory_store::MemoryStore;
pub use node_store::{NodeStore, SaveResult};
pub use turso_store::TursoStore;
