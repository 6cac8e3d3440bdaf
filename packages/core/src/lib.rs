//! Club Site Page Tree
//!
//! This crate maintains the hierarchical page tree of a club website: pages
//! form a parent-linked tree, each page caches a route path built from its
//! ancestors' titles, and edits keep descendants' route paths and
//! publication flags consistent.
//!
//! # Architecture
//!
//! - **Explicit store handle**: services take an `Arc<dyn NodeStore>`
//! - **libsql/Turso**: embedded SQLite-compatible database for persistence
//! - **Validated saves**: parent legality is checked against current store state
//! - **Background cascades**: descendant updates run on a queue after the save returns
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, NodeQuery, ValidationError)
//! - [`db`] - Node stores (libsql and in-memory)
//! - [`services`] - Hierarchy queries, tree engine, cascade processor, page service
//! - [`config`] - Runtime configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
