//! NodeStore Trait - Page Store Abstraction
//!
//! This module defines the `NodeStore` trait that every page store implements.
//! The tree engine and query service only ever talk to a `dyn NodeStore`, so
//! the libsql-backed store and the in-process store are interchangeable.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: Every read and write is a suspension point
//! 2. **Borrowed Inputs**: Methods borrow ids, queries and nodes; results are owned
//! 3. **Typed Errors**: Failures are `DatabaseError`, propagated unchanged to services
//! 4. **Optimistic Writes**: `save_node` checks `version` instead of taking locks
//! 5. **No Transactions**: Multi-node operations are sequences of single-node calls
//!
//! # Examples
//!
//! ```rust,no_run
//! use clubsite_core::db::{DatabaseService, NodeStore, TursoStore};
//! use clubsite_core::models::{Node, NodeQuery};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/site.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!
//!     let home = store.save_node(&Node::new_home_page("home".to_string())).await?.node;
//!     let children = store.query_nodes(&NodeQuery::children_of(&home.id)).await?;
//!     assert!(children.is_empty());
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

use crate::db::DatabaseError;
use crate::models::{Node, NodeQuery};
use async_trait::async_trait;

/// Result of [`NodeStore::save_node`]
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    /// The node as stored after the call (bumped version on an effective write)
    pub node: Node,

    /// False when the stored node already had identical fields and nothing was written
    pub modified: bool,
}

/// Abstraction layer for page persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single store handle can be
/// shared between request handlers and the background cascade task.
///
/// # Ordering
///
/// Every query method returns nodes in insertion order.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get node by ID
    ///
    /// Returns `Ok(None)` if the node does not exist.
    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError>;

    /// Return every node matching the query, in insertion order
    ///
    /// An empty query scans the whole collection.
    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError>;

    /// Return the first node matching the query
    async fn find_one(&self, query: &NodeQuery) -> Result<Option<Node>, DatabaseError> {
        let query = query.clone().with_limit(1);
        Ok(self.query_nodes(&query).await?.into_iter().next())
    }

    /// Direct children of `parent_id`, in insertion order
    async fn get_children(&self, parent_id: &str) -> Result<Vec<Node>, DatabaseError> {
        self.query_nodes(&NodeQuery::children_of(parent_id)).await
    }

    /// Insert or update a node
    ///
    /// - `version == 0`: insert. Fails with `DuplicateId` if the id is taken.
    /// - otherwise: update, checked against the stored version. Fails with
    ///   `NotFound` if the node is gone and `VersionConflict` if it was written
    ///   since `node` was read.
    ///
    /// An update whose fields match the stored node writes nothing and
    /// returns `modified == false`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use clubsite_core::db::NodeStore;
    /// # use clubsite_core::models::Node;
    /// # async fn example(store: &dyn NodeStore) -> Result<(), clubsite_core::db::DatabaseError> {
    /// let saved = store.save_node(&Node::new_home_page("home".to_string())).await?;
    /// assert!(saved.modified);
    /// assert_eq!(saved.node.version, 1);
    ///
    /// let again = store.save_node(&saved.node).await?;
    /// assert!(!again.modified);
    /// # Ok(())
    /// # }
    /// ```
    async fn save_node(&self, node: &Node) -> Result<SaveResult, DatabaseError>;

    /// Delete every node matching the query, returning how many were removed
    ///
    /// Does not touch children of removed nodes. Intended for fixtures and
    /// operator tooling, not for editing the tree.
    async fn remove_nodes(&self, query: &NodeQuery) -> Result<usize, DatabaseError>;

    /// Release the store
    ///
    /// Later calls fail with `DatabaseError::Closed`.
    async fn close(&self) -> Result<(), DatabaseError>;
}
