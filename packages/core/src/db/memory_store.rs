//! In-process NodeStore
//!
//! Provides [`MemoryStore`], a `NodeStore` that keeps pages in memory. It
//! follows the same save protocol as `TursoStore` and is used by tests,
//! benchmarks and anything that does not need persistence.
//!
//! Two test hooks are exposed:
//!
//! - [`MemoryStore::with_node`] stores a node verbatim, without any checks,
//!   which allows seeding corrupted trees (dangling parents, cycles)
//! - [`MemoryStore::fail_saves_for`] makes every later save of one id fail

use crate::db::node_store::{NodeStore, SaveResult};
use crate::db::DatabaseError;
use crate::models::{Node, NodeQuery};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory node store.
///
/// # Example
///
/// ```rust
/// use clubsite_core::db::{MemoryStore, NodeStore};
/// use clubsite_core::models::Node;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), clubsite_core::db::DatabaseError> {
/// let home = Node::new_home_page("home".to_string());
/// let store = MemoryStore::new().with_node(home.clone());
///
/// assert!(store.get_node(&home.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Nodes in insertion order
    nodes: RwLock<Vec<Node>>,
    failing_ids: RwLock<HashSet<String>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node as-is, bypassing the save protocol
    ///
    /// An unsaved node gets version 1 so it can be updated afterwards.
    #[must_use]
    pub fn with_node(mut self, mut node: Node) -> Self {
        if node.version == 0 {
            node.version = 1;
        }
        self.nodes.get_mut().push(node);
        self
    }

    /// Make every later `save_node` call for `id` fail
    pub async fn fail_saves_for(&self, id: impl Into<String>) {
        self.failing_ids.write().await.insert(id.into());
    }

    /// Number of stored nodes
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        self.ensure_open()?;
        let nodes = self.nodes.read().await;
        Ok(nodes.iter().find(|n| n.id == id).cloned())
    }

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        self.ensure_open()?;
        let nodes = self.nodes.read().await;
        let matching = nodes.iter().filter(|n| query.matches(n)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn save_node(&self, node: &Node) -> Result<SaveResult, DatabaseError> {
        self.ensure_open()?;

        if self.failing_ids.read().await.contains(&node.id) {
            return Err(DatabaseError::sql_execution(format!(
                "Injected save failure for node {}",
                node.id
            )));
        }

        let mut nodes = self.nodes.write().await;
        let position = nodes.iter().position(|n| n.id == node.id);

        if node.is_new() {
            if position.is_some() {
                return Err(DatabaseError::duplicate_id(&node.id));
            }
            let mut stored = node.clone();
            stored.version = 1;
            stored.modified_at = stored.created_at;
            nodes.push(stored.clone());
            return Ok(SaveResult {
                node: stored,
                modified: true,
            });
        }

        let index = position.ok_or_else(|| DatabaseError::not_found(&node.id))?;
        let current = &mut nodes[index];

        if current.version != node.version {
            return Err(DatabaseError::version_conflict(
                &node.id,
                node.version,
                current.version,
            ));
        }

        if current.same_fields(node) {
            return Ok(SaveResult {
                node: current.clone(),
                modified: false,
            });
        }

        let created_at = current.created_at;
        *current = node.clone();
        current.created_at = created_at;
        current.version = node.version + 1;
        current.modified_at = Utc::now();

        Ok(SaveResult {
            node: current.clone(),
            modified: true,
        })
    }

    async fn remove_nodes(&self, query: &NodeQuery) -> Result<usize, DatabaseError> {
        self.ensure_open()?;
        let mut nodes = self.nodes.write().await;
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut removed = 0;
        nodes.retain(|n| {
            if removed < limit && query.matches(n) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
