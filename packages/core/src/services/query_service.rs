//! Ancestor/Descendant Query Service
//!
//! Read-only walks over the page tree:
//!
//! - `ancestor_chain` - from a node up to the root, node first
//! - `descendant_set` - everything below a node, breadth-first
//! - `is_effectively_published` - a node and all of its ancestors are published
//!
//! Both walks are explicit worklists carrying a visited-id set, so a
//! corrupted store (a parent cycle written behind the engine's back) ends the
//! walk with `CycleDetected` instead of looping. Each step is a separate
//! store read; no transaction spans a walk.

use crate::config::TreeConfig;
use crate::db::NodeStore;
use crate::models::Node;
use crate::services::error::TreeServiceError;
use std::collections::HashSet;
use std::sync::Arc;

/// Hierarchy queries over a `NodeStore`
#[derive(Clone)]
pub struct HierarchyQueryService {
    store: Arc<dyn NodeStore>,
    max_depth: usize,
}

impl HierarchyQueryService {
    pub fn new(store: Arc<dyn NodeStore>, config: &TreeConfig) -> Self {
        Self {
            store,
            max_depth: config.max_depth,
        }
    }

    /// Store the walks read from
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walk parent references from `node` up to the root
    ///
    /// Returns `[node, parent, grandparent, ..., root]`. The root is the first
    /// node without a parent. `node` itself is used as passed (it may carry
    /// unsaved edits); every ancestor is read from the store.
    ///
    /// # Errors
    ///
    /// - `BrokenChain` if a parent reference does not resolve
    /// - `CycleDetected` if an id is reached twice
    /// - `DepthLimitExceeded` if the chain is longer than `max_depth` ancestors
    pub async fn ancestor_chain(&self, node: &Node) -> Result<Vec<Node>, TreeServiceError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node.id.clone());

        let mut chain = vec![node.clone()];

        loop {
            let current = &chain[chain.len() - 1];
            let parent_id = match &current.parent_id {
                Some(parent_id) => parent_id.clone(),
                None => break,
            };

            if chain.len() > self.max_depth {
                return Err(TreeServiceError::depth_limit_exceeded(
                    &node.id,
                    self.max_depth,
                ));
            }

            if !visited.insert(parent_id.clone()) {
                tracing::warn!(
                    "Parent cycle found while walking up from {} (repeated {})",
                    node.id,
                    parent_id
                );
                return Err(TreeServiceError::cycle_detected(parent_id));
            }

            let parent = self
                .store
                .get_node(&parent_id)
                .await?
                .ok_or_else(|| TreeServiceError::broken_chain(&current.id, &parent_id))?;

            chain.push(parent);
        }

        Ok(chain)
    }

    /// Ancestor chain of a stored node, looked up by id
    pub async fn ancestor_chain_by_id(&self, node_id: &str) -> Result<Vec<Node>, TreeServiceError> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(node_id))?;
        self.ancestor_chain(&node).await
    }

    /// Every node below `node_id`, breadth-first
    ///
    /// The node itself is excluded. Within a level, children keep the store's
    /// insertion order. An unknown id has no descendants.
    ///
    /// # Errors
    ///
    /// - `CycleDetected` if a node is reached twice
    /// - `DepthLimitExceeded` if the subtree is deeper than `max_depth` levels
    pub async fn descendant_set(&self, node_id: &str) -> Result<Vec<Node>, TreeServiceError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node_id.to_string());

        let mut descendants = Vec::new();
        let mut frontier = vec![node_id.to_string()];
        let mut depth = 0;

        while !frontier.is_empty() {
            let mut next_level = Vec::new();

            for parent_id in &frontier {
                for child in self.store.get_children(parent_id).await? {
                    if !visited.insert(child.id.clone()) {
                        tracing::warn!(
                            "Parent cycle found while walking down from {} (repeated {})",
                            node_id,
                            child.id
                        );
                        return Err(TreeServiceError::cycle_detected(child.id));
                    }
                    next_level.push(child.id.clone());
                    descendants.push(child);
                }
            }

            if !next_level.is_empty() {
                depth += 1;
                if depth > self.max_depth {
                    return Err(TreeServiceError::depth_limit_exceeded(
                        node_id,
                        self.max_depth,
                    ));
                }
            }
            frontier = next_level;
        }

        tracing::debug!(
            "Descendant walk from {} found {} nodes over {} levels",
            node_id,
            descendants.len(),
            depth
        );

        Ok(descendants)
    }

    /// True if `node` and every ancestor are published
    pub async fn is_effectively_published(&self, node: &Node) -> Result<bool, TreeServiceError> {
        if !node.is_published {
            return Ok(false);
        }
        let chain = self.ancestor_chain(node).await?;
        Ok(chain.iter().all(|n| n.is_published))
    }
}

#[cfg(test)]
#[path = "query_service_test.rs"]
mod query_service_test;
