//! Tree Consistency Engine
//!
//! Keeps the page tree well formed across saves:
//!
//! 1. **Validation** - before a write, the node's parent must be set (except
//!    for the home page), must not be the node itself, must exist, and must
//!    not be one of the node's descendants. Parent legality is checked
//!    against the store as it is right now; nothing is cached between saves.
//! 2. **Route path** - the node's `route_path` is rebuilt from the titles on
//!    its ancestor chain.
//! 3. **Cascade** - once the node's own write has completed, a change of
//!    parent or title rewrites every descendant's route path, and an
//!    unpublish (true to false) unpublishes every descendant. Publishing
//!    does not propagate.
//!
//! Cascades are executed by [`CascadeProcessor`](crate::services::CascadeProcessor);
//! this module only decides what a cascade must do and how to apply it.

use crate::db::{NodeStore, SaveResult};
use crate::models::{route_path_from_titles, Node, NodeKind, ValidationError};
use crate::services::error::TreeServiceError;
use crate::services::query_service::HierarchyQueryService;
use serde::Serialize;
use std::sync::Arc;

/// Work to apply to every descendant of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeJob {
    /// Node whose save triggered the cascade
    pub node_id: String,

    /// Recompute descendants' route paths
    pub rewrite_paths: bool,

    /// Set `is_published = false` on every descendant
    pub unpublish: bool,
}

impl CascadeJob {
    /// Decide the cascade for a save that turned `previous` into `saved`
    ///
    /// A first save has no descendants and never cascades. Returns `None`
    /// when nothing needs to propagate.
    pub fn for_change(previous: Option<&Node>, saved: &Node) -> Option<Self> {
        let previous = previous?;

        let rewrite_paths =
            previous.parent_id != saved.parent_id || previous.title != saved.title;
        let unpublish = previous.is_published && !saved.is_published;

        if !rewrite_paths && !unpublish {
            return None;
        }

        Some(Self {
            node_id: saved.id.clone(),
            rewrite_paths,
            unpublish,
        })
    }
}

/// Outcome of one cascade run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub node_id: String,

    /// Descendants in the snapshot taken at cascade start
    pub visited: usize,

    /// Descendants actually written
    pub updated: usize,

    /// Descendant writes (or the descendant walk itself) that failed
    pub failed: usize,
}

/// Validation, route path derivation and cascade application
pub struct TreeEngine {
    queries: HierarchyQueryService,
}

impl TreeEngine {
    pub fn new(queries: HierarchyQueryService) -> Self {
        Self { queries }
    }

    pub fn queries(&self) -> &HierarchyQueryService {
        &self.queries
    }

    fn store(&self) -> &Arc<dyn NodeStore> {
        self.queries.store()
    }

    /// Check that `node` may be written with its current parent
    ///
    /// # Errors
    ///
    /// `TreeServiceError::ValidationFailed` with, in order of precedence:
    /// `MissingTitle`, `RootWithParent`, `MissingParent`, `SelfParent`,
    /// `UnknownParent`, `CyclicParent`.
    pub async fn validate(&self, node: &Node) -> Result<(), TreeServiceError> {
        node.validate()?;

        if node.kind == NodeKind::HomePage {
            return Ok(());
        }

        let parent_id = match node.parent_id.as_deref() {
            Some(parent_id) => parent_id,
            None => return Err(ValidationError::MissingParent.into()),
        };

        if self.store().get_node(parent_id).await?.is_none() {
            return Err(ValidationError::UnknownParent {
                parent_id: parent_id.to_string(),
            }
            .into());
        }

        let descendants = self.queries.descendant_set(&node.id).await?;
        if descendants.iter().any(|d| d.id == parent_id) {
            tracing::debug!(
                "Rejected parent {} for {}: it is one of its descendants",
                parent_id,
                node.id
            );
            return Err(ValidationError::CyclicParent {
                parent_id: parent_id.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Route path of `node` from the stored titles of its ancestors
    ///
    /// `node`'s own title and parent reference are taken as passed.
    pub async fn compute_route_path(&self, node: &Node) -> Result<String, TreeServiceError> {
        let chain = self.queries.ancestor_chain(node).await?;
        Ok(route_path_from_titles(
            chain.iter().rev().map(|n| n.title.as_str()),
        ))
    }

    /// Validate, derive the route path, write, and decide the cascade
    ///
    /// `previous` is the node as last read from the store (`None` for a
    /// first save). The returned job, if any, must be run after this call
    /// returns.
    pub async fn save(
        &self,
        previous: Option<&Node>,
        node: &Node,
    ) -> Result<(SaveResult, Option<CascadeJob>), TreeServiceError> {
        self.validate(node).await?;

        let mut candidate = node.clone();
        candidate.route_path = self.compute_route_path(node).await?;

        let result = self.store().save_node(&candidate).await?;

        if !result.modified {
            return Ok((result, None));
        }

        tracing::debug!(
            "Saved node {} at {} (version {})",
            result.node.id,
            result.node.route_path,
            result.node.version
        );

        let job = CascadeJob::for_change(previous, &result.node);
        Ok((result, job))
    }

    /// Apply a cascade job to the descendants of its node
    ///
    /// The descendant set is snapshotted once. Each descendant is then
    /// re-read right before its write, and the write is skipped when
    /// nothing changes. A failing descendant is logged and counted; the
    /// rest of the cascade still runs.
    pub async fn run_cascade(&self, job: &CascadeJob) -> CascadeReport {
        let mut report = CascadeReport {
            node_id: job.node_id.clone(),
            ..Default::default()
        };

        let snapshot = match self.queries.descendant_set(&job.node_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Cascade from {} could not list descendants: {}", job.node_id, e);
                report.failed = 1;
                return report;
            }
        };
        report.visited = snapshot.len();

        for descendant in snapshot {
            match self.apply_to_descendant(job, &descendant.id).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "Cascade from {} failed to update descendant {}: {}",
                        job.node_id,
                        descendant.id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Cascade from {} finished: {} descendants, {} updated, {} failed",
            report.node_id,
            report.visited,
            report.updated,
            report.failed
        );

        report
    }

    /// Returns whether the descendant was written
    async fn apply_to_descendant(
        &self,
        job: &CascadeJob,
        descendant_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let fresh = match self.store().get_node(descendant_id).await? {
            Some(node) => node,
            None => {
                tracing::debug!("Descendant {} vanished before its cascade write", descendant_id);
                return Ok(false);
            }
        };

        let mut updated = fresh.clone();
        if job.rewrite_paths {
            updated.route_path = self.compute_route_path(&fresh).await?;
        }
        if job.unpublish {
            updated.is_published = false;
        }

        if updated.same_fields(&fresh) {
            return Ok(false);
        }

        Ok(self.store().save_node(&updated).await?.modified)
    }
}

#[cfg(test)]
#[path = "tree_engine_test.rs"]
mod tree_engine_test;
