//! Page Document Model
//!
//! [`Page`] is an editable page document: a [`Node`] plus the state it was
//! last loaded or saved with, so it knows which fields have changed.
//! [`PageService`] loads and saves pages. Saving delegates to the
//! [`TreeEngine`] for validation and route path derivation, then hands the
//! resulting cascade to the [`CascadeProcessor`] without waiting for it.
//!
//! # Examples
//!
//! ```rust
//! use clubsite_core::config::TreeConfig;
//! use clubsite_core::db::MemoryStore;
//! use clubsite_core::services::PageService;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), clubsite_core::services::TreeServiceError> {
//! let pages = PageService::new(Arc::new(MemoryStore::new()), &TreeConfig::default());
//!
//! let home = pages.ensure_home_page("home").await?;
//! let mut about = pages.new_page("about", &home);
//! pages.save(&mut about).await?;
//! assert_eq!(about.route_path(), "/home/about");
//!
//! about.set_published(true);
//! pages.save(&mut about).await?;
//! assert!(pages.resolve_route("/home/about").await?.is_some());
//!
//! pages.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::{DatabaseError, NodeStore};
use crate::models::{Node, NodeKind, NodeQuery, PageContent};
use crate::services::cascade_processor::{CascadeHandle, CascadeProcessor};
use crate::services::error::TreeServiceError;
use crate::services::query_service::HierarchyQueryService;
use crate::services::tree_engine::TreeEngine;
use serde::Serialize;
use std::sync::Arc;

/// An editable page document
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    node: Node,
    /// Node as last read from or written to the store (`None` until first saved)
    persisted: Option<Node>,
}

impl Page {
    /// Wrap a node that has never been saved
    pub fn new(node: Node) -> Self {
        Self {
            node,
            persisted: None,
        }
    }

    fn from_stored(node: Node) -> Self {
        Self {
            persisted: Some(node.clone()),
            node,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind
    }

    pub fn title(&self) -> &str {
        &self.node.title
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.node.parent_id.as_deref()
    }

    pub fn route_path(&self) -> &str {
        &self.node.route_path
    }

    pub fn is_published(&self) -> bool {
        self.node.is_published
    }

    pub fn content(&self) -> &PageContent {
        &self.node.content
    }

    pub fn version(&self) -> i64 {
        self.node.version
    }

    /// True until the first successful save
    pub fn is_new(&self) -> bool {
        self.persisted.is_none()
    }

    /// True if any field differs from the persisted state
    pub fn is_modified(&self) -> bool {
        match &self.persisted {
            Some(persisted) => !persisted.same_fields(&self.node),
            None => true,
        }
    }

    pub fn parent_changed(&self) -> bool {
        self.persisted
            .as_ref()
            .is_some_and(|p| p.parent_id != self.node.parent_id)
    }

    pub fn title_changed(&self) -> bool {
        self.persisted
            .as_ref()
            .is_some_and(|p| p.title != self.node.title)
    }

    /// True if the page was published when persisted and is not now
    pub fn was_unpublished(&self) -> bool {
        self.persisted
            .as_ref()
            .is_some_and(|p| p.is_published && !self.node.is_published)
    }

    /// Select a new menu parent
    pub fn set_parent(&mut self, parent_id: impl Into<String>) {
        self.node.parent_id = Some(parent_id.into());
    }

    pub fn clear_parent(&mut self) {
        self.node.parent_id = None;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.node.title = title.into();
    }

    pub fn set_published(&mut self, is_published: bool) {
        self.node.is_published = is_published;
    }

    pub fn content_mut(&mut self) -> &mut PageContent {
        &mut self.node.content
    }

    /// Apply this page's edits on top of a newer stored copy
    ///
    /// Only fields that differ from the persisted state are taken from the
    /// page; everything else, including `version`, comes from `stored`.
    fn rebase_onto(&self, stored: &Node) -> Node {
        let mut rebased = stored.clone();
        let Some(base) = &self.persisted else {
            return rebased;
        };

        if base.parent_id != self.node.parent_id {
            rebased.parent_id = self.node.parent_id.clone();
        }
        if base.title != self.node.title {
            rebased.title = self.node.title.clone();
        }
        if base.is_published != self.node.is_published {
            rebased.is_published = self.node.is_published;
        }
        if base.content.brief != self.node.content.brief {
            rebased.content.brief = self.node.content.brief.clone();
        }
        if base.content.body != self.node.content.body {
            rebased.content.body = self.node.content.body.clone();
        }
        if base.content.meta_description != self.node.content.meta_description {
            rebased.content.meta_description = self.node.content.meta_description.clone();
        }
        rebased
    }
}

/// Result of [`PageService::save`]
#[derive(Debug)]
pub struct SaveOutcome {
    /// False when nothing was written
    pub modified: bool,

    /// Completion handle of the cascade this save enqueued, if any
    pub cascade: Option<CascadeHandle>,
}

/// A stored route path that disagrees with the node's ancestor chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleRoutePath {
    pub node_id: String,
    pub stored: String,
    pub expected: String,
}

/// Structural problems found by [`PageService::audit_tree`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeAudit {
    /// Nodes examined
    pub checked: usize,

    /// Number of home pages (a healthy tree has exactly one)
    pub home_pages: usize,

    pub stale_paths: Vec<StaleRoutePath>,

    /// `(node_id, missing_parent_id)` for every dangling parent reference
    pub broken_chains: Vec<(String, String)>,

    /// Nodes whose ancestor chain loops or runs past the depth limit
    pub unreachable: Vec<String>,
}

impl TreeAudit {
    pub fn is_healthy(&self) -> bool {
        self.home_pages == 1
            && self.stale_paths.is_empty()
            && self.broken_chains.is_empty()
            && self.unreachable.is_empty()
    }
}

/// Result of [`PageService::repair_route_paths`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub repaired: usize,
    pub failed: usize,
}

/// Loads, saves and queries page documents
pub struct PageService {
    engine: Arc<TreeEngine>,
    processor: CascadeProcessor,
}

impl PageService {
    /// Build the query service, engine and cascade processor over `store`
    ///
    /// Must be called from within a Tokio runtime (the cascade processor
    /// spawns its task here).
    pub fn new(store: Arc<dyn NodeStore>, config: &TreeConfig) -> Self {
        let queries = HierarchyQueryService::new(store, config);
        let engine = Arc::new(TreeEngine::new(queries));
        let processor = CascadeProcessor::new(engine.clone(), config);
        Self { engine, processor }
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        self.engine.queries().store()
    }

    pub fn queries(&self) -> &HierarchyQueryService {
        self.engine.queries()
    }

    pub fn engine(&self) -> &Arc<TreeEngine> {
        &self.engine
    }

    /// New, unsaved home page
    pub fn new_home_page(&self, title: impl Into<String>) -> Page {
        Page::new(Node::new_home_page(title.into()))
    }

    /// New, unsaved page under `parent`
    pub fn new_page(&self, title: impl Into<String>, parent: &Page) -> Page {
        Page::new(Node::new_page(title.into(), parent.id().to_string()))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Page>, TreeServiceError> {
        Ok(self.store().get_node(id).await?.map(Page::from_stored))
    }

    pub async fn find_one(&self, query: &NodeQuery) -> Result<Option<Page>, TreeServiceError> {
        Ok(self.store().find_one(query).await?.map(Page::from_stored))
    }

    /// First page stored with `route_path`
    ///
    /// Sibling pages with the same title share a route path; the one
    /// inserted first wins.
    pub async fn find_by_route_path(
        &self,
        route_path: &str,
    ) -> Result<Option<Page>, TreeServiceError> {
        self.find_one(&NodeQuery::by_route_path(route_path)).await
    }

    /// Page to render for a route, if visitors may see it
    ///
    /// Returns `None` unless the page and all of its ancestors are published.
    pub async fn resolve_route(&self, route_path: &str) -> Result<Option<Page>, TreeServiceError> {
        let page = match self.find_by_route_path(route_path).await? {
            Some(page) => page,
            None => return Ok(None),
        };

        if self.queries().is_effectively_published(page.node()).await? {
            Ok(Some(page))
        } else {
            tracing::debug!("Route {} hidden: page or an ancestor is unpublished", route_path);
            Ok(None)
        }
    }

    /// Load the home page, creating it on first start
    pub async fn ensure_home_page(&self, title: &str) -> Result<Page, TreeServiceError> {
        if let Some(home) = self.find_one(&NodeQuery::by_kind(NodeKind::HomePage)).await? {
            return Ok(home);
        }

        tracing::info!("Initialising home page '{}'", title);
        let mut home = self.new_home_page(title);
        self.save(&mut home).await?;
        Ok(home)
    }

    /// `[page, parent, ..., home]`
    pub async fn nodes_to_root(&self, page: &Page) -> Result<Vec<Node>, TreeServiceError> {
        self.queries().ancestor_chain(page.node()).await
    }

    /// Every page below `page`, breadth-first
    pub async fn all_descendant_nodes(&self, page: &Page) -> Result<Vec<Node>, TreeServiceError> {
        self.queries().descendant_set(page.id()).await
    }

    /// Save a page
    ///
    /// An unmodified page is a successful no-op: nothing is validated or
    /// written and no cascade is queued. Otherwise the parent is validated,
    /// the route path derived, the node written, and any cascade queued in
    /// the background. On success `page` holds the stored node.
    ///
    /// Cascade failures never surface here; they are logged by the processor.
    ///
    /// If the stored node moved on since `page` was loaded (typically a
    /// cascade rewrote it), the page's own edits are re-applied to the fresh
    /// copy and the save is retried once. Fields edited on both sides keep
    /// the page's value.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the parent or title is illegal (nothing written)
    /// - `DatabaseError` if the store rejects the write, including a second
    ///   version conflict
    pub async fn save(&self, page: &mut Page) -> Result<SaveOutcome, TreeServiceError> {
        if !page.is_modified() {
            tracing::debug!("Save of unmodified page {} skipped", page.id());
            return Ok(SaveOutcome {
                modified: false,
                cascade: None,
            });
        }

        let (result, job) = match self.engine.save(page.persisted.as_ref(), &page.node).await {
            Err(TreeServiceError::DatabaseError(DatabaseError::VersionConflict { .. }))
                if page.persisted.is_some() =>
            {
                let stored = self
                    .store()
                    .get_node(page.id())
                    .await?
                    .ok_or_else(|| TreeServiceError::node_not_found(page.id()))?;
                tracing::debug!(
                    "Page {} changed in the store (now version {}), re-applying edits",
                    page.id(),
                    stored.version
                );

                let rebased = page.rebase_onto(&stored);
                self.engine.save(Some(&stored), &rebased).await?
            }
            other => other?,
        };

        page.node = result.node.clone();
        page.persisted = Some(result.node);

        let cascade = match job {
            Some(job) => match self.processor.enqueue(job).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("Page {} saved but its cascade was not queued: {}", page.id(), e);
                    None
                }
            },
            None => None,
        };

        Ok(SaveOutcome {
            modified: result.modified,
            cascade,
        })
    }

    /// Compare every stored route path against its ancestor chain
    pub async fn audit_tree(&self) -> Result<TreeAudit, TreeServiceError> {
        let nodes = self.store().query_nodes(&NodeQuery::new()).await?;
        let mut audit = TreeAudit {
            checked: nodes.len(),
            ..Default::default()
        };

        for node in &nodes {
            if node.kind == NodeKind::HomePage {
                audit.home_pages += 1;
            }

            match self.engine.compute_route_path(node).await {
                Ok(expected) if expected != node.route_path => {
                    audit.stale_paths.push(StaleRoutePath {
                        node_id: node.id.clone(),
                        stored: node.route_path.clone(),
                        expected,
                    });
                }
                Ok(_) => {}
                Err(TreeServiceError::BrokenChain { parent_id, .. }) => {
                    audit.broken_chains.push((node.id.clone(), parent_id));
                }
                Err(TreeServiceError::CycleDetected { .. })
                | Err(TreeServiceError::DepthLimitExceeded { .. }) => {
                    audit.unreachable.push(node.id.clone());
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Audited {} pages: {} stale paths, {} broken chains, {} unreachable",
            audit.checked,
            audit.stale_paths.len(),
            audit.broken_chains.len(),
            audit.unreachable.len()
        );

        Ok(audit)
    }

    /// Rewrite every stale route path found by [`audit_tree`](Self::audit_tree)
    ///
    /// Each node is re-read and its path recomputed right before the write.
    /// Failures are logged and counted.
    pub async fn repair_route_paths(&self) -> Result<RepairReport, TreeServiceError> {
        let audit = self.audit_tree().await?;
        let mut report = RepairReport::default();

        for stale in &audit.stale_paths {
            match self.repair_one(&stale.node_id).await {
                Ok(true) => report.repaired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Could not repair route path of {}: {}", stale.node_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn repair_one(&self, node_id: &str) -> Result<bool, TreeServiceError> {
        let mut node = match self.store().get_node(node_id).await? {
            Some(node) => node,
            None => return Ok(false),
        };
        node.route_path = self.engine.compute_route_path(&node).await?;
        Ok(self.store().save_node(&node).await?.modified)
    }

    /// Stop the cascade processor (draining queued cascades) and close the store
    pub async fn close(&self) -> Result<(), TreeServiceError> {
        self.processor.shutdown().await?;
        self.store().close().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "page_service_test.rs"]
mod page_service_test;
