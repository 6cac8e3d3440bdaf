//! Page Node Data Structures
//!
//! This module defines the `Node` struct shared by every page of the club
//! site, along with the query filter used by node stores and the validation
//! errors raised before a save.
//!
//! # Architecture
//!
//! - **Single collection**: home page and content pages live in one store,
//!   told apart by `kind`
//! - **Parent-linked tree**: every `Page` names exactly one menu parent
//! - **Materialized path**: `route_path` caches the titles from the root down
//!   to the node and is derived on save, never set by callers
//! - **Optimistic concurrency**: `version` is bumped by the store on every
//!   effective write
//!
//! # Examples
//!
//! ```rust
//! use clubsite_core::models::Node;
//!
//! let home = Node::new_home_page("home".to_string());
//! let about = Node::new_page("about".to_string(), home.id.clone());
//!
//! assert!(home.is_root());
//! assert_eq!(about.parent_id.as_deref(), Some(home.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separator placed before every segment of a route path.
pub const ROUTE_SEPARATOR: char = '/';

/// Validation errors raised before a node is written
///
/// The display messages are shown as-is to site editors, so each one names
/// the corrective action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You must select a menu parent")]
    MissingParent,

    #[error("You cannot select an item as its own menu parent")]
    SelfParent,

    #[error("The selected menu parent does not exist")]
    UnknownParent { parent_id: String },

    #[error("You cannot select a child/descendent item as menu parent")]
    CyclicParent { parent_id: String },

    #[error("The home page cannot have a menu parent")]
    RootWithParent,

    #[error("A page title is required")]
    MissingTitle,

    #[error("A page title cannot contain '/'")]
    TitleContainsSeparator,
}

/// Kind of page stored in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// The designated root of the tree (never has a parent)
    HomePage,
    /// Any other page (always has a parent)
    Page,
}

impl NodeKind {
    /// Storage representation used by SQL-backed stores
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::HomePage => "home_page",
            NodeKind::Page => "page",
        }
    }

    /// Parse the storage representation written by [`NodeKind::as_str`]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "home_page" => Some(NodeKind::HomePage),
            "page" => Some(NodeKind::Page),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editable content of a page document
///
/// Opaque to the tree: nothing in the hierarchy logic reads these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    /// Short summary shown in menus and listings
    #[serde(default)]
    pub brief: String,

    /// Main body (markdown or html)
    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
}

/// A page of the club site.
///
/// # Fields
///
/// - `id`: Unique identifier, generated once at construction
/// - `kind`: `HomePage` for the root, `Page` for everything else
/// - `parent_id`: Menu parent (`None` only for the home page)
/// - `title`: Human readable label, also the node's route path segment
/// - `route_path`: Derived path, e.g. `/home/level1/level2b`
/// - `is_published`: Visibility flag (effective only if every ancestor is published too)
/// - `content`: Page document content
/// - `version`: Store-managed write counter, `0` until first saved
/// - `created_at` / `modified_at`: Bookkeeping timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    pub kind: NodeKind,

    pub parent_id: Option<String>,

    pub title: String,

    /// Materialized route path (written by the tree engine)
    #[serde(default)]
    pub route_path: String,

    #[serde(default)]
    pub is_published: bool,

    #[serde(default)]
    pub content: PageContent,

    /// Optimistic concurrency counter (0 = never saved)
    #[serde(default)]
    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl Node {
    fn with_kind(kind: NodeKind, title: String, parent_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            parent_id,
            title,
            route_path: String::new(),
            is_published: kind == NodeKind::HomePage,
            content: PageContent::default(),
            version: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Create the home page (root of the tree)
    ///
    /// The home page starts published: it anchors every route path and an
    /// unpublished root would hide the whole site.
    pub fn new_home_page(title: String) -> Self {
        Self::with_kind(NodeKind::HomePage, title, None)
    }

    /// Create a content page under `parent_id`
    ///
    /// Pages start unpublished.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use clubsite_core::models::{Node, NodeKind};
    /// let page = Node::new_page("fixtures".to_string(), "home-id".to_string());
    /// assert_eq!(page.kind, NodeKind::Page);
    /// assert!(!page.is_published);
    /// assert_eq!(page.version, 0);
    /// ```
    pub fn new_page(title: String, parent_id: String) -> Self {
        Self::with_kind(NodeKind::Page, title, Some(parent_id))
    }

    /// Create a node with a caller-chosen id (fixtures and imports)
    pub fn new_with_id(id: String, kind: NodeKind, title: String, parent_id: Option<String>) -> Self {
        let mut node = Self::with_kind(kind, title, parent_id);
        node.id = id;
        node
    }

    /// Builder-style publish flag
    pub fn published(mut self, is_published: bool) -> Self {
        self.is_published = is_published;
        self
    }

    /// True for the home page
    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::HomePage
    }

    /// True until the node has been written once
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// Validate the node's own fields
    ///
    /// Only checks what can be decided without the store. Parent existence
    /// and cycles are checked by the tree engine against current store state.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        // Route paths are joined titles, so a separator would alias another page
        if self.title.contains(ROUTE_SEPARATOR) {
            return Err(ValidationError::TitleContainsSeparator);
        }

        match (self.kind, self.parent_id.as_deref()) {
            (NodeKind::HomePage, Some(_)) => Err(ValidationError::RootWithParent),
            (NodeKind::HomePage, None) => Ok(()),
            (NodeKind::Page, None) => Err(ValidationError::MissingParent),
            (NodeKind::Page, Some(parent_id)) if parent_id.is_empty() => {
                Err(ValidationError::MissingParent)
            }
            (NodeKind::Page, Some(parent_id)) if parent_id == self.id => {
                Err(ValidationError::SelfParent)
            }
            (NodeKind::Page, Some(_)) => Ok(()),
        }
    }

    /// Compare every field a save can change
    ///
    /// Bookkeeping fields (`version`, timestamps) are ignored, so two copies
    /// of the same document compare equal even if one is stale.
    pub fn same_fields(&self, other: &Node) -> bool {
        self.kind == other.kind
            && self.parent_id == other.parent_id
            && self.title == other.title
            && self.route_path == other.route_path
            && self.is_published == other.is_published
            && self.content == other.content
    }
}

/// Build a route path from titles ordered root first
///
/// # Examples
///
/// ```rust
/// # use clubsite_core::models::route_path_from_titles;
/// assert_eq!(route_path_from_titles(["home", "level1", "level2b"]), "/home/level1/level2b");
/// ```
pub fn route_path_from_titles<I, S>(titles: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::new();
    for title in titles {
        path.push(ROUTE_SEPARATOR);
        path.push_str(title.as_ref());
    }
    path
}

/// Conjunctive filter over the node collection
///
/// Every populated field must match. An empty query matches all nodes.
/// Results are returned in insertion order.
///
/// # Examples
///
/// ```rust
/// # use clubsite_core::models::NodeQuery;
/// let published_children = NodeQuery::children_of("home-id").with_published(true);
/// assert_eq!(published_children.parent_id.as_deref(), Some("home-id"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,

    /// Match direct children of this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn children_of(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Default::default()
        }
    }

    pub fn by_route_path(route_path: impl Into<String>) -> Self {
        Self {
            route_path: Some(route_path.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_published(mut self, is_published: bool) -> Self {
        self.is_published = Some(is_published);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a node against every populated filter (ignores `limit`)
    pub fn matches(&self, node: &Node) -> bool {
        self.id.as_ref().map_or(true, |id| &node.id == id)
            && self.kind.map_or(true, |kind| node.kind == kind)
            && self
                .parent_id
                .as_ref()
                .map_or(true, |parent_id| node.parent_id.as_ref() == Some(parent_id))
            && self.title.as_ref().map_or(true, |title| &node.title == title)
            && self
                .route_path
                .as_ref()
                .map_or(true, |route_path| &node.route_path == route_path)
            && self
                .is_published
                .map_or(true, |is_published| node.is_published == is_published)
    }
}
