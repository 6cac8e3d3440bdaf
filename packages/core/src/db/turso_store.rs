//! TursoStore - NodeStore Implementation for the libsql Backend
//!
//! TursoStore wraps `DatabaseService` and delegates every operation to its
//! `db_*` methods. It owns the row conversion and the save protocol
//! (insert, no-op detection, optimistic update); the SQL lives in
//! `DatabaseService`.
//!
//! `close()` drops the store's handle on the `DatabaseService`. The libsql
//! file is released once every other `Arc<DatabaseService>` is dropped too.
//!
//! # Examples
//!
//! ```rust,no_run
//! use clubsite_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/site.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!
//!     let node = store.get_node("node-123").await?;
//!     Ok(())
//! }
//! ```

use crate::db::database::DbNodeParams;
use crate::db::node_store::{NodeStore, SaveResult};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{Node, NodeKind, NodeQuery, PageContent};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;
use std::sync::Arc;
use tokio::sync::RwLock;

/// NodeStore backed by a libsql database file
pub struct TursoStore {
    /// `None` once closed
    db: RwLock<Option<Arc<DatabaseService>>>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db: RwLock::new(Some(db)),
        }
    }

    /// Underlying database service, `None` after `close()`
    pub async fn database(&self) -> Option<Arc<DatabaseService>> {
        self.db.read().await.clone()
    }

    /// Handle for one operation; in-flight operations keep theirs past `close()`
    async fn open_db(&self) -> Result<Arc<DatabaseService>, DatabaseError> {
        self.database().await.ok_or(DatabaseError::Closed)
    }

    /// Parse timestamp from database - handles both RFC3339 and SQLite formats
    ///
    /// Rows written by this store use RFC3339. Rows inserted by hand through
    /// the sqlite shell usually carry `CURRENT_TIMESTAMP`: "YYYY-MM-DD HH:MM:SS".
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(DatabaseError::serialization(format!(
            "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
            s
        )))
    }

    /// Convert libsql::Row to Node model
    ///
    /// # Row Format
    ///
    /// Expected columns (in order, see `NODE_COLUMNS`):
    /// - id (TEXT)
    /// - kind (TEXT)
    /// - parent_id (TEXT, nullable)
    /// - title (TEXT)
    /// - route_path (TEXT)
    /// - is_published (INTEGER 0/1)
    /// - content (TEXT, JSON)
    /// - version (INTEGER)
    /// - created_at (TEXT)
    /// - modified_at (TEXT)
    fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let id: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let parent_id: Option<String> = row.get(2)?;
        let title: String = row.get(3)?;
        let route_path: String = row.get(4)?;
        let is_published: i64 = row.get(5)?;
        let content_json: String = row.get(6)?;
        let version: i64 = row.get(7)?;
        let created_at_str: String = row.get(8)?;
        let modified_at_str: String = row.get(9)?;

        let kind = NodeKind::parse(&kind_str).ok_or_else(|| {
            DatabaseError::serialization(format!("Unknown node kind '{}' for {}", kind_str, id))
        })?;
        let content: PageContent = serde_json::from_str(&content_json)?;

        Ok(Node {
            id,
            kind,
            parent_id,
            title,
            route_path,
            is_published: is_published != 0,
            content,
            version,
            created_at: Self::parse_timestamp(&created_at_str)?,
            modified_at: Self::parse_timestamp(&modified_at_str)?,
        })
    }

    async fn collect_rows(mut rows: libsql::Rows) -> Result<Vec<Node>, DatabaseError> {
        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        let db = self.open_db().await?;
        match db.db_get_node(id).await? {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        let db = self.open_db().await?;
        let rows = db.db_query_nodes(query).await?;
        Self::collect_rows(rows).await
    }

    async fn save_node(&self, node: &Node) -> Result<SaveResult, DatabaseError> {
        let db = self.open_db().await?;

        let content_json = serde_json::to_string(&node.content)?;

        if node.is_new() {
            let created_at = node.created_at.to_rfc3339();
            let params = DbNodeParams {
                id: &node.id,
                kind: node.kind.as_str(),
                parent_id: node.parent_id.as_deref(),
                title: &node.title,
                route_path: &node.route_path,
                is_published: node.is_published,
                content: &content_json,
                created_at: &created_at,
                modified_at: &created_at,
            };
            if !db.db_insert_node(params).await? {
                return Err(DatabaseError::duplicate_id(&node.id));
            }
        } else {
            let stored = self
                .get_node(&node.id)
                .await?
                .ok_or_else(|| DatabaseError::not_found(&node.id))?;

            if stored.version != node.version {
                return Err(DatabaseError::version_conflict(
                    &node.id,
                    node.version,
                    stored.version,
                ));
            }

            if stored.same_fields(node) {
                tracing::debug!("Skipping write of unchanged node {}", node.id);
                return Ok(SaveResult {
                    node: stored,
                    modified: false,
                });
            }

            let created_at = stored.created_at.to_rfc3339();
            let modified_at = Utc::now().to_rfc3339();
            let params = DbNodeParams {
                id: &node.id,
                kind: node.kind.as_str(),
                parent_id: node.parent_id.as_deref(),
                title: &node.title,
                route_path: &node.route_path,
                is_published: node.is_published,
                content: &content_json,
                created_at: &created_at,
                modified_at: &modified_at,
            };

            if db.db_update_node(params, node.version).await? == 0 {
                // Lost a race between the read above and the conditional update
                return match db.db_get_version(&node.id).await? {
                    Some(actual) => Err(DatabaseError::version_conflict(
                        &node.id,
                        node.version,
                        actual,
                    )),
                    None => Err(DatabaseError::not_found(&node.id)),
                };
            }
        }

        let saved = self
            .get_node(&node.id)
            .await?
            .ok_or_else(|| DatabaseError::not_found(&node.id))?;

        Ok(SaveResult {
            node: saved,
            modified: true,
        })
    }

    async fn remove_nodes(&self, query: &NodeQuery) -> Result<usize, DatabaseError> {
        let db = self.open_db().await?;
        let removed = db.db_delete_nodes(query).await?;
        Ok(removed as usize)
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        if let Some(db) = self.db.write().await.take() {
            tracing::info!("Closed page store at {}", db.db_path.display());
        }
        Ok(())
    }
}
