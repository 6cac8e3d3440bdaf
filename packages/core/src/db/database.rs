//! Database Connection Management
//!
//! This module provides the libsql connection, schema initialisation and the
//! raw SQL operations behind [`TursoStore`](crate::db::TursoStore).
//!
//! # Architecture
//!
//! - **Single table**: every page is a row of `nodes`; page content is a JSON column
//! - **WAL mode**: Write-Ahead Logging so the cascade task and request handlers
//!   can read while the other writes
//! - **Insertion order**: queries order by `rowid`
//! - **Optimistic writes**: updates are conditional on the stored `version`
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. The 5-second busy timeout
//! lets concurrent writers wait for the lock instead of failing immediately
//! with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use clubsite_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let db_service = DatabaseService::new(PathBuf::from("./data/site.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use crate::models::NodeQuery;
use libsql::params::Params;
use libsql::{Builder, Database, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Column list shared by every SELECT, in the order `row_to_node` reads them
pub(crate) const NODE_COLUMNS: &str =
    "id, kind, parent_id, title, route_path, is_published, content, version, created_at, modified_at";

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use clubsite_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/var/lib/clubsite/site.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Column values for a node insert or update (avoids too-many-arguments lint)
pub struct DbNodeParams<'a> {
    pub id: &'a str,
    pub kind: &'a str,
    pub parent_id: Option<&'a str>,
    pub title: &'a str,
    pub route_path: &'a str,
    pub is_published: bool,
    pub content: &'a str,
    pub created_at: &'a str,
    pub modified_at: &'a str,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        tracing::info!(
            "Opened page database at {} (new: {})",
            service.db_path.display(),
            is_new_database
        );

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to run against an existing database.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                parent_id TEXT,
                title TEXT NOT NULL,
                route_path TEXT NOT NULL DEFAULT '',
                is_published INTEGER NOT NULL DEFAULT 0,
                content JSON NOT NULL DEFAULT '{}',
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| DatabaseError::initialization_failed(format!("nodes table: {}", e)))?;

        // Hierarchy walks query by parent, page views by route path
        for (name, column) in [
            ("idx_nodes_parent", "parent_id"),
            ("idx_nodes_route_path", "route_path"),
            ("idx_nodes_kind", "kind"),
        ] {
            conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS {} ON nodes({})", name, column),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!("index '{}': {}", name, e))
            })?;
        }

        // Flush the schema so a second handle on a fresh file sees the table
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a raw connection
    ///
    /// Prefer [`connect_with_timeout`](Self::connect_with_timeout) in async code.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }

    //
    // NODE OPERATIONS
    // Raw SQL wrapped by TursoStore. No validation happens here.
    //

    /// Insert a node with version 1
    ///
    /// Returns `false` without writing when the id is already stored.
    pub async fn db_insert_node(&self, params: DbNodeParams<'_>) -> Result<bool, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let rows_affected = conn
            .execute(
                "INSERT INTO nodes (id, kind, parent_id, title, route_path, is_published, content, version, created_at, modified_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
                Params::Positional(vec![
                    Value::Text(params.id.to_string()),
                    Value::Text(params.kind.to_string()),
                    opt_text(params.parent_id),
                    Value::Text(params.title.to_string()),
                    Value::Text(params.route_path.to_string()),
                    Value::Integer(params.is_published as i64),
                    Value::Text(params.content.to_string()),
                    Value::Text(params.created_at.to_string()),
                    Value::Text(params.modified_at.to_string()),
                ]),
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        Ok(rows_affected == 1)
    }

    /// Get a node row by id
    pub async fn db_get_node(&self, id: &str) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Get only the stored version of a node
    pub async fn db_get_version(&self, id: &str) -> Result<Option<i64>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut rows = conn
            .query("SELECT version FROM nodes WHERE id = ?", [id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read version: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(row.get::<i64>(0)?)),
            None => Ok(None),
        }
    }

    /// Update every mutable column of a node if its stored version still matches
    ///
    /// Bumps `version` by one. Returns the number of rows written: `0` means
    /// the node is gone or was written by someone else in the meantime.
    pub async fn db_update_node(
        &self,
        params: DbNodeParams<'_>,
        expected_version: i64,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(
            "UPDATE nodes
             SET kind = ?, parent_id = ?, title = ?, route_path = ?, is_published = ?,
                 content = ?, modified_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
            Params::Positional(vec![
                Value::Text(params.kind.to_string()),
                opt_text(params.parent_id),
                Value::Text(params.title.to_string()),
                Value::Text(params.route_path.to_string()),
                Value::Integer(params.is_published as i64),
                Value::Text(params.content.to_string()),
                Value::Text(params.modified_at.to_string()),
                Value::Text(params.id.to_string()),
                Value::Integer(expected_version),
            ]),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to update node: {}", e)))
    }

    /// Query node rows matching a `NodeQuery`, ordered by insertion
    pub async fn db_query_nodes(&self, query: &NodeQuery) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let (where_clause, values) = Self::where_clause(query);
        let limit_clause = query
            .limit
            .map(|limit| format!(" LIMIT {}", limit))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM nodes{} ORDER BY rowid{}",
            NODE_COLUMNS, where_clause, limit_clause
        );

        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare query: {}", e))
        })?;

        stmt.query(Params::Positional(values)).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute query: {}", e))
        })
    }

    /// Delete node rows matching a `NodeQuery`
    pub async fn db_delete_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let (where_clause, values) = Self::where_clause(query);
        let sql = match query.limit {
            Some(limit) => format!(
                "DELETE FROM nodes WHERE rowid IN (SELECT rowid FROM nodes{} ORDER BY rowid LIMIT {})",
                where_clause, limit
            ),
            None => format!("DELETE FROM nodes{}", where_clause),
        };

        conn.execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete nodes: {}", e)))
    }

    /// Build a ` WHERE ...` clause (or an empty string) with positional values
    fn where_clause(query: &NodeQuery) -> (String, Vec<Value>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values = Vec::new();

        if let Some(id) = &query.id {
            conditions.push("id = ?");
            values.push(Value::Text(id.clone()));
        }
        if let Some(kind) = query.kind {
            conditions.push("kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(parent_id) = &query.parent_id {
            conditions.push("parent_id = ?");
            values.push(Value::Text(parent_id.clone()));
        }
        if let Some(title) = &query.title {
            conditions.push("title = ?");
            values.push(Value::Text(title.clone()));
        }
        if let Some(route_path) = &query.route_path {
            conditions.push("route_path = ?");
            values.push(Value::Text(route_path.clone()));
        }
        if let Some(is_published) = query.is_published {
            conditions.push("is_published = ?");
            values.push(Value::Integer(is_published as i64));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(v) => Value::Text(v.to_string()),
        None => Value::Null,
    }
}
