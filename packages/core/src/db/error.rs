//! Database Error Types
//!
//! This module defines error types for node store operations, covering
//! connection and schema setup for the libsql store as well as the write
//! conflicts every store reports.

use std::path::PathBuf;
use thiserror::Error;

/// Node store operation errors
///
/// Returned unchanged by every `NodeStore` implementation. Service-layer code
/// wraps these in `TreeServiceError::DatabaseError`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Insert of a node whose id is already stored
    #[error("Node already exists: {id}")]
    DuplicateId { id: String },

    /// Update of a node that is not stored
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Optimistic concurrency check failed
    #[error("Version conflict for node {node_id}: expected version {expected_version}, found {actual_version}")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    /// A stored column could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store has been closed
    #[error("Node store is closed")]
    Closed,
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a version conflict error
    pub fn version_conflict(
        node_id: impl Into<String>,
        expected_version: i64,
        actual_version: i64,
    ) -> Self {
        Self::VersionConflict {
            node_id: node_id.into(),
            expected_version,
            actual_version,
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
