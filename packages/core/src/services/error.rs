//! Service Layer Error Types
//!
//! This module defines the error type returned by the hierarchy query
//! service, the tree engine and the page service.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Tree service errors
///
/// Validation failures are raised before anything is written. Store errors
/// are passed through unchanged.
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Pre-save validation failed
    #[error("{0}")]
    ValidationFailed(#[from] ValidationError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// A stored parent reference points to a node that does not exist
    #[error("Broken parent chain: node {node_id} references missing parent {parent_id}")]
    BrokenChain { node_id: String, parent_id: String },

    /// A tree walk reached the same node twice
    #[error("Cycle detected in page tree at node {node_id}")]
    CycleDetected { node_id: String },

    /// A tree walk went deeper than the configured limit
    #[error("Tree walk from {node_id} exceeded the depth limit of {max_depth}")]
    DepthLimitExceeded { node_id: String, max_depth: usize },

    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// The cascade processor has shut down
    #[error("Cascade processor is not running")]
    CascadeUnavailable,
}

impl TreeServiceError {
    pub fn broken_chain(node_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::BrokenChain {
            node_id: node_id.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn cycle_detected(node_id: impl Into<String>) -> Self {
        Self::CycleDetected {
            node_id: node_id.into(),
        }
    }

    pub fn depth_limit_exceeded(node_id: impl Into<String>, max_depth: usize) -> Self {
        Self::DepthLimitExceeded {
            node_id: node_id.into(),
            max_depth,
        }
    }

    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// The validation error, if this is one
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::ValidationFailed(e) => Some(e),
            _ => None,
        }
    }
}
