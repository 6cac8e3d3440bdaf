//! Runtime configuration for the page tree

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the libsql database file
pub const ENV_DB_PATH: &str = "CLUBSITE_DB_PATH";
/// Environment variable overriding [`TreeConfig::max_depth`]
pub const ENV_MAX_TREE_DEPTH: &str = "CLUBSITE_MAX_TREE_DEPTH";
/// Environment variable overriding [`TreeConfig::cascade_queue_capacity`]
pub const ENV_CASCADE_QUEUE: &str = "CLUBSITE_CASCADE_QUEUE";

/// Tunables shared by the query service, tree engine and cascade processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeConfig {
    /// Database file opened by the operator tools
    pub db_path: PathBuf,

    /// Deepest tree walk allowed before a walk is reported as runaway
    pub max_depth: usize,

    /// Cascade jobs that may wait in the queue before `save` applies backpressure
    pub cascade_queue_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/clubsite.db"),
            max_depth: 1000,
            cascade_queue_capacity: 256,
        }
    }
}

impl TreeConfig {
    /// Defaults overridden by `CLUBSITE_*` environment variables
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            if !path.trim().is_empty() {
                config.db_path = PathBuf::from(path);
            }
        }
        if let Some(depth) = parse_env(ENV_MAX_TREE_DEPTH) {
            config.max_depth = depth;
        }
        if let Some(capacity) = parse_env(ENV_CASCADE_QUEUE) {
            config.cascade_queue_capacity = capacity;
        }

        config
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }
}

fn parse_env(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.max_depth, 1000);
        assert_eq!(config.cascade_queue_capacity, 256);
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: TreeConfig = serde_json::from_str(r#"{"maxDepth": 12}"#).unwrap();
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.cascade_queue_capacity, 256);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var(ENV_MAX_TREE_DEPTH, "42");
        std::env::set_var(ENV_CASCADE_QUEUE, "not-a-number");
        let config = TreeConfig::from_env();
        std::env::remove_var(ENV_MAX_TREE_DEPTH);
        std::env::remove_var(ENV_CASCADE_QUEUE);

        assert_eq!(config.max_depth, 42);
        assert_eq!(config.cascade_queue_capacity, 256);
    }
}
