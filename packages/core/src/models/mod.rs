//! Data Models
//!
//! - `Node` - A page of the site (home page or content page)
//! - `NodeQuery` - Conjunctive filter used by node stores
//! - `ValidationError` - Pre-save validation failures

mod node;

pub use node::{
    route_path_from_titles, Node, NodeKind, NodeQuery, PageContent, ValidationError,
    ROUTE_SEPARATOR,
};
