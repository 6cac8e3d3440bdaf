//! Business Services
//!
//! This module contains the page tree services:
//!
//! - `HierarchyQueryService` - ancestor chains and descendant sets
//! - `TreeEngine` - parent validation, route paths and cascade application
//! - `CascadeProcessor` - background queue that runs cascades after saves
//! - `PageService` - loads and saves `Page` documents
//!
//! Services receive the store handle explicitly; none of them holds
//! global state.

pub mod cascade_processor;
pub mod error;
pub mod page_service;
pub mod query_service;
pub mod tree_engine;

pub use cascade_processor::{CascadeHandle, CascadeProcessor, CascadeQueue};
pub use error::TreeServiceError;
pub use page_service::{Page, PageService, RepairReport, SaveOutcome, StaleRoutePath, TreeAudit};
pub use query_service::HierarchyQueryService;
pub use tree_engine::{CascadeJob, CascadeReport, TreeEngine};
