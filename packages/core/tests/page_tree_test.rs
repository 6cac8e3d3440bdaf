//! Integration tests for the page tree
//!
//! Builds the tree
//!
//! ```text
//! home
//!   '-> level1
//!       '-> level2a
//!           '-> level3
//!       '-> level2b
//! ```
//!
//! on a libsql database and checks:
//! - Ancestor chains and descendant sets
//! - Reparenting and the route paths it produces
//! - Parent validation errors and their messages
//! - Unpublish and rename cascades
//! - No-op saves and saves of pages loaded before a cascade

use anyhow::Result;
use clubsite_core::{
    config::TreeConfig,
    db::{DatabaseService, MemoryStore, NodeStore, TursoStore},
    models::{Node, ValidationError},
    services::{Page, PageService, TreeServiceError},
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Tree {
    home: Page,
    level1: Page,
    level2a: Page,
    level3: Page,
    level2b: Page,
}

/// Test helper: PageService over a fresh libsql database
async fn create_test_env() -> Result<(PageService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db = Arc::new(DatabaseService::new(temp_dir.path().join("site.db")).await?);
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
    Ok((PageService::new(store, &TreeConfig::default()), temp_dir))
}

async fn published_page(pages: &PageService, title: &str, parent: &Page) -> Result<Page> {
    let mut page = pages.new_page(title, parent);
    page.set_published(true);
    pages.save(&mut page).await?;
    Ok(page)
}

async fn insert_test_pages(pages: &PageService) -> Result<Tree> {
    let home = pages.ensure_home_page("home").await?;
    let level1 = published_page(pages, "level1", &home).await?;
    let level2a = published_page(pages, "level2a", &level1).await?;
    let level3 = published_page(pages, "level3", &level2a).await?;
    let level2b = published_page(pages, "level2b", &level1).await?;

    Ok(Tree {
        home,
        level1,
        level2a,
        level3,
        level2b,
    })
}

/// Poll `check` until it holds or five seconds pass
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

fn ids(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.id.as_str()).collect()
}

// =========================================================================
// Query Tests
// =========================================================================

#[tokio::test]
async fn test_nodes_to_root_order() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let tree = insert_test_pages(&pages).await?;

    let chain = pages.nodes_to_root(&tree.level3).await?;
    assert_eq!(
        ids(&chain),
        vec![
            tree.level3.id(),
            tree.level2a.id(),
            tree.level1.id(),
            tree.home.id()
        ]
    );
    assert!(chain.last().unwrap().parent_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_ancestor_chains_never_revisit() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let tree = insert_test_pages(&pages).await?;

    for (page, depth) in [
        (&tree.level1, 1),
        (&tree.level2a, 2),
        (&tree.level3, 3),
        (&tree.level2b, 2),
    ] {
        let chain = pages.nodes_to_root(page).await?;
        assert_eq!(chain.len(), depth + 1);
        let unique: HashSet<&str> = chain.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(unique.len(), chain.len());
    }
    Ok(())
}

#[tokio::test]
async fn test_all_descendant_nodes_of_home() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let tree = insert_test_pages(&pages).await?;

    let descendants = pages.all_descendant_nodes(&tree.home).await?;
    assert_eq!(descendants.len(), 4);

    let found: HashSet<&str> = descendants.iter().map(|n| n.id.as_str()).collect();
    let expected: HashSet<&str> = [
        tree.level1.id(),
        tree.level2a.id(),
        tree.level2b.id(),
        tree.level3.id(),
    ]
    .into_iter()
    .collect();
    assert_eq!(found, expected);
    Ok(())
}

#[tokio::test]
async fn test_route_paths_after_insert() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let tree = insert_test_pages(&pages).await?;

    assert_eq!(tree.home.route_path(), "/home");
    assert_eq!(tree.level1.route_path(), "/home/level1");
    assert_eq!(tree.level3.route_path(), "/home/level1/level2a/level3");
    assert_eq!(tree.level2b.route_path(), "/home/level1/level2b");
    Ok(())
}

// =========================================================================
// Parent Assignment Tests
// =========================================================================

#[tokio::test]
async fn test_reparent_to_sibling_branch() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level3.set_parent(tree.level2b.id());
    pages.save(&mut tree.level3).await?;

    assert_eq!(tree.level3.route_path(), "/home/level1/level2b/level3");
    let stored = pages.find_by_id(tree.level3.id()).await?.unwrap();
    assert_eq!(stored.route_path(), "/home/level1/level2b/level3");
    Ok(())
}

#[tokio::test]
async fn test_reparent_to_home() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level3.set_parent(tree.home.id());
    let outcome = pages.save(&mut tree.level3).await?;

    assert!(outcome.modified);
    assert_eq!(tree.level3.route_path(), "/home/level3");
    Ok(())
}

#[tokio::test]
async fn test_own_id_as_parent_rejected() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    let own_id = tree.level2b.id().to_string();
    tree.level2b.set_parent(own_id);
    let err = pages.save(&mut tree.level2b).await.unwrap_err();

    assert!(matches!(
        err,
        TreeServiceError::ValidationFailed(ValidationError::SelfParent)
    ));
    assert!(err
        .to_string()
        .contains("cannot select an item as its own menu parent"));
    Ok(())
}

#[tokio::test]
async fn test_cleared_parent_rejected() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level2a.clear_parent();
    let err = pages.save(&mut tree.level2a).await.unwrap_err();

    assert!(matches!(
        err,
        TreeServiceError::ValidationFailed(ValidationError::MissingParent)
    ));
    assert!(err.to_string().contains("must select a menu parent"));
    Ok(())
}

#[tokio::test]
async fn test_descendant_as_parent_rejected() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level1.set_parent(tree.level3.id());
    let err = pages.save(&mut tree.level1).await.unwrap_err();

    assert!(matches!(
        err,
        TreeServiceError::ValidationFailed(ValidationError::CyclicParent { .. })
    ));
    assert!(err
        .to_string()
        .contains("cannot select a child/descendent item as menu parent"));

    // Nothing was written
    let stored = pages.find_by_id(tree.level1.id()).await?.unwrap();
    assert_eq!(stored.parent_id(), Some(tree.home.id()));
    Ok(())
}

// =========================================================================
// Cascade Tests
// =========================================================================

#[tokio::test]
async fn test_unpublish_cascades_to_descendants() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level1.set_published(false);
    let outcome = pages.save(&mut tree.level1).await?;
    assert!(outcome.cascade.is_some());

    let descendants = pages.all_descendant_nodes(&tree.level1).await?;
    assert_eq!(descendants.len(), 3);
    let (pages_ref, level1) = (&pages, &tree.level1);
    let settled = eventually(move || async move {
        match pages_ref.all_descendant_nodes(level1).await {
            Ok(nodes) => nodes.iter().all(|n| !n.is_published),
            Err(_) => false,
        }
    })
    .await;
    assert!(settled, "descendants of level1 should all be unpublished");

    // Outside the subtree nothing changed
    let home = pages.find_by_id(tree.home.id()).await?.unwrap();
    assert!(home.is_published());
    Ok(())
}

#[tokio::test]
async fn test_reparent_cascades_route_paths() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level2a.set_parent(tree.level2b.id());
    let outcome = pages.save(&mut tree.level2a).await?;
    let report = outcome.cascade.unwrap().wait().await?;
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 0);

    let level3 = pages.find_by_id(tree.level3.id()).await?.unwrap();
    assert_eq!(level3.route_path(), "/home/level1/level2b/level2a/level3");
    Ok(())
}

#[tokio::test]
async fn test_rename_cascades_route_paths() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    tree.level1.set_title("club");
    let outcome = pages.save(&mut tree.level1).await?;
    let report = outcome.cascade.unwrap().wait().await?;
    assert_eq!(report.visited, 3);
    assert_eq!(report.updated, 3);

    for (page, expected) in [
        (&tree.level2a, "/home/club/level2a"),
        (&tree.level3, "/home/club/level2a/level3"),
        (&tree.level2b, "/home/club/level2b"),
    ] {
        let stored = pages.find_by_id(page.id()).await?.unwrap();
        assert_eq!(stored.route_path(), expected);
    }
    assert!(pages.resolve_route("/home/club/level2b").await?.is_some());
    assert!(pages.resolve_route("/home/level1/level2b").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_idempotent_save() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    let before = pages.find_by_id(tree.level2a.id()).await?.unwrap();
    let outcome = pages.save(&mut tree.level2a).await?;
    assert!(!outcome.modified);
    assert!(outcome.cascade.is_none());

    // A freshly loaded copy saved untouched is a no-op too
    let mut reloaded = pages.find_by_id(tree.level2a.id()).await?.unwrap();
    let outcome = pages.save(&mut reloaded).await?;
    assert!(!outcome.modified);

    let after = pages.find_by_id(tree.level2a.id()).await?.unwrap();
    assert_eq!(after.route_path(), before.route_path());
    assert_eq!(after.version(), before.version());
    Ok(())
}

#[tokio::test]
async fn test_cascade_failure_is_isolated() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let pages = PageService::new(store.clone(), &TreeConfig::default());
    let mut tree = insert_test_pages(&pages).await?;

    store.fail_saves_for(tree.level2a.id()).await;
    tree.level1.set_published(false);
    let outcome = pages.save(&mut tree.level1).await?;
    assert!(outcome.modified, "the saver never sees cascade failures");

    let report = outcome.cascade.unwrap().wait().await?;
    assert_eq!(report.visited, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, 1);

    assert!(pages.find_by_id(tree.level2a.id()).await?.unwrap().is_published());
    assert!(!pages.find_by_id(tree.level3.id()).await?.unwrap().is_published());
    assert!(!pages.find_by_id(tree.level2b.id()).await?.unwrap().is_published());
    Ok(())
}

#[tokio::test]
async fn test_page_loaded_before_cascade_still_saves() -> Result<()> {
    let (pages, _temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;

    // tree.level2b still holds the version from before the cascade
    tree.level1.set_published(false);
    let outcome = pages.save(&mut tree.level1).await?;
    let report = outcome.cascade.unwrap().wait().await?;
    assert_eq!(report.updated, 3);

    tree.level2b.set_title("renamed");
    let outcome = pages.save(&mut tree.level2b).await?;
    assert!(outcome.modified);

    let stored = pages.find_by_id(tree.level2b.id()).await?.unwrap();
    assert_eq!(stored.title(), "renamed");
    assert_eq!(stored.route_path(), "/home/level1/renamed");
    assert!(!stored.is_published(), "the cascade's unpublish is kept");
    assert_eq!(stored.version(), 3);
    assert_eq!(tree.level2b.version(), 3);
    Ok(())
}

#[tokio::test]
async fn test_close_waits_for_cascades() -> Result<()> {
    let (pages, temp_dir) = create_test_env().await?;
    let mut tree = insert_test_pages(&pages).await?;
    let store = pages.store().clone();

    tree.level1.set_published(false);
    pages.save(&mut tree.level1).await?;
    pages.close().await?;

    assert!(store.get_node(tree.level3.id()).await.is_err());

    // Reopen the file: the queued cascade was applied before close returned
    let db = Arc::new(DatabaseService::new(temp_dir.path().join("site.db")).await?);
    let reopened = TursoStore::new(db);
    let level3 = reopened.get_node(tree.level3.id()).await?.unwrap();
    assert!(!level3.is_published);
    Ok(())
}
