//! Tests for PageService and Page
//!
//! Tests cover:
//! - Change tracking on Page
//! - Save semantics (validation, no-op saves, cascades)
//! - Route resolution and home page initialisation
//! - Audit and repair of stale route paths

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::db::{MemoryStore, NodeStore};
    use crate::models::{Node, NodeKind, NodeQuery, ValidationError};
    use crate::services::{Page, PageService, TreeServiceError};
    use std::sync::Arc;

    fn service() -> (PageService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PageService::new(store.clone(), &TreeConfig::default()), store)
    }

    async fn save(pages: &PageService, page: &mut Page) {
        let outcome = pages.save(page).await.unwrap();
        if let Some(cascade) = outcome.cascade {
            cascade.wait().await.unwrap();
        }
    }

    #[test]
    fn test_page_change_tracking() {
        let home = Page::new(Node::new_home_page("home".to_string()));
        assert!(home.is_new());
        assert!(home.is_modified());
        assert!(!home.parent_changed());

        let mut page = Page::from_stored(
            Node::new_page("news".to_string(), "home".to_string()).published(true),
        );
        assert!(!page.is_modified());

        page.set_title("latest");
        assert!(page.title_changed());
        assert!(page.is_modified());

        page.set_parent("other");
        assert!(page.parent_changed());

        page.set_published(false);
        assert!(page.was_unpublished());

        page.content_mut().brief = "changed".to_string();
        assert_eq!(page.content().brief, "changed");
    }

    #[tokio::test]
    async fn test_first_save_derives_route_path() {
        let (pages, _store) = service();

        let home = pages.ensure_home_page("home").await.unwrap();
        assert_eq!(home.route_path(), "/home");
        assert_eq!(home.version(), 1);

        let mut news = pages.new_page("news", &home);
        let outcome = pages.save(&mut news).await.unwrap();
        assert!(outcome.modified);
        assert!(outcome.cascade.is_none());
        assert_eq!(news.route_path(), "/home/news");
        assert!(!news.is_new());
        assert!(!news.is_modified());
    }

    #[tokio::test]
    async fn test_ensure_home_page_is_idempotent() {
        let (pages, store) = service();

        let first = pages.ensure_home_page("home").await.unwrap();
        let second = pages.ensure_home_page("welcome").await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(second.title(), "home");
        assert_eq!(
            store
                .query_nodes(&NodeQuery::by_kind(NodeKind::HomePage))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unmodified_save_is_noop() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut news = pages.new_page("news", &home);
        save(&pages, &mut news).await;

        // Break validation behind the page's back: a no-op save must not notice
        store
            .remove_nodes(&NodeQuery::by_id(home.id()))
            .await
            .unwrap();

        let outcome = pages.save(&mut news).await.unwrap();
        assert!(!outcome.modified);
        assert!(outcome.cascade.is_none());
        assert_eq!(news.version(), 1);
    }

    #[tokio::test]
    async fn test_invalid_save_writes_nothing() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut news = pages.new_page("news", &home);
        save(&pages, &mut news).await;

        news.clear_parent();
        let err = pages.save(&mut news).await.unwrap_err();
        assert!(matches!(
            err,
            TreeServiceError::ValidationFailed(ValidationError::MissingParent)
        ));

        let stored = store.get_node(news.id()).await.unwrap().unwrap();
        assert_eq!(stored.parent_id.as_deref(), Some(home.id()));
        assert!(news.is_modified());
    }

    #[tokio::test]
    async fn test_title_with_separator_rejected() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut a = pages.new_page("a", &home);
        save(&pages, &mut a).await;
        let mut b = pages.new_page("b", &a);
        save(&pages, &mut b).await;

        // "a/b" under home would share /home/a/b with b
        let mut alias = pages.new_page("a/b", &home);
        let err = pages.save(&mut alias).await.unwrap_err();
        assert!(matches!(
            err,
            TreeServiceError::ValidationFailed(ValidationError::TitleContainsSeparator)
        ));
        assert!(store.get_node(alias.id()).await.unwrap().is_none());

        let found = pages.find_by_route_path("/home/a/b").await.unwrap().unwrap();
        assert_eq!(found.id(), b.id());
    }

    #[tokio::test]
    async fn test_concurrent_editors_merge_changed_fields() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut news = pages.new_page("news", &home);
        save(&pages, &mut news).await;

        let mut editor_a = pages.find_by_id(news.id()).await.unwrap().unwrap();
        let mut editor_b = pages.find_by_id(news.id()).await.unwrap().unwrap();

        editor_a.set_title("latest");
        editor_a.content_mut().brief = "from a".to_string();
        save(&pages, &mut editor_a).await;

        // b loaded before a saved: its edits land on top of a's
        editor_b.content_mut().brief = "from b".to_string();
        editor_b.content_mut().body = "body".to_string();
        let outcome = pages.save(&mut editor_b).await.unwrap();
        assert!(outcome.modified);

        let stored = store.get_node(news.id()).await.unwrap().unwrap();
        assert_eq!(stored.title, "latest");
        assert_eq!(stored.route_path, "/home/latest");
        assert_eq!(stored.content.brief, "from b");
        assert_eq!(stored.content.body, "body");
        assert_eq!(stored.version, 3);

        assert_eq!(editor_b.title(), "latest");
        assert!(!editor_b.is_modified());
    }

    #[test]
    fn test_rebase_keeps_untouched_fields_from_store() {
        let base = Node::new_page("news".to_string(), "home".to_string()).published(true);
        let mut page = Page::from_stored(base.clone());
        page.set_title("latest");

        let mut stored = base;
        stored.is_published = false;
        stored.version = 2;

        let rebased = page.rebase_onto(&stored);
        assert_eq!(rebased.title, "latest");
        assert!(!rebased.is_published);
        assert_eq!(rebased.version, 2);
    }

    #[tokio::test]
    async fn test_new_page_with_unknown_parent() {
        let (pages, store) = service();
        let ghost = Page::new(Node::new_home_page("ghost".to_string()));
        let mut news = pages.new_page("news", &ghost);

        let err = pages.save(&mut news).await.unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::UnknownParent { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_republish_does_not_cascade() {
        let (pages, _store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();

        let mut parent = pages.new_page("club", &home);
        parent.set_published(true);
        save(&pages, &mut parent).await;
        let mut child = pages.new_page("history", &parent);
        child.set_published(true);
        save(&pages, &mut child).await;

        parent.set_published(false);
        save(&pages, &mut parent).await;
        let child = pages.find_by_id(child.id()).await.unwrap().unwrap();
        assert!(!child.is_published());

        parent.set_published(true);
        let outcome = pages.save(&mut parent).await.unwrap();
        assert!(outcome.cascade.is_none());
        let child = pages.find_by_id(child.id()).await.unwrap().unwrap();
        assert!(!child.is_published());
    }

    #[tokio::test]
    async fn test_resolve_route_hides_unpublished_ancestors() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();

        let mut club = pages.new_page("club", &home);
        club.set_published(true);
        save(&pages, &mut club).await;
        let mut history = pages.new_page("history", &club);
        history.set_published(true);
        save(&pages, &mut history).await;

        assert!(pages
            .resolve_route("/home/club/history")
            .await
            .unwrap()
            .is_some());
        assert!(pages.resolve_route("/home/missing").await.unwrap().is_none());

        // Unpublish the ancestor directly so the child keeps its own flag
        let mut raw = store.get_node(club.id()).await.unwrap().unwrap();
        raw.is_published = false;
        store.save_node(&raw).await.unwrap();

        assert!(pages
            .find_by_route_path("/home/club/history")
            .await
            .unwrap()
            .unwrap()
            .is_published());
        assert!(pages
            .resolve_route("/home/club/history")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_audit_and_repair_stale_paths() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut club = pages.new_page("club", &home);
        save(&pages, &mut club).await;
        let mut history = pages.new_page("history", &club);
        save(&pages, &mut history).await;

        let mut raw = store.get_node(history.id()).await.unwrap().unwrap();
        raw.route_path = "/old/path".to_string();
        store.save_node(&raw).await.unwrap();

        let audit = pages.audit_tree().await.unwrap();
        assert_eq!(audit.checked, 3);
        assert_eq!(audit.home_pages, 1);
        assert_eq!(audit.stale_paths.len(), 1);
        assert_eq!(audit.stale_paths[0].expected, "/home/club/history");
        assert!(!audit.is_healthy());

        let report = pages.repair_route_paths().await.unwrap();
        assert_eq!(report.repaired, 1);
        assert_eq!(report.failed, 0);
        assert!(pages.audit_tree().await.unwrap().is_healthy());
    }

    #[tokio::test]
    async fn test_audit_reports_broken_chains() {
        let (pages, store) = service();
        let home = pages.ensure_home_page("home").await.unwrap();
        let mut club = pages.new_page("club", &home);
        save(&pages, &mut club).await;
        let mut history = pages.new_page("history", &club);
        save(&pages, &mut history).await;

        store.remove_nodes(&NodeQuery::by_id(club.id())).await.unwrap();

        let audit = pages.audit_tree().await.unwrap();
        assert_eq!(
            audit.broken_chains,
            vec![(history.id().to_string(), club.id().to_string())]
        );
    }

    #[tokio::test]
    async fn test_close_drains_and_closes_store() {
        let (pages, store) = service();
        pages.ensure_home_page("home").await.unwrap();

        pages.close().await.unwrap();
        assert!(store.get_node("anything").await.is_err());
    }
}
