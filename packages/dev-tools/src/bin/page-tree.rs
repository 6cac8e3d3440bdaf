//! Page Tree Operator Tool
//!
//! Inspects and maintains the page tree stored in a club site database.
//!
//! # Usage
//!
//! ```bash
//! # Create the home page if the database has none
//! cargo run --bin page-tree -- init --title home
//!
//! # Print the tree (or the subtree below a route)
//! cargo run --bin page-tree -- print
//! cargo run --bin page-tree -- print --from /home/club
//!
//! # Check cached route paths and parent chains, then fix stale paths
//! cargo run --bin page-tree -- audit
//! cargo run --bin page-tree -- repair
//! ```
//!
//! # Environment Variables
//!
//! - `CLUBSITE_DB_PATH`: Database file (overridden by `--db`)
//! - `CLUBSITE_MAX_TREE_DEPTH`: Depth limit for tree walks
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clubsite_core::config::TreeConfig;
use clubsite_core::db::{DatabaseService, NodeStore, TursoStore};
use clubsite_core::models::{Node, NodeKind, NodeQuery};
use clubsite_core::services::PageService;

/// Inspect and maintain the club site page tree.
#[derive(Parser)]
#[command(name = "page-tree", version, about)]
struct Cli {
    /// Database file (defaults to CLUBSITE_DB_PATH or ./data/clubsite.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the home page if it does not exist yet.
    Init {
        #[arg(long, default_value = "home")]
        title: String,
    },
    /// Print the page tree.
    Print {
        /// Route path of the subtree to print (defaults to the home page)
        #[arg(long)]
        from: Option<String>,
        /// Emit the pages as JSON instead of an indented outline
        #[arg(long)]
        json: bool,
    },
    /// Report stale route paths, broken parent chains and cycles.
    Audit {
        #[arg(long)]
        json: bool,
    },
    /// Recompute every stale route path.
    Repair,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TreeConfig::from_env();
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }
    tracing::info!("Using database {}", config.db_path.display());

    let db = Arc::new(DatabaseService::new(config.db_path.clone()).await?);
    let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
    let pages = PageService::new(store, &config);

    let result = run(&pages, cli.command).await;
    pages.close().await?;
    result
}

async fn run(pages: &PageService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { title } => {
            let home = pages.ensure_home_page(&title).await?;
            println!("{} {}", home.id(), home.route_path());
        }
        Commands::Print { from, json } => {
            let top = match from {
                Some(route_path) => pages.find_by_route_path(&route_path).await?,
                None => pages.find_one(&NodeQuery::by_kind(NodeKind::HomePage)).await?,
            }
            .ok_or_else(|| anyhow::anyhow!("No page found to start from"))?
            .into_node();

            if json {
                let mut nodes = vec![top.clone()];
                nodes.extend(pages.queries().descendant_set(&top.id).await?);
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                print_outline(pages, top).await?;
            }
        }
        Commands::Audit { json } => {
            let audit = pages.audit_tree().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&audit)?);
            } else {
                println!("checked:     {}", audit.checked);
                println!("home pages:  {}", audit.home_pages);
                for stale in &audit.stale_paths {
                    println!("stale:       {} {} -> {}", stale.node_id, stale.stored, stale.expected);
                }
                for (node_id, parent_id) in &audit.broken_chains {
                    println!("broken:      {} (missing parent {})", node_id, parent_id);
                }
                for node_id in &audit.unreachable {
                    println!("unreachable: {}", node_id);
                }
            }
            if !audit.is_healthy() {
                anyhow::bail!("page tree has problems");
            }
        }
        Commands::Repair => {
            let report = pages.repair_route_paths().await?;
            println!("repaired {} route paths ({} failed)", report.repaired, report.failed);
            if report.failed > 0 {
                anyhow::bail!("{} route paths could not be repaired", report.failed);
            }
        }
    }
    Ok(())
}

/// Depth-first outline, children in insertion order
async fn print_outline(pages: &PageService, top: Node) -> anyhow::Result<()> {
    for (depth, node) in outline(pages, top).await? {
        let marker = if node.is_published { ' ' } else { '*' };
        println!("{}{}{}  {}", "  ".repeat(depth), marker, node.title, node.route_path);
    }
    Ok(())
}

/// `(depth, node)` pairs in print order, stopping at the first repeated id
async fn outline(pages: &PageService, top: Node) -> anyhow::Result<Vec<(usize, Node)>> {
    let max_depth = pages.queries().max_depth();
    let mut visited = HashSet::new();
    let mut stack = vec![(top, 0usize)];
    let mut lines = Vec::new();

    while let Some((node, depth)) = stack.pop() {
        if !visited.insert(node.id.clone()) {
            anyhow::bail!("cycle in page tree: {} is its own ancestor", node.id);
        }
        if depth > max_depth {
            anyhow::bail!("tree below {} is deeper than {}", node.id, max_depth);
        }

        let children = pages.store().get_children(&node.id).await?;
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        lines.push((depth, node));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubsite_core::db::MemoryStore;

    fn page(id: &str, parent: &str) -> Node {
        Node::new_with_id(
            id.to_string(),
            NodeKind::Page,
            id.to_string(),
            Some(parent.to_string()),
        )
    }

    #[tokio::test]
    async fn test_outline_depth_first() {
        let store = MemoryStore::new()
            .with_node(Node::new_with_id(
                "home".to_string(),
                NodeKind::HomePage,
                "home".to_string(),
                None,
            ))
            .with_node(page("a", "home"))
            .with_node(page("b", "home"))
            .with_node(page("a1", "a"));
        let pages = PageService::new(Arc::new(store), &TreeConfig::default());
        let home = pages.store().get_node("home").await.unwrap().unwrap();

        let lines = outline(&pages, home).await.unwrap();
        let order: Vec<_> = lines.iter().map(|(d, n)| (*d, n.id.as_str())).collect();
        assert_eq!(order, vec![(0, "home"), (1, "a"), (2, "a1"), (1, "b")]);
    }

    #[tokio::test]
    async fn test_outline_stops_on_cycle() {
        let store = MemoryStore::new()
            .with_node(page("x", "y"))
            .with_node(page("y", "x"));
        let pages = PageService::new(Arc::new(store), &TreeConfig::default());
        let x = pages.store().get_node("x").await.unwrap().unwrap();

        let err = outline(&pages, x).await.unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
