//! Interactive product search.
//!
//! Loads a catalog of pre-embedded products, then answers one query per line
//! on stdin, keeping a single conversation session for follow-ups such as
//! "the link?".

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shopsearch_retrieval::{
    ChatRole, ProductIndex, QueryIntent, RetrievalConfig, SearchService, SessionMemory,
    TypeFilter, classify, load_catalog_file,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shopsearch", about = "Search a product catalog by meaning")]
struct Cli {
    /// JSON array of products with embeddings.
    #[arg(long, env = "EMBEDDINGS_PATH", default_value = "product_embeddings.json")]
    catalog: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Known brand names, one per line (`#` starts a comment).
    #[arg(long)]
    brands: Option<PathBuf>,

    /// Results per query (defaults to `search.default_k`).
    #[arg(short, long)]
    k: Option<usize>,

    /// Answer a single query and exit.
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RetrievalConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RetrievalConfig::default(),
    };

    let entries = load_catalog_file(&cli.catalog)
        .await
        .with_context(|| format!("failed to read catalog {}", cli.catalog.display()))?;
    let index = ProductIndex::load_with_dimension(
        entries,
        config.search.product_types.clone(),
        config.embedding.dimension,
    )
    .context("failed to index catalog")?;
    let known_brands = match &cli.brands {
        Some(path) => load_brands(path).await?,
        None => HashSet::new(),
    };

    let service = SearchService::from_config(Arc::new(index), &config);
    let sessions = SessionMemory::new(&config.session);
    let session_id = uuid::Uuid::now_v7().to_string();
    let k = cli.k.unwrap_or_else(|| service.default_k());

    info!("{} products loaded", service.index().len());

    let mut stdout = tokio::io::stdout();

    if let Some(query) = &cli.query {
        let reply = answer(&service, &sessions, &session_id, &known_brands, query, k).await?;
        stdout.write_all(reply.as_bytes()).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"\nsearch> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() || query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = answer(&service, &sessions, &session_id, &known_brands, query, k).await?;
        stdout.write_all(reply.as_bytes()).await?;
    }

    Ok(())
}

async fn answer(
    service: &SearchService,
    sessions: &SessionMemory,
    session_id: &str,
    known_brands: &HashSet<String>,
    query: &str,
    k: usize,
) -> Result<String> {
    sessions.append_turn(session_id, ChatRole::User, query).await;

    let reply = match classify(query, known_brands) {
        QueryIntent::FollowUp => {
            let last = sessions.last_results(session_id).await;
            if last.is_empty() {
                "Which product link do you need?\n".to_string()
            } else {
                last.iter()
                    .map(|r| format!("{}  ↗ {}\n", r.title, r.link))
                    .collect()
            }
        }
        intent @ (QueryIntent::ProductIntent { .. } | QueryIntent::Other) => {
            let k = match intent {
                QueryIntent::ProductIntent {
                    requested_count: Some(n),
                    ..
                } => n,
                _ => k,
            };
            let outcome = service
                .search_for_session(sessions, session_id, query, k, TypeFilter::Auto)
                .await?;
            if outcome.is_empty() {
                "No matches found.\n".to_string()
            } else {
                let mut reply = format!("Top matches ({:?}):\n", outcome.method);
                for link in service.result_links(&outcome) {
                    reply.push_str(&format!("• {}  ↗ {}\n", link.title, link.link));
                }
                reply
            }
        }
        QueryIntent::BrandQuery { brand } => {
            let outcome = service.brand_search(&brand, k)?;
            let links = service.result_links(&outcome);
            sessions.set_last_results(session_id, links.clone()).await;
            if links.is_empty() {
                format!("Sorry, we don't stock {brand}.\n")
            } else {
                let mut reply = format!("Yes, we carry {brand}:\n");
                for link in links {
                    reply.push_str(&format!("• {}  ↗ {}\n", link.title, link.link));
                }
                reply
            }
        }
        QueryIntent::Greeting => "Hello! What are you shopping for today?\n".to_string(),
        QueryIntent::ContactRequest => {
            "Contact details are listed on the store's website.\n".to_string()
        }
    };

    sessions
        .append_turn(session_id, ChatRole::Assistant, reply.trim_end())
        .await;
    Ok(reply)
}

async fn load_brands(path: &Path) -> Result<HashSet<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read brands {}", path.display()))?;
    Ok(content
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.starts_with('#'))
        .map(str::to_lowercase)
        .collect())
}
