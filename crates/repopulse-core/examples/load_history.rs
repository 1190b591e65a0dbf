//! Load a year of commit history for a repository, with progress output.
//!
//! Usage: `cargo run --example load_history -- owner/name`
//! Set `GITHUB_TOKEN` to raise the unauthenticated rate limit.

use repopulse_core::{cache, ChunkedHistoricalLoader, DataType, DateRange, GitHubSource, LoadProgress};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repopulse_core=debug".into()),
        )
        .init();

    let repository = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rust-lang/cargo".to_string());
    let token = std::env::var("GITHUB_TOKEN").ok();

    let store = cache::open_store("./repopulse-cache.sqlite");
    let source = Arc::new(GitHubSource::with_token(token)?);
    let loader = ChunkedHistoricalLoader::new(store.clone(), source);

    let now = chrono::Utc::now();
    let range = DateRange::new(now - chrono::Duration::days(365), now)?;

    let (tx, mut rx) = mpsc::channel::<LoadProgress>(8);
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            println!(
                "  chunk {}/{}: {} items ({} total)",
                p.chunk_index + 1,
                p.total_chunks,
                p.items_in_chunk,
                p.items_total
            );
        }
    });

    println!("Loading one year of commits for {repository}...");
    let result = loader
        .load_historical(&repository, DataType::Commits, range, None, Some(tx))
        .await?;
    printer.await?;

    println!(
        "Loaded {} commits in {}/{} chunks ({:?}, from_cache: {})",
        result.items.len(),
        result.chunks_loaded,
        result.total_chunks,
        result.status,
        result.from_cache
    );

    let stats = store.stats()?;
    println!(
        "Cache: {} entries, {} KB",
        stats.total_entries,
        stats.total_size_bytes / 1024
    );

    Ok(())
}
