//! refresh-loader: keep a watchlist's statement sets warm on a schedule.
//!
//! Each pass force-refreshes all four statement kinds per symbol through the
//! assembler, so interactive summary reads land on the cached path instead of
//! paying provider latency.
//!
//! Usage:
//!   cargo run -p refresh-loader -- --symbols AAPL,MSFT,GOOGL
//!   cargo run -p refresh-loader -- --symbols AAPL --db brief.db --interval-mins 30
//!   cargo run -p refresh-loader -- --symbols AAPL,MSFT --once

use std::sync::Arc;

use fmp_client::FmpClient;
use statement_store::{MemoryStatementStore, SqliteStatementStore};
use summary_core::StatementRepository;
use summary_orchestrator::SummaryAssembler;

const DEFAULT_INTERVAL_MINS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "refresh_loader=info,summary_orchestrator=info,fmp_client=warn".into()
            }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let once = args.iter().any(|a| a == "--once");

    let interval_mins: u64 = args
        .iter()
        .position(|a| a == "--interval-mins")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_INTERVAL_MINS);

    let db_path = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let symbols: Vec<String> = args
        .iter()
        .position(|a| a == "--symbols")
        .and_then(|i| args.get(i + 1))
        .map(|list| {
            list.split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if symbols.is_empty() {
        eprintln!("Usage:");
        eprintln!("  refresh-loader --symbols AAPL,MSFT,...   Watchlist to keep refreshed");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --db PATH           SQLite store path (default: in-memory)");
        eprintln!(
            "  --interval-mins N   Minutes between passes (default: {})",
            DEFAULT_INTERVAL_MINS
        );
        eprintln!("  --once              Run a single pass and exit");
        std::process::exit(1);
    }

    let repository: Arc<dyn StatementRepository> = match db_path {
        Some(path) => Arc::new(SqliteStatementStore::open(path).await?),
        None => Arc::new(MemoryStatementStore::new()),
    };
    let source = Arc::new(FmpClient::from_env()?);
    let assembler = SummaryAssembler::new(source, repository);

    tracing::info!(
        "refresh-loader: {} symbols, store={}, interval={}m, once={}",
        symbols.len(),
        db_path.unwrap_or("memory"),
        interval_mins,
        once
    );

    loop {
        let report = assembler.refresh_all(&symbols).await;
        tracing::info!(
            "pass done: {} refreshed, {} failed in {:.1}s",
            report.refreshed,
            report.failed,
            report.elapsed.as_secs_f64()
        );

        if once {
            if report.refreshed == 0 && report.failed > 0 {
                anyhow::bail!("every symbol failed to refresh");
            }
            return Ok(());
        }

        tokio::time::sleep(std::time::Duration::from_secs(interval_mins * 60)).await;
    }
}
