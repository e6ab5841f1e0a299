use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{
    Config, DataMode, MarketDataProvider, SentimentFeed, Source, StrategyCandidate,
    ValidationVerdict,
};
use engine::{BinanceProvider, Runner, SyntheticProvider, ValidationConfig};
use registry::Registry;

/// A scraped strategy as the discovery collaborators hand it over.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    name: String,
    source: Source,
    /// Loose rule description, parsed and validated before insert.
    rule_text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let Some(command) = std::env::args().nth(1) else {
        usage();
        return Ok(());
    };

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.data_mode, symbol = %cfg.symbol, "Strategy Radar starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = SqlitePool::connect(&cfg.database_url)
        .await
        .context("Failed to connect to database")?;
    Registry::migrate(&pool)
        .await
        .context("Database migration failed")?;
    let registry = Arc::new(Registry::new(pool));
    info!("Database ready");

    // ── Market data provider (injected based on DATA_MODE) ────────────────────
    let (provider, sentiment_feed): (
        Arc<dyn MarketDataProvider>,
        Option<Arc<dyn SentimentFeed>>,
    ) = match cfg.data_mode {
        DataMode::Live => {
            info!("Live data mode — using BinanceProvider");
            // Sentiment samples come from the scraper collaborators; none is
            // wired into this binary.
            (Arc::new(BinanceProvider::new()), None)
        }
        DataMode::Synthetic => {
            info!("Synthetic data mode — offline validation against generated series");
            let synthetic = Arc::new(SyntheticProvider::default());
            (synthetic.clone(), Some(synthetic))
        }
    };

    let runner = Runner::new(
        provider,
        sentiment_feed,
        registry.clone(),
        ValidationConfig::from_config(&cfg),
    );

    // ── Command dispatch ──────────────────────────────────────────────────────
    match command.as_str() {
        "all" => {
            let verdicts = runner.validate_pending().await?;
            println!("\nValidated {} pending strategies:", verdicts.len());
            for verdict in &verdicts {
                print_verdict(&registry, verdict).await;
            }
        }
        "import" => {
            let path = std::env::args()
                .nth(2)
                .context("usage: radar import <file.json>")?;
            import_candidates(&registry, &path).await?;
        }
        id => {
            let verdict = runner.validate_one(id).await?;
            print_verdict(&registry, &verdict).await;
        }
    }

    Ok(())
}

/// Load scraped candidates from a JSON file, rejecting malformed rule
/// descriptions at the door.
async fn import_candidates(registry: &Registry, path: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidate file '{path}'"))?;
    let records: Vec<ImportRecord> =
        serde_json::from_str(&raw).context("Candidate file is not a JSON array")?;

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for record in records {
        match common::rule::parse(&record.rule_text) {
            Ok(rule) => {
                let candidate = StrategyCandidate::new(record.name, record.source, rule);
                registry.insert_candidate(&candidate).await?;
                accepted += 1;
            }
            Err(e) => {
                warn!(name = %record.name, error = %e, "rule rejected at the parser boundary");
                rejected += 1;
            }
        }
    }

    println!("Imported {accepted} candidates ({rejected} rejected as malformed)");
    Ok(())
}

async fn print_verdict(registry: &Registry, verdict: &ValidationVerdict) {
    let name = registry
        .candidate(&verdict.strategy_id)
        .await
        .map(|c| c.name)
        .unwrap_or_else(|_| verdict.strategy_id.clone());

    let passed = verdict.windows.values().filter(|w| w.is_passed()).count();
    let evaluated = verdict
        .windows
        .values()
        .filter(|w| w.is_evaluated())
        .count();

    println!(
        "  {} — {} ({passed}/{evaluated} windows passed{})",
        name,
        verdict.overall,
        match &verdict.sentiment {
            Some(s) if s.supportive => ", sentiment supportive",
            Some(_) => ", sentiment unsupportive",
            None => "",
        }
    );
}

fn usage() {
    println!("Usage:");
    println!("  radar all                  Validate every pending strategy");
    println!("  radar <strategy-id>        Validate one strategy");
    println!("  radar import <file.json>   Register scraped candidates");
    println!();
    println!("Candidates normally arrive through the discovery scrapers; `import`");
    println!("accepts the same records as a JSON array of");
    println!(r#"  {{"name": "...", "source": "reddit|twitter|tradingview", "rule_text": "..."}}"#);
}
