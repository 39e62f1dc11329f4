//! Maintenance entry point
//!
//! Opens the marketplace database, rebuilds every reputation aggregate from the
//! stored ratings and flushes before exiting.
use anyhow::Context;
use freight_market::config::Config;
use freight_market::directory::StoredDirectory;
use freight_market::notify::NotificationOutbox;
use freight_market::rating::RatingAggregator;
use freight_market::store::Store;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        db_path = %config.db_path.display(),
        policy = ?config.transition_policy,
        "starting freight-market maintenance"
    );

    let store = Store::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let ratings = RatingAggregator::new(
        store.clone(),
        Arc::new(StoredDirectory::new(store.clone())),
        Arc::new(NotificationOutbox::new(store.clone())),
    );
    let rebuilt = ratings
        .reconcile_all()
        .context("Failed to reconcile reputations")?;

    store.flush().context("Failed to flush database")?;
    tracing::info!(rebuilt, "maintenance finished");

    Ok(())
}
