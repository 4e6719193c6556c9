use anyhow::Result;
use chrono::{Local, Utc};
use ingest::{init_schema, open_db, run_ingest, HttpFetcher, IngestConfig, JsonCatalogStore};
use rusqlite::Connection;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = IngestConfig::from_env();
    tracing::info!("Chamber Events Ingest");
    tracing::info!(
        catalog = %cfg.catalog_path.display(),
        ledger = %cfg.ledger_path.display(),
        render = cfg.render_endpoint.is_some(),
        "data paths"
    );

    let fetcher = HttpFetcher::from_config(&cfg)?;
    let store = JsonCatalogStore::new(&cfg.catalog_path);
    let ledger = open_ledger(&cfg.ledger_path);

    let today = Local::now().date_naive();
    let summary = run_ingest(&cfg, &fetcher, &store, ledger.as_ref(), today, Utc::now()).await?;

    for report in &summary.sources {
        match &report.error {
            Some(error) => tracing::warn!(source = report.source, error = %error, "source skipped"),
            None => tracing::info!(
                source = report.source,
                url = %report.url,
                records = report.records,
                "source loaded"
            ),
        }
    }
    tracing::info!(
        run_id = %summary.run_id,
        retained = summary.retained_events,
        outcome = summary.outcome.as_str(),
        "ingest complete"
    );
    Ok(())
}

fn open_ledger(path: &Path) -> Option<Connection> {
    let opened = open_db(path).and_then(|conn| {
        init_schema(&conn)?;
        Ok(conn)
    });
    match opened {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(error = %e, "run ledger unavailable, continuing without it");
            None
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
