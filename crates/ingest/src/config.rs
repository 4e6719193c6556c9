use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::CATALOG_FILE;
use crate::locator::DEFAULT_MAX_CANDIDATES;
use crate::sources::{find_source, SourceSpec, SOURCES};

pub const LEDGER_FILE: &str = "ingest.db";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub ledger_path: PathBuf,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    /// Headless rendering service; `None` disables script rendering.
    pub render_endpoint: Option<String>,
    pub render_settle: Duration,
    pub max_candidates: usize,
    pub sources: Vec<&'static SourceSpec>,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let catalog_path = var("CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(CATALOG_FILE));
        let ledger_path = var("LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(LEDGER_FILE));

        Self {
            catalog_path,
            ledger_path,
            data_dir,
            fetch_timeout: Duration::from_secs(parsed(&var, "FETCH_TIMEOUT_SECS", 30)),
            user_agent: var("FETCH_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            render_endpoint: var("RENDER_ENDPOINT"),
            render_settle: Duration::from_millis(parsed(&var, "RENDER_SETTLE_MS", 3000)),
            max_candidates: parsed(&var, "MAX_CANDIDATES", DEFAULT_MAX_CANDIDATES),
            sources: select_sources(var("INGEST_SOURCES").as_deref()),
        }
    }
}

fn parsed<T: FromStr + Copy>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
    }
}

/// Comma-separated source keys; unset means every registered source.
fn select_sources(keys: Option<&str>) -> Vec<&'static SourceSpec> {
    let Some(keys) = keys else {
        return SOURCES.iter().collect();
    };
    keys.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter_map(|key| {
            let found = find_source(key);
            if found.is_none() {
                tracing::warn!(key, "unknown source in INGEST_SOURCES, ignoring");
            }
            found
        })
        .collect()
}
