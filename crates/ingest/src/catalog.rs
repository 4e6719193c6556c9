use anyhow::{Context, Result};
use chamber_core::{Catalog, EventRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::Validate;

pub const CATALOG_FILE: &str = "events-data.json";

pub trait CatalogStore {
    /// `Ok(None)` when no catalog has been written yet.
    fn read_catalog(&self) -> Result<Option<Catalog>>;
    fn write_catalog(&self, catalog: &Catalog) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCatalog {
    last_updated: DateTime<Utc>,
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CatalogStore for JsonCatalogStore {
    fn read_catalog(&self) -> Result<Option<Catalog>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read catalog {}", self.path.display()))?;
        let stored: StoredCatalog = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", self.path.display()))?;

        let total = stored.events.len();
        let events: Vec<EventRecord> = stored
            .events
            .into_iter()
            .filter_map(|value| {
                let record: EventRecord = serde_json::from_value(value).ok()?;
                record.validate().ok()?;
                Some(record)
            })
            .collect();
        if events.len() < total {
            tracing::warn!(
                path = %self.path.display(),
                dropped = total - events.len(),
                "dropped invalid stored events"
            );
        }

        Ok(Some(Catalog::new(stored.last_updated, events)))
    }

    fn write_catalog(&self, catalog: &Catalog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(catalog).context("failed to serialize catalog")?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace catalog {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), events = catalog.events.len(), "catalog written");
        Ok(())
    }
}
