use anyhow::Result;
use chamber_core::{Catalog, Chamber, EventRecord};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use futures::future::join_all;
use reqwest::Url;
use rusqlite::Connection;
use scraper::Html;
use tracing::Instrument;

use crate::assembler::assemble;
use crate::catalog::CatalogStore;
use crate::config::IngestConfig;
use crate::db;
use crate::extractor::{discover_events_link, FieldExtractor};
use crate::fetcher::DocumentFetcher;
use crate::locator::CandidateLocator;
use crate::merge::merge_with_catalog;
use crate::sources::SourceSpec;
use crate::window::upcoming;

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: &'static str,
    pub chamber: Chamber,
    pub url: String,
    pub candidates: usize,
    pub records: usize,
    pub rejected: usize,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub candidates: usize,
    pub records: Vec<EventRecord>,
    pub rejected: usize,
}

pub fn extract_records(source: &SourceSpec, html: &str, max_candidates: usize) -> Result<Extraction> {
    let locator = CandidateLocator::for_source(source, max_candidates)?;
    let extractor = FieldExtractor::for_source(source)?;
    let document = Html::parse_document(html);

    let candidates = locator.locate(&document);
    let mut out = Extraction {
        candidates: candidates.len(),
        ..Extraction::default()
    };
    for candidate in &candidates {
        match assemble(extractor.extract(candidate), source.chamber) {
            Ok(record) => out.records.push(record),
            Err(reason) => {
                tracing::debug!(source = source.key, reason = reason.as_str(), "candidate discarded");
                out.rejected += 1;
            }
        }
    }
    Ok(out)
}

fn events_page(source: &SourceSpec, homepage: &str) -> Option<String> {
    let origin = Url::parse(source.origin).ok()?;
    discover_events_link(&Html::parse_document(homepage), &origin)
}

struct Harvest {
    report: SourceReport,
    records: Vec<EventRecord>,
}

async fn harvest<F: DocumentFetcher>(
    fetcher: &F,
    source: &'static SourceSpec,
    max_candidates: usize,
) -> Harvest {
    let render = source.requires_rendering && fetcher.can_render();
    if source.requires_rendering && !render {
        tracing::warn!(source = source.key, "source expects rendered pages, using plain markup");
    }

    let mut report = SourceReport {
        source: source.key,
        chamber: source.chamber,
        url: source.index_url.to_string(),
        candidates: 0,
        records: 0,
        rejected: 0,
        error: None,
    };

    let mut html = match fetcher.fetch(source.index_url, render).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(source = source.key, error = %e, "fetch failed, skipping source");
            report.error = Some(format!("{e:#}"));
            return Harvest {
                report,
                records: Vec::new(),
            };
        }
    };

    if source.discover_events_link {
        if let Some(link) = events_page(source, &html) {
            match fetcher.fetch(&link, render).await {
                Ok(page) => {
                    tracing::info!(source = source.key, url = %link, "followed events link");
                    html = page;
                    report.url = link;
                }
                Err(e) => {
                    tracing::warn!(source = source.key, url = %link, error = %e, "events page fetch failed, using homepage");
                }
            }
        }
    }

    match extract_records(source, &html, max_candidates) {
        Ok(extraction) => {
            report.candidates = extraction.candidates;
            report.records = extraction.records.len();
            report.rejected = extraction.rejected;
            tracing::info!(
                source = source.key,
                candidates = report.candidates,
                records = report.records,
                rejected = report.rejected,
                "source extracted"
            );
            Harvest {
                report,
                records: extraction.records,
            }
        }
        Err(e) => {
            tracing::error!(source = source.key, error = %e, "extraction setup failed");
            report.error = Some(format!("{e:#}"));
            Harvest {
                report,
                records: Vec::new(),
            }
        }
    }
}

async fn collect<F: DocumentFetcher>(
    fetcher: &F,
    sources: &[&'static SourceSpec],
    max_candidates: usize,
) -> Vec<Harvest> {
    join_all(sources.iter().map(|source| harvest(fetcher, source, max_candidates))).await
}

#[derive(Debug)]
pub enum PriorCatalog {
    Missing,
    Unreadable,
    Loaded(Catalog),
}

impl PriorCatalog {
    pub fn read(store: &impl CatalogStore) -> Self {
        match store.read_catalog() {
            Ok(Some(catalog)) => PriorCatalog::Loaded(catalog),
            Ok(None) => PriorCatalog::Missing,
            Err(e) => {
                tracing::warn!(error = %e, "stored catalog unreadable, treating as empty");
                PriorCatalog::Unreadable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOutcome {
    Replaced,
    Touched,
    Skipped,
}

impl CatalogOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogOutcome::Replaced => "replaced",
            CatalogOutcome::Touched => "touched",
            CatalogOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug)]
pub enum CatalogPlan {
    Replace { catalog: Catalog, duplicates_dropped: usize },
    Touch(Catalog),
    Skip,
}

impl CatalogPlan {
    pub fn outcome(&self) -> CatalogOutcome {
        match self {
            CatalogPlan::Replace { .. } => CatalogOutcome::Replaced,
            CatalogPlan::Touch(_) => CatalogOutcome::Touched,
            CatalogPlan::Skip => CatalogOutcome::Skipped,
        }
    }
}

/// Without fresh records the stored events are never replaced; an unreadable
/// catalog is left alone entirely so it can be recovered by hand.
pub fn plan_catalog(
    prior: PriorCatalog,
    fresh: Vec<EventRecord>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> CatalogPlan {
    if fresh.is_empty() {
        return match prior {
            PriorCatalog::Loaded(stored) => CatalogPlan::Touch(Catalog::new(now, stored.events)),
            PriorCatalog::Missing => CatalogPlan::Touch(Catalog::new(now, Vec::new())),
            PriorCatalog::Unreadable => CatalogPlan::Skip,
        };
    }

    let existing = match prior {
        PriorCatalog::Loaded(stored) => stored.events,
        PriorCatalog::Missing | PriorCatalog::Unreadable => Vec::new(),
    };
    let merged = merge_with_catalog(existing, fresh);
    CatalogPlan::Replace {
        catalog: Catalog::new(now, upcoming(merged.events, today)),
        duplicates_dropped: merged.duplicates_dropped,
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub sources: Vec<SourceReport>,
    pub fetched_records: usize,
    pub duplicates_dropped: usize,
    pub retained_events: usize,
    pub outcome: CatalogOutcome,
    pub catalog_hash: Option<String>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ledger_warn(result: Result<impl Sized>, action: &str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, action, "run ledger update failed");
    }
}

/// Only a failed catalog write is fatal.
pub async fn run_ingest<F, S>(
    cfg: &IngestConfig,
    fetcher: &F,
    store: &S,
    ledger: Option<&Connection>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RunSummary>
where
    F: DocumentFetcher,
    S: CatalogStore,
{
    let run_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("ingest_run", run_id = %run_id);

    async move {
        tracing::info!(sources = cfg.sources.len(), %today, "ingest run started");
        if let Some(conn) = ledger {
            ledger_warn(db::start_run(conn, &run_id, &timestamp(now)), "start_run");
        }

        let harvests = collect(fetcher, &cfg.sources, cfg.max_candidates).await;

        let mut reports = Vec::with_capacity(harvests.len());
        let mut fresh = Vec::new();
        for harvest in harvests {
            if let Some(conn) = ledger {
                ledger_warn(db::record_source_fetch(conn, &run_id, &harvest.report), "record_source_fetch");
            }
            fresh.extend(harvest.records);
            reports.push(harvest.report);
        }
        let fetched_records = fresh.len();

        let plan = plan_catalog(PriorCatalog::read(store), fresh, today, now);
        let outcome = plan.outcome();
        let (written, duplicates_dropped) = match plan {
            CatalogPlan::Replace {
                catalog,
                duplicates_dropped,
            } => (Some(catalog), duplicates_dropped),
            CatalogPlan::Touch(catalog) => {
                tracing::info!("no new events found, refreshing timestamp only");
                (Some(catalog), 0)
            }
            CatalogPlan::Skip => {
                tracing::warn!("no new events and stored catalog unreadable, leaving it untouched");
                (None, 0)
            }
        };

        let mut retained_events = 0;
        let mut catalog_hash = None;
        if let Some(catalog) = &written {
            if let Err(e) = store.write_catalog(catalog) {
                tracing::error!(error = %e, "catalog write failed");
                if let Some(conn) = ledger {
                    ledger_warn(
                        db::fail_run(conn, &run_id, fetched_records, &timestamp(Utc::now())),
                        "fail_run",
                    );
                }
                return Err(e);
            }
            retained_events = catalog.events.len();
            catalog_hash = db::catalog_hash(catalog).ok();
        }

        let summary = RunSummary {
            run_id: run_id.clone(),
            sources: reports,
            fetched_records,
            duplicates_dropped,
            retained_events,
            outcome,
            catalog_hash,
        };
        if let Some(conn) = ledger {
            ledger_warn(db::finish_run(conn, &summary, &timestamp(Utc::now())), "finish_run");
        }

        tracing::info!(
            fetched = summary.fetched_records,
            duplicates = summary.duplicates_dropped,
            retained = summary.retained_events,
            outcome = summary.outcome.as_str(),
            "ingest run finished"
        );
        Ok(summary)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JsonCatalogStore;
    use crate::sources::find_source;
    use std::collections::HashMap;

    struct FakeFetcher {
        pages: HashMap<&'static str, &'static str>,
        renders: bool,
    }

    impl FakeFetcher {
        fn new(pages: &[(&'static str, &'static str)]) -> Self {
            Self {
                pages: pages.iter().copied().collect(),
                renders: true,
            }
        }
    }

    impl DocumentFetcher for FakeFetcher {
        fn can_render(&self) -> bool {
            self.renders
        }

        async fn fetch(&self, url: &str, _render_scripts: bool) -> Result<String> {
            self.pages
                .get(url)
                .map(|page| page.to_string())
                .ok_or_else(|| anyhow::anyhow!("{url} returned HTTP 404 Not Found"))
        }
    }

    const MCCC_PAGE: &str = r#"<html><body>
        <div class="event-item">
          <h3>Spring Mixer</h3><span>4/1/2025</span><span>5:30 PM - 7:30 PM</span>
          <div>Location: Silver Spring Civic Building</div>
          <a href="/events/details/spring-mixer">More</a>
        </div>
        <div class="event-item"><h3>Expo</h3><span>4/2/2025</span></div>
        <div class="event-item"><h3>Past Breakfast</h3><span>1/2/2025</span></div>
        <div class="event-item"><h3>Eggs and Issues</h3><span>sometime soon</span></div>
    </body></html>"#;

    const GGCC_HOME: &str = r#"<html><body>
        <nav><a href="/about">About</a><a href="/events/">Events</a></nav>
    </body></html>"#;

    const GGCC_EVENTS: &str = r#"<html><body>
        <div class="event"><h4>SPRING MIXER</h4><p>April 1, 2025</p></div>
        <div class="event"><h4>Business Expo 2025</h4><p>April 10, 2025</p></div>
    </body></html>"#;

    fn config(keys: &str, data_dir: &std::path::Path) -> IngestConfig {
        let mut cfg = IngestConfig::from_lookup(|_| None);
        cfg.catalog_path = data_dir.join("events-data.json");
        cfg.sources = keys.split(',').filter_map(find_source).collect();
        cfg
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        "2025-03-01T06:00:00Z".parse().unwrap()
    }

    #[test]
    fn extraction_discards_invalid_candidates() {
        let mccc = find_source("mccc").unwrap();
        let out = extract_records(mccc, MCCC_PAGE, 20).unwrap();
        assert_eq!(out.candidates, 4);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rejected, 2);
        let mixer = &out.records[0];
        assert_eq!(mixer.link, "https://web.mcccmd.com/events/details/spring-mixer");
        assert_eq!(mixer.time, "5:30 PM - 7:30 PM");
        assert_eq!(mixer.location, "Silver Spring Civic Building");
        assert_eq!(mixer.chamber, Chamber::MontgomeryCounty);
    }

    #[tokio::test]
    async fn merges_sources_in_order_and_follows_events_link() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc,ggcc", dir.path());
        let store = JsonCatalogStore::new(&cfg.catalog_path);
        let fetcher = FakeFetcher::new(&[
            ("https://web.mcccmd.com/events", MCCC_PAGE),
            ("https://www.ggchamber.org/", GGCC_HOME),
            ("https://www.ggchamber.org/events/", GGCC_EVENTS),
        ]);

        let summary = run_ingest(&cfg, &fetcher, &store, None, day("2025-03-01"), now())
            .await
            .unwrap();
        assert_eq!(summary.outcome, CatalogOutcome::Replaced);
        assert_eq!(summary.fetched_records, 4);
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(summary.sources[1].url, "https://www.ggchamber.org/events/");

        let catalog = store.read_catalog().unwrap().unwrap();
        let got: Vec<_> = catalog
            .events
            .iter()
            .map(|e| (e.title.as_str(), e.chamber))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Spring Mixer", Chamber::MontgomeryCounty),
                ("Business Expo 2025", Chamber::Gaithersburg),
            ]
        );
        assert_eq!(catalog.last_updated, now());
    }

    #[tokio::test]
    async fn zero_new_records_only_refreshes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc", dir.path());
        let store = JsonCatalogStore::new(&cfg.catalog_path);

        let seeded = extract_records(find_source("mccc").unwrap(), MCCC_PAGE, 20).unwrap();
        let before = Catalog::new("2025-02-01T06:00:00Z".parse().unwrap(), seeded.records);
        store.write_catalog(&before).unwrap();

        // every source fails
        let fetcher = FakeFetcher::new(&[]);
        let summary = run_ingest(&cfg, &fetcher, &store, None, day("2025-06-01"), now())
            .await
            .unwrap();
        assert_eq!(summary.outcome, CatalogOutcome::Touched);
        assert!(summary.sources[0].error.is_some());

        let after = store.read_catalog().unwrap().unwrap();
        assert_eq!(after.events, before.events);
        assert_eq!(after.last_updated, now());
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_stored_events() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc", dir.path());
        let store = JsonCatalogStore::new(&cfg.catalog_path);
        let fetcher = FakeFetcher::new(&[("https://web.mcccmd.com/events", MCCC_PAGE)]);

        for _ in 0..2 {
            run_ingest(&cfg, &fetcher, &store, None, day("2025-03-01"), now())
                .await
                .unwrap();
        }
        let catalog = store.read_catalog().unwrap().unwrap();
        assert_eq!(catalog.events.len(), 1);
        assert_eq!(catalog.events[0].title, "Spring Mixer");
    }

    #[tokio::test]
    async fn unreadable_catalog_survives_an_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc", dir.path());
        std::fs::write(&cfg.catalog_path, "{ truncated").unwrap();
        let store = JsonCatalogStore::new(&cfg.catalog_path);

        let summary = run_ingest(&cfg, &FakeFetcher::new(&[]), &store, None, day("2025-03-01"), now())
            .await
            .unwrap();
        assert_eq!(summary.outcome, CatalogOutcome::Skipped);
        assert_eq!(std::fs::read_to_string(&cfg.catalog_path).unwrap(), "{ truncated");
    }

    #[tokio::test]
    async fn runs_are_written_to_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc,ggcc", dir.path());
        let store = JsonCatalogStore::new(&cfg.catalog_path);
        let conn = db::open_db(&dir.path().join("ingest.db")).unwrap();
        db::init_schema(&conn).unwrap();
        let fetcher = FakeFetcher::new(&[("https://web.mcccmd.com/events", MCCC_PAGE)]);

        let summary = run_ingest(&cfg, &fetcher, &store, Some(&conn), day("2025-03-01"), now())
            .await
            .unwrap();

        let run = db::last_run(&conn).unwrap().unwrap();
        assert_eq!(run.run_id, summary.run_id);
        assert_eq!(run.outcome.as_deref(), Some("replaced"));
        assert_eq!(run.catalog_hash, summary.catalog_hash);
        assert_eq!(run.sources.len(), 2);
        assert_eq!(run.sources[0].records, 2);
        assert!(run.sources[1].error.is_some());
    }

    struct ReadOnlyStore;

    impl CatalogStore for ReadOnlyStore {
        fn read_catalog(&self) -> Result<Option<Catalog>> {
            Ok(None)
        }

        fn write_catalog(&self, _catalog: &Catalog) -> Result<()> {
            anyhow::bail!("read-only file system")
        }
    }

    #[tokio::test]
    async fn failed_catalog_write_closes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("mccc", dir.path());
        let conn = db::open_db(&dir.path().join("ingest.db")).unwrap();
        db::init_schema(&conn).unwrap();
        let fetcher = FakeFetcher::new(&[("https://web.mcccmd.com/events", MCCC_PAGE)]);

        let result = run_ingest(&cfg, &fetcher, &ReadOnlyStore, Some(&conn), day("2025-03-01"), now()).await;
        assert!(result.is_err());

        let run = db::last_run(&conn).unwrap().unwrap();
        assert_eq!(run.outcome.as_deref(), Some("failed"));
        assert!(run.finished_at.is_some());
        assert_eq!(run.fetched_records, 2);
        assert_eq!(run.retained_events, 0);
        assert_eq!(run.sources.len(), 1);
    }

    #[test]
    fn card_title_survives_a_separately_wrapped_date() {
        let mdchamber = find_source("mdchamber").unwrap();
        let out = extract_records(
            mdchamber,
            r#"<ul><li><h3>Legislative Summit</h3><div class="when">April 1, 2026</div></li></ul>"#,
            20,
        )
        .unwrap();
        assert_eq!(out.candidates, 1);
        assert_eq!(out.records[0].title, "Legislative Summit");

        let mccc = find_source("mccc").unwrap();
        let out = extract_records(
            mccc,
            r#"<div class="eventcard"><div class="event-title">Spring Networking Mixer</div><div class="event-date">April 1, 2026</div></div>"#,
            20,
        )
        .unwrap();
        assert_eq!(out.candidates, 1);
        assert_eq!(out.records[0].title, "Spring Networking Mixer");
    }

    #[test]
    fn missing_prior_with_no_records_writes_empty_catalog() {
        match plan_catalog(PriorCatalog::Missing, Vec::new(), day("2025-03-01"), now()) {
            CatalogPlan::Touch(catalog) => assert!(catalog.events.is_empty()),
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn fresh_records_are_windowed_with_stored_ones() {
        let mccc = find_source("mccc").unwrap();
        let fresh = extract_records(mccc, MCCC_PAGE, 20).unwrap().records;
        let mut stale = fresh[0].clone();
        stale.title = "Winter Social".to_string();
        stale.date = day("2025-02-01");
        let prior = PriorCatalog::Loaded(Catalog::new(now(), vec![stale]));

        match plan_catalog(prior, fresh, day("2025-03-01"), now()) {
            CatalogPlan::Replace { catalog, duplicates_dropped } => {
                assert_eq!(duplicates_dropped, 0);
                let titles: Vec<_> = catalog.events.iter().map(|e| e.title.as_str()).collect();
                assert_eq!(titles, vec!["Spring Mixer"]);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }
}
