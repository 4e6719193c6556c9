pub mod assembler;
pub mod catalog;
pub mod config;
pub mod dates;
pub mod db;
pub mod extractor;
pub mod fetcher;
pub mod locator;
pub mod merge;
pub mod pipeline;
pub mod sources;
pub mod text;
pub mod window;

pub use assembler::{assemble, Rejection};
pub use catalog::{CatalogStore, JsonCatalogStore, CATALOG_FILE};
pub use config::IngestConfig;
pub use dates::{canonical_date, normalize_date};
pub use db::{catalog_hash, init_schema, last_run, open_db};
pub use extractor::{ExtractedFields, FieldExtractor};
pub use fetcher::{DocumentFetcher, HttpFetcher};
pub use locator::{CandidateLocator, RawCandidate};
pub use merge::{merge_with_catalog, MergeOutcome, SeenKeys};
pub use pipeline::{extract_records, run_ingest, CatalogOutcome, RunSummary, SourceReport};
pub use sources::{find_source, SourceSpec, SOURCES};
pub use window::upcoming;
