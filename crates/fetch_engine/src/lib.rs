//! Fetch engine: network transport, listing discovery and the download/extraction pipeline.
mod context;
mod decode;
mod download;
mod enumerate;
mod estimate;
mod extract;
mod fetch;
mod inventory;
mod listing;
mod persist;
mod pipeline;
mod types;

pub use context::{NullProgressSink, ProgressSink, RunContext};
pub use decode::{decode_html, DecodedHtml};
pub use download::{DownloadEngine, DownloadOutcome};
pub use enumerate::{enumeration_fan_out, validate_seeds, SourceEnumerator};
pub use estimate::SizeEstimator;
pub use extract::{decompress_archive, ExtractError, ExtractionEngine};
pub use fetch::{
    BodyStream, ConnectStrategy, FetchSettings, Fetcher, Page, ReqwestFetcher,
    DEFAULT_MAX_ATTEMPTS,
};
pub use inventory::scan_inventory;
pub use listing::{EntryKind, ListingEntry, ListingParser};
pub use persist::{
    available_space, ensure_output_dir, is_staging_name, AtomicFileWriter, PersistError,
    StagingFile, STAGING_SUFFIX,
};
pub use pipeline::{default_worker_count, EngineConfig, Pipeline, PipelineError, RunPlan};
pub use types::{EngineEvent, FailureKind, FetchError, ItemOutcome, Stage};
