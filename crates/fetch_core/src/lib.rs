//! Fetch core: pure naming, filtering and reporting logic shared by the engine and the app.
mod asset;
mod feasibility;
mod filter;
mod inventory;
mod report;
mod seeds;

pub use asset::{local_name, AssetReference, SuffixRules};
pub use feasibility::{
    assess_disk_space, format_size, large_download_warnings, DiskVerdict, SizeEstimate,
    CONFIRM_BYTES_THRESHOLD, CONFIRM_ITEM_THRESHOLD, GIB, LOW_HEADROOM_BYTES,
};
pub use filter::{apply_filters, parse_keywords, FilterDecision, FilterOutcome, FilterSpec};
pub use inventory::{Claim, InventorySet};
pub use report::{render_summary, ItemFailure, RunResult};
pub use seeds::{normalize_seed, parse_seed_list, SEED_COMMENT_MARKER, SEED_FILE_TEMPLATE};
