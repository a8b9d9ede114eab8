use std::path::PathBuf;

use fetch_core::SuffixRules;
use fetch_logging::{fetch_debug, fetch_info};
use walkdir::WalkDir;

use crate::persist::is_staging_name;

/// Walks every root recursively and returns the stems of recognized asset files.
///
/// Missing roots are skipped. Staging files are ignored since they never
/// represent a complete asset.
pub fn scan_inventory(roots: &[PathBuf], rules: &SuffixRules) -> Vec<String> {
    fetch_info!("Scanning existing files...");
    let mut stems = Vec::new();
    for root in roots {
        if !root.is_dir() {
            fetch_debug!("Inventory root {:?} does not exist, skipping", root);
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if is_staging_name(name) || !rules.is_recognized(name) {
                continue;
            }
            stems.push(rules.stem(name));
        }
    }
    stems.sort();
    stems.dedup();
    fetch_info!("Found {} existing asset stem(s).", stems.len());
    stems
}
