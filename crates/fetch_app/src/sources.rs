use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use fetch_core::{parse_seed_list, SuffixRules, SEED_FILE_TEMPLATE};
use fetch_logging::{fetch_info, fetch_warn};

/// Reads the seed list at `path`, creating it with a commented example when absent.
pub fn load_or_create(path: &Path, rules: &SuffixRules) -> anyhow::Result<Vec<String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("could not create {}", parent.display()))?;
            }
            fs::write(path, SEED_FILE_TEMPLATE)
                .with_context(|| format!("could not create seed file {}", path.display()))?;
            fetch_warn!(
                "Created {:?}. Add listing URLs to it, one per line, and run again.",
                path
            );
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("could not read seed file {}", path.display()))
        }
    };
    let seeds = parse_seed_list(&text, rules);
    fetch_info!("Loaded {} seed location(s) from {:?}", seeds.len(), path);
    Ok(seeds)
}
