use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use fetch_core::{AssetReference, SuffixRules};
use fetch_logging::{fetch_debug, fetch_info, fetch_warn};
use futures_util::{stream, StreamExt};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::decode::decode_html;
use crate::fetch::Fetcher;
use crate::listing::{EntryKind, ListingParser};

/// Number of seeds enumerated at once for a given worker count.
pub fn enumeration_fan_out(workers: usize) -> usize {
    (workers / 2).max(2)
}

/// Keeps the seeds that answer with a success or redirect status.
pub async fn validate_seeds(fetcher: &dyn Fetcher, seeds: &[Url], fan_out: usize) -> Vec<Url> {
    fetch_info!("Validating {} seed location(s)...", seeds.len());
    let checks = stream::iter(seeds.iter().cloned())
        .map(|seed| async move {
            match fetcher.check_reachable(&seed).await {
                Ok(status) if is_reachable(status) => Some(seed),
                Ok(status) => {
                    fetch_warn!("[!] Seed check failed: {} (HTTP {})", seed, status.as_u16());
                    None
                }
                Err(err) => {
                    fetch_warn!("[!] Seed check failed: {} ({})", seed, err);
                    None
                }
            }
        })
        .buffered(fan_out.max(1))
        .collect::<Vec<_>>()
        .await;
    let valid: Vec<Url> = checks.into_iter().flatten().collect();
    fetch_info!("Validated {} seed location(s).", valid.len());
    valid
}

fn is_reachable(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND
}

/// Discovers asset references below a set of seed locations.
pub struct SourceEnumerator {
    fetcher: Arc<dyn Fetcher>,
    parser: ListingParser,
    recursive: bool,
    fan_out: usize,
}

impl SourceEnumerator {
    pub fn new(fetcher: Arc<dyn Fetcher>, rules: SuffixRules, recursive: bool, fan_out: usize) -> Self {
        Self {
            fetcher,
            parser: ListingParser::new(rules),
            recursive,
            fan_out: fan_out.max(1),
        }
    }

    fn rules(&self) -> &SuffixRules {
        self.parser.rules()
    }

    /// Enumerates all seeds concurrently and merges the results, keeping
    /// the first occurrence of each locator in seed order.
    pub async fn enumerate(&self, seeds: &[Url], cancel: &CancellationToken) -> Vec<AssetReference> {
        let per_seed = stream::iter(seeds.iter())
            .map(|seed| self.enumerate_seed(seed, cancel))
            .buffered(self.fan_out)
            .collect::<Vec<_>>()
            .await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for asset in per_seed.into_iter().flatten() {
            if seen.insert(asset.url.as_str().to_string()) {
                merged.push(asset);
            }
        }
        fetch_info!("Discovered {} candidate file(s) across {} seed(s).", merged.len(), seeds.len());
        merged
    }

    /// Breadth-first walk from one seed. A direct file seed is returned as is.
    pub async fn enumerate_seed(&self, seed: &Url, cancel: &CancellationToken) -> Vec<AssetReference> {
        if !seed.path().ends_with('/') {
            if let Some(asset) = AssetReference::from_url(seed.clone(), self.rules()) {
                return vec![asset];
            }
        }

        let mut frontier = VecDeque::from([seed.clone()]);
        let mut visited = HashSet::from([seed.as_str().to_string()]);
        let mut files = Vec::new();
        let mut seen_files = HashSet::new();

        while let Some(listing) = frontier.pop_front() {
            if cancel.is_cancelled() {
                fetch_debug!("Enumeration of {} stopped by cancellation", seed);
                break;
            }
            let page = match self.fetcher.fetch_page(&listing).await {
                Ok(page) => page,
                Err(err) => {
                    fetch_warn!("[!] Failed to fetch {}: {}", listing, err);
                    continue;
                }
            };
            let decoded = decode_html(&page.body, page.content_type.as_deref(), Some(&listing));
            if decoded.lossy {
                fetch_debug!("Listing {} decoded lossily as {}", listing, decoded.encoding_label);
            }

            let mut found = 0usize;
            for entry in self.parser.parse(&decoded.html, &listing) {
                match entry.kind {
                    EntryKind::File => {
                        if !seen_files.insert(entry.url.as_str().to_string()) {
                            continue;
                        }
                        if let Some(asset) = AssetReference::from_url(entry.url, self.rules()) {
                            found += 1;
                            files.push(asset);
                        }
                    }
                    EntryKind::Directory => {
                        if self.recursive
                            && within_subtree(seed, &entry.url)
                            && visited.insert(entry.url.as_str().to_string())
                        {
                            frontier.push_back(entry.url);
                        }
                    }
                }
            }
            fetch_info!("[+] Found {} file(s) at {}", found, listing);
        }
        files
    }
}

/// Same scheme, host and port as `seed`, and a path below the seed's path.
fn within_subtree(seed: &Url, candidate: &Url) -> bool {
    seed.scheme() == candidate.scheme()
        && seed.host_str() == candidate.host_str()
        && seed.port_or_known_default() == candidate.port_or_known_default()
        && candidate.path().starts_with(seed.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_requires_same_origin_and_prefix() {
        let seed = Url::parse("http://host/maps/").unwrap();
        let child = Url::parse("http://host/maps/dm/").unwrap();
        let parent = Url::parse("http://host/").unwrap();
        let sibling = Url::parse("http://host/mapsx/").unwrap();
        let other_host = Url::parse("http://mirror/maps/dm/").unwrap();
        let other_scheme = Url::parse("https://host/maps/dm/").unwrap();

        assert!(within_subtree(&seed, &child));
        assert!(!within_subtree(&seed, &parent));
        assert!(!within_subtree(&seed, &sibling));
        assert!(!within_subtree(&seed, &other_host));
        assert!(!within_subtree(&seed, &other_scheme));
    }

    #[test]
    fn fan_out_has_a_floor_of_two() {
        assert_eq!(enumeration_fan_out(1), 2);
        assert_eq!(enumeration_fan_out(3), 2);
        assert_eq!(enumeration_fan_out(16), 8);
    }
}
