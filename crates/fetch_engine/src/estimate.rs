use std::sync::Arc;

use fetch_core::{format_size, AssetReference, InventorySet, SizeEstimate};
use fetch_logging::{fetch_debug, fetch_info};
use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;

/// Sums remote sizes of the items that still need downloading.
pub struct SizeEstimator {
    fetcher: Arc<dyn Fetcher>,
    workers: usize,
}

impl SizeEstimator {
    pub fn new(fetcher: Arc<dyn Fetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }

    /// Items whose stem is already in `inventory` are not probed.
    pub async fn estimate(
        &self,
        items: &[AssetReference],
        inventory: &InventorySet,
        cancel: &CancellationToken,
    ) -> SizeEstimate {
        fetch_info!("Calculating total download size (this may take a moment)...");
        let pending: Vec<&AssetReference> = items
            .iter()
            .filter(|item| !inventory.contains(&item.stem))
            .collect();

        let lengths = stream::iter(pending)
            .map(|item| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                self.remote_length(item).await
            })
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;

        let mut estimate = SizeEstimate::default();
        for length in lengths {
            estimate.probed += 1;
            match length {
                Some(bytes) => estimate.known_bytes = estimate.known_bytes.saturating_add(bytes),
                None => estimate.unknown += 1,
            }
        }
        fetch_info!(
            "Total download size: {} ({} file(s) of unknown size)",
            format_size(estimate.known_bytes),
            estimate.unknown
        );
        estimate
    }

    /// HEAD first; when that yields nothing usable, read the headers of a GET.
    async fn remote_length(&self, item: &AssetReference) -> Option<u64> {
        match self.fetcher.probe_length(&item.url).await {
            Ok(Some(bytes)) => return Some(bytes),
            Ok(None) => {}
            Err(err) => fetch_debug!("HEAD {} failed: {}", item.url, err),
        }
        match self.fetcher.header_length(&item.url).await {
            Ok(length) => length,
            Err(err) => {
                fetch_debug!("[!] Failed to get size for {}: {}", item.url, err);
                None
            }
        }
    }
}
