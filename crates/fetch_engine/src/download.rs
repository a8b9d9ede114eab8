//! Bounded worker pool that fetches assets into staging files and publishes
//! them under their final names.
//!
//! Per item: `Pending -> Fetching -> Verifying -> Published`, with failed
//! attempts going back to `Fetching` until the retry bound is exhausted.
//! Items whose stem is already known are skipped without a request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fetch_core::{AssetReference, Claim};
use fetch_logging::{fetch_debug, fetch_info, fetch_warn};
use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::fetch::{ConnectStrategy, FetchSettings, Fetcher};
use crate::persist::{PersistError, StagingFile};
use crate::{
    EngineEvent, FailureKind, FetchError, ItemOutcome, ProgressSink, RunContext, Stage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Published(PathBuf),
    /// The stem is present locally or was fetched earlier in this run.
    AlreadyPresent,
    Failed { attempts: u32, reason: String },
    /// Abandoned because cancellation was requested; nothing was published.
    Cancelled,
}

pub struct DownloadEngine {
    fetcher: Arc<dyn Fetcher>,
    destination: PathBuf,
    settings: FetchSettings,
    workers: usize,
}

impl DownloadEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        destination: PathBuf,
        settings: FetchSettings,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            destination,
            settings,
            workers: workers.max(1),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Processes the whole work list with at most `workers` items in flight.
    ///
    /// Outcomes are recorded in `ctx` as they complete, in completion order.
    /// After cancellation, queued items are abandoned at their start
    /// checkpoint and in-flight items at their next chunk.
    pub async fn run(&self, items: Vec<AssetReference>, ctx: &RunContext, sink: &dyn ProgressSink) {
        fetch_info!("Starting downloads ({} file(s), {} worker(s))...", items.len(), self.workers);
        sink.emit(EngineEvent::StageStarted {
            stage: Stage::Downloading,
            total: items.len(),
        });

        let mut completions = stream::iter(items)
            .map(|asset| async move {
                let outcome = self.download_one(&asset, ctx, sink).await;
                (asset, outcome)
            })
            .buffer_unordered(self.workers);

        let mut cancelled = 0usize;
        while let Some((asset, outcome)) = completions.next().await {
            let event_outcome = match outcome {
                DownloadOutcome::Published(_) => {
                    ctx.record(|r| r.record_downloaded(asset.name.clone()));
                    ItemOutcome::Downloaded
                }
                DownloadOutcome::AlreadyPresent => {
                    ctx.record(|r| r.record_skipped(asset.name.clone()));
                    ItemOutcome::Skipped
                }
                DownloadOutcome::Failed { reason, .. } => {
                    ctx.record(|r| r.record_failed(asset.name.clone(), reason.clone()));
                    ItemOutcome::Failed { reason }
                }
                DownloadOutcome::Cancelled => {
                    cancelled += 1;
                    continue;
                }
            };
            sink.emit(EngineEvent::ItemFinished {
                stage: Stage::Downloading,
                name: asset.name,
                outcome: event_outcome,
            });
        }

        if cancelled > 0 {
            fetch_warn!("Download cancelled; {} file(s) abandoned.", cancelled);
        }
    }

    /// Runs one item through its retry loop. Never panics and never propagates errors.
    ///
    /// When another worker holds the same stem, this waits for that fetch to
    /// settle: a completed fetch turns this item into a skip, a released one
    /// lets this item try its own locator.
    pub async fn download_one(
        &self,
        asset: &AssetReference,
        ctx: &RunContext,
        sink: &dyn ProgressSink,
    ) -> DownloadOutcome {
        loop {
            if ctx.is_cancelled() {
                return DownloadOutcome::Cancelled;
            }
            let settled = ctx.claim_settled();
            tokio::pin!(settled);
            settled.as_mut().enable();
            match ctx.inventory().claim(&asset.stem) {
                Claim::Present => {
                    fetch_debug!("{}: already present, skipping", asset.name);
                    return DownloadOutcome::AlreadyPresent;
                }
                Claim::Acquired => break,
                Claim::InFlight => {
                    fetch_debug!("{}: same asset is being fetched by another worker, waiting", asset.name);
                    tokio::select! {
                        biased;
                        _ = ctx.token().cancelled() => return DownloadOutcome::Cancelled,
                        _ = settled => {}
                    }
                }
            }
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error: Option<FetchError> = None;
        for attempt in 1..=max_attempts {
            if ctx.is_cancelled() {
                ctx.release_claim(&asset.stem);
                return DownloadOutcome::Cancelled;
            }
            let strategy = self.settings.strategy_for(attempt);
            match self.attempt(asset, strategy, ctx.token(), sink).await {
                Ok(path) => {
                    ctx.complete_claim(&asset.stem);
                    fetch_info!("Downloaded {}", asset.name);
                    return DownloadOutcome::Published(path);
                }
                Err(err) if err.is_cancelled() => {
                    ctx.release_claim(&asset.stem);
                    return DownloadOutcome::Cancelled;
                }
                Err(err) => {
                    fetch_warn!(
                        "[Retry {}/{}] {} via {} failed: {}",
                        attempt,
                        max_attempts,
                        asset.name,
                        strategy,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        ctx.release_claim(&asset.stem);
        let reason = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        fetch_warn!(
            "[!] Failed to download {} after {} attempts: {}",
            asset.name,
            max_attempts,
            reason
        );
        DownloadOutcome::Failed {
            attempts: max_attempts,
            reason,
        }
    }

    /// One fetch: stream into a staging file, verify length, publish.
    ///
    /// On any error the staging file is removed before returning.
    async fn attempt(
        &self,
        asset: &AssetReference,
        strategy: ConnectStrategy,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, FetchError> {
        let mut body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::cancelled()),
            opened = self.fetcher.open(&asset.url, strategy) => opened?,
        };
        let mut staging = StagingFile::create(&self.destination, &asset.name).map_err(persist_error)?;
        sink.emit(EngineEvent::TransferStarted {
            name: asset.name.clone(),
            total: body.expected_len,
        });

        let transfer = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::cancelled()),
                    next = body.chunks.next() => next,
                };
                match next {
                    None => return Ok::<(), FetchError>(()),
                    Some(Ok(chunk)) => {
                        staging.write_chunk(&chunk).await.map_err(persist_error)?;
                        sink.emit(EngineEvent::TransferProgress {
                            name: asset.name.clone(),
                            bytes: chunk.len() as u64,
                        });
                    }
                    Some(Err(err)) => {
                        return Err(truncated_body(err, body.expected_len, staging.written()))
                    }
                }
            }
        };
        let transferred = transfer.await;
        let result = transferred.and_then(|()| {
            verify_length(body.expected_len, staging.written())?;
            if cancel.is_cancelled() {
                return Err(FetchError::cancelled());
            }
            Ok(())
        });

        if let Err(err) = result {
            let staged = staging.path().to_path_buf();
            if let Err(cleanup) = staging.discard() {
                fetch_debug!("Could not remove staging file {:?}: {}", staged, cleanup);
            }
            return Err(err);
        }
        staging.publish().await.map_err(persist_error)
    }
}

fn verify_length(expected: Option<u64>, actual: u64) -> Result<(), FetchError> {
    match expected {
        Some(expected) if expected != actual => Err(FetchError::new(
            FailureKind::SizeMismatch { expected, actual },
            "incomplete download",
        )),
        _ => Ok(()),
    }
}

// A body that breaks off before the announced length is an incomplete download.
fn truncated_body(err: FetchError, expected: Option<u64>, written: u64) -> FetchError {
    match expected {
        Some(expected) if written < expected && err.kind != FailureKind::Timeout => FetchError::new(
            FailureKind::SizeMismatch {
                expected,
                actual: written,
            },
            format!("incomplete download ({})", err.message),
        ),
        _ => err,
    }
}

fn persist_error(err: PersistError) -> FetchError {
    FetchError::new(FailureKind::Io, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_check_only_applies_when_announced() {
        assert!(verify_length(None, 10).is_ok());
        assert!(verify_length(Some(10), 10).is_ok());
        let err = verify_length(Some(1000), 900).unwrap_err();
        assert_eq!(
            err.kind,
            FailureKind::SizeMismatch {
                expected: 1000,
                actual: 900
            }
        );
    }

    #[test]
    fn stream_errors_before_announced_length_become_size_mismatch() {
        let err = FetchError::new(FailureKind::Network, "connection closed");
        let mapped = truncated_body(err.clone(), Some(1000), 900);
        assert!(matches!(mapped.kind, FailureKind::SizeMismatch { .. }));
        assert_eq!(truncated_body(err.clone(), None, 900), err);

        let timeout = FetchError::new(FailureKind::Timeout, "read timed out");
        assert_eq!(truncated_body(timeout.clone(), Some(1000), 900), timeout);
    }
}
