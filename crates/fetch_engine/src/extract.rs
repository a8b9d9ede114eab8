//! Decompression of downloaded archives into sibling files.
//!
//! Each archive is copied block by block through a streaming decoder into a
//! staging file that is renamed onto the sibling name once complete.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use fetch_core::SuffixRules;
use fetch_logging::{fetch_debug, fetch_info, fetch_warn};
use flate2::read::MultiGzDecoder;
use futures_util::{stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::fetch::DEFAULT_MAX_ATTEMPTS;
use crate::persist::{is_staging_name, staging_file_in};
use crate::{EngineEvent, ItemOutcome, ProgressSink, RunContext, Stage};

const COPY_BLOCK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("extraction cancelled")]
    Cancelled,
    #[error("extraction task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Bzip2,
    Gzip,
}

impl Codec {
    fn for_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".bz2") || lower.ends_with(".tbz2") {
            Some(Codec::Bzip2)
        } else if lower.ends_with(".gz") || lower.ends_with(".tgz") {
            Some(Codec::Gzip)
        } else {
            None
        }
    }

    fn decoder(self, input: BufReader<File>) -> Box<dyn Read> {
        match self {
            Codec::Bzip2 => Box::new(MultiBzDecoder::new(input)),
            Codec::Gzip => Box::new(MultiGzDecoder::new(input)),
        }
    }
}

/// Decompresses `archive` into `target` and returns the number of bytes written.
///
/// `target` only appears once the whole stream has been decoded; on any
/// error the partial output is removed.
pub fn decompress_archive(
    archive: &Path,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<u64, ExtractError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let codec = Codec::for_name(name).ok_or_else(|| ExtractError::UnsupportedFormat(name.to_string()))?;
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let target_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExtractError::Io(io::Error::new(io::ErrorKind::InvalidInput, "invalid target name")))?;

    let mut reader = codec.decoder(BufReader::new(File::open(archive)?));
    let mut staging = staging_file_in(dir, target_name)?;
    let mut block = vec![0u8; COPY_BLOCK];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let read = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        staging.write_all(&block[..read])?;
        written += read as u64;
    }
    staging.flush()?;
    staging.as_file_mut().sync_all()?;
    staging.persist(target).map_err(|e| ExtractError::Io(e.error))?;
    Ok(written)
}

/// Second worker pool: decompresses every archive in the destination directory.
pub struct ExtractionEngine {
    destination: PathBuf,
    rules: SuffixRules,
    workers: usize,
    max_attempts: u32,
    delete_archives: bool,
}

impl ExtractionEngine {
    pub fn new(destination: PathBuf, rules: SuffixRules, workers: usize) -> Self {
        Self {
            destination,
            rules,
            workers: workers.max(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delete_archives: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn delete_archives(mut self, enabled: bool) -> Self {
        self.delete_archives = enabled;
        self
    }

    /// Archives directly inside the destination whose decompressed sibling
    /// does not exist yet, sorted by name.
    pub fn pending_archives(&self) -> io::Result<Vec<PathBuf>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.destination)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_staging_name(&name) {
                continue;
            }
            let Some(sibling) = self.rules.strip_archive_suffix(&name) else {
                continue;
            };
            if self.destination.join(sibling).exists() {
                fetch_debug!("{}: already decompressed, skipping", name);
                continue;
            }
            archives.push(entry.path());
        }
        archives.sort();
        Ok(archives)
    }

    pub async fn run(&self, ctx: &RunContext, sink: &dyn ProgressSink) {
        if ctx.is_cancelled() {
            fetch_info!("Cancellation requested; skipping extraction.");
            return;
        }
        let archives = match self.pending_archives() {
            Ok(archives) => archives,
            Err(err) => {
                fetch_warn!("[!] Could not list archives in {:?}: {}", self.destination, err);
                return;
            }
        };
        if archives.is_empty() {
            fetch_info!("No archives to extract.");
            return;
        }

        fetch_info!("Extracting {} archive(s)...", archives.len());
        sink.emit(EngineEvent::StageStarted {
            stage: Stage::Extracting,
            total: archives.len(),
        });
        let (archives, unsupported): (Vec<PathBuf>, Vec<PathBuf>) = archives
            .into_iter()
            .partition(|archive| Codec::for_name(&file_name(archive)).is_some());
        self.reject_unsupported(unsupported, ctx, sink);

        let mut completions = stream::iter(archives)
            .map(|archive| async move {
                let outcome = self.extract_with_retry(&archive, ctx.token()).await;
                (archive, outcome)
            })
            .buffer_unordered(self.workers);

        let mut extracted = Vec::new();
        while let Some((archive, outcome)) = completions.next().await {
            let archive_name = file_name(&archive);
            match outcome {
                Ok(target) => {
                    let target_name = file_name(&target);
                    ctx.inventory().insert(&self.rules.stem(&target_name));
                    ctx.record(|r| r.record_extracted(target_name.clone()));
                    sink.emit(EngineEvent::ItemFinished {
                        stage: Stage::Extracting,
                        name: target_name,
                        outcome: ItemOutcome::Extracted,
                    });
                    extracted.push(archive);
                }
                Err(ExtractError::Cancelled) => {}
                Err(err) => {
                    let reason = err.to_string();
                    fetch_warn!("[!] Failed to extract {}: {}", archive_name, reason);
                    ctx.record(|r| r.record_failed_extraction(archive_name.clone(), reason.clone()));
                    sink.emit(EngineEvent::ItemFinished {
                        stage: Stage::Extracting,
                        name: archive_name,
                        outcome: ItemOutcome::ExtractionFailed { reason },
                    });
                }
            }
        }

        if self.delete_archives && !extracted.is_empty() {
            self.delete(extracted, ctx, sink);
        }
    }

    // Archives without a decoder fail once, with a single warning per suffix.
    fn reject_unsupported(&self, archives: Vec<PathBuf>, ctx: &RunContext, sink: &dyn ProgressSink) {
        if archives.is_empty() {
            return;
        }
        let mut suffixes = BTreeSet::new();
        for archive in &archives {
            let name = file_name(archive);
            let sibling_len = self.rules.strip_archive_suffix(&name).map_or(0, str::len);
            suffixes.insert(name[sibling_len..].to_ascii_lowercase());
        }
        fetch_warn!(
            "[!] No decoder for {} archive(s) with suffix {}; only .bz2 and .gz are supported.",
            archives.len(),
            suffixes.into_iter().collect::<Vec<_>>().join(", ")
        );
        for archive in archives {
            let name = file_name(&archive);
            let reason = ExtractError::UnsupportedFormat(name.clone()).to_string();
            ctx.record(|r| r.record_failed_extraction(name.clone(), reason.clone()));
            sink.emit(EngineEvent::ItemFinished {
                stage: Stage::Extracting,
                name,
                outcome: ItemOutcome::ExtractionFailed { reason },
            });
        }
    }

    /// Attempts are silent; only the last error is returned.
    async fn extract_with_retry(
        &self,
        archive: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ExtractError> {
        let name = file_name(archive);
        let sibling = self
            .rules
            .strip_archive_suffix(&name)
            .ok_or_else(|| ExtractError::UnsupportedFormat(name.clone()))?;
        let target = self.destination.join(sibling);

        let mut last_error = ExtractError::Cancelled;
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }
            let source = archive.to_path_buf();
            let output = target.clone();
            let token = cancel.clone();
            let result = tokio::task::spawn_blocking(move || decompress_archive(&source, &output, &token))
                .await
                .unwrap_or_else(|join| Err(ExtractError::Task(join.to_string())));
            match result {
                Ok(bytes) => {
                    fetch_info!("Extracted {} ({} bytes)", sibling, bytes);
                    return Ok(target);
                }
                Err(err @ (ExtractError::Cancelled | ExtractError::UnsupportedFormat(_))) => return Err(err),
                Err(err) => {
                    fetch_debug!("Extraction attempt {}/{} for {} failed: {}", attempt, self.max_attempts, name, err);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn delete(&self, archives: Vec<PathBuf>, ctx: &RunContext, sink: &dyn ProgressSink) {
        sink.emit(EngineEvent::StageStarted {
            stage: Stage::Deleting,
            total: archives.len(),
        });
        for archive in archives {
            let name = file_name(&archive);
            let outcome = match fs::remove_file(&archive) {
                Ok(()) => {
                    fetch_debug!("Deleted {}", name);
                    ctx.record(|r| r.record_deleted(name.clone()));
                    ItemOutcome::Deleted
                }
                Err(err) => {
                    let reason = err.to_string();
                    fetch_warn!("[!] Failed to delete {}: {}", name, reason);
                    ctx.record(|r| r.record_failed_deletion(name.clone(), reason.clone()));
                    ItemOutcome::DeletionFailed { reason }
                }
            };
            sink.emit(EngineEvent::ItemFinished {
                stage: Stage::Deleting,
                name,
                outcome,
            });
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
