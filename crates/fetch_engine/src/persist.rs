use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempPath};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Suffix carried by every in-progress file; such files are never final.
pub const STAGING_SUFFIX: &str = ".part";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    Ok(())
}

pub fn available_space(dir: &Path) -> Result<u64, PersistError> {
    Ok(fs2::available_space(dir)?)
}

pub fn is_staging_name(name: &str) -> bool {
    name.ends_with(STAGING_SUFFIX)
}

/// Uniquely named staging file next to `final_name`, e.g. `map.bsp.a1b2c3.part`.
pub(crate) fn staging_file_in(dir: &Path, final_name: &str) -> io::Result<NamedTempFile> {
    Builder::new()
        .prefix(&format!("{final_name}."))
        .suffix(STAGING_SUFFIX)
        .tempfile_in(dir)
}

/// Streamed download target that only appears under its final name on `publish`.
///
/// Dropping it without publishing deletes the staging file.
pub struct StagingFile {
    file: tokio::fs::File,
    path: TempPath,
    target: PathBuf,
    written: u64,
}

impl StagingFile {
    pub fn create(dir: &Path, final_name: &str) -> Result<Self, PersistError> {
        let (file, path) = staging_file_in(dir, final_name)?.into_parts();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
            target: dir.join(final_name),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), PersistError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes and renames onto the final name in one step.
    pub async fn publish(mut self) -> Result<PathBuf, PersistError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        let Self { file, path, target, .. } = self;
        drop(file);
        path.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// Removes the staging file now instead of on drop.
    pub fn discard(self) -> Result<(), PersistError> {
        let Self { file, path, .. } = self;
        drop(file);
        path.close()?;
        Ok(())
    }
}

/// Atomically write content to `{dir}/{filename}` by writing a temp file then renaming.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = staging_file_in(&self.dir, filename)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
