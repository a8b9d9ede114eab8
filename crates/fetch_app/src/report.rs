use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use fetch_engine::{AtomicFileWriter, PersistError};

pub fn report_file_name(started: &DateTime<Local>) -> String {
    format!("download_summary_{}.txt", started.format("%Y%m%d_%H%M%S"))
}

/// Log transcript followed by the summary block.
pub fn compose_report(transcript: &str, summary: &str) -> String {
    let mut report = String::with_capacity(transcript.len() + summary.len() + 1);
    report.push_str(transcript);
    if !transcript.is_empty() && !transcript.ends_with('\n') {
        report.push('\n');
    }
    report.push_str(summary);
    report
}

pub fn write_report(
    dir: &Path,
    started: &DateTime<Local>,
    transcript: &str,
    summary: &str,
) -> Result<PathBuf, PersistError> {
    AtomicFileWriter::new(dir.to_path_buf())
        .write(&report_file_name(started), &compose_report(transcript, summary))
}
