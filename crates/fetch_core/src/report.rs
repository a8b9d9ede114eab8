use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub reason: String,
}

/// Everything a run did, accumulated append-only by the pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<ItemFailure>,
    pub extracted: Vec<String>,
    pub failed_extractions: Vec<ItemFailure>,
    pub deleted: Vec<String>,
    pub failed_deletions: Vec<ItemFailure>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_downloaded(&mut self, name: impl Into<String>) {
        self.downloaded.push(name.into());
    }

    pub fn record_skipped(&mut self, name: impl Into<String>) {
        self.skipped.push(name.into());
    }

    pub fn record_failed(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        push_failure(&mut self.failed, name.into(), reason.into());
    }

    pub fn record_extracted(&mut self, name: impl Into<String>) {
        self.extracted.push(name.into());
    }

    pub fn record_failed_extraction(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        push_failure(&mut self.failed_extractions, name.into(), reason.into());
    }

    pub fn record_deleted(&mut self, name: impl Into<String>) {
        self.deleted.push(name.into());
    }

    pub fn record_failed_deletion(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        push_failure(&mut self.failed_deletions, name.into(), reason.into());
    }

    pub fn has_failures(&self) -> bool {
        !(self.failed.is_empty() && self.failed_extractions.is_empty() && self.failed_deletions.is_empty())
    }
}

// Keyed by name: a later failure for the same name replaces the earlier reason.
fn push_failure(list: &mut Vec<ItemFailure>, name: String, reason: String) {
    if let Some(existing) = list.iter_mut().find(|f| f.name == name) {
        existing.reason = reason;
    } else {
        list.push(ItemFailure { name, reason });
    }
}

/// Renders the end-of-run summary: fixed-order counters, then an error log
/// only when something failed.
pub fn render_summary(result: &RunResult, workers: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "========= SUMMARY =========");
    let _ = writeln!(out, "Downloaded successfully: {}", result.downloaded.len());
    let _ = writeln!(out, "Skipped (already exists): {}", result.skipped.len());
    let _ = writeln!(out, "Failed downloads: {}", result.failed.len());
    let _ = writeln!(out, "Extracted archives: {}", result.extracted.len());
    let _ = writeln!(out, "Failed extractions: {}", result.failed_extractions.len());
    let _ = writeln!(out, "Deleted archives: {}", result.deleted.len());
    let _ = writeln!(out, "Failed deletions: {}", result.failed_deletions.len());
    let _ = writeln!(out, "Workers used: {workers}");
    out.push_str("===========================");

    if result.has_failures() {
        out.push_str("\n\n=== Error log ===");
        write_section(&mut out, "Downloads", "Download failed", &result.failed);
        write_section(&mut out, "Extractions", "Extraction failed", &result.failed_extractions);
        write_section(&mut out, "Deletions", "Deletion failed", &result.failed_deletions);
    }
    out
}

fn write_section(out: &mut String, title: &str, label: &str, failures: &[ItemFailure]) {
    if failures.is_empty() {
        return;
    }
    let _ = write!(out, "\n\n{title}:");
    for failure in failures {
        let _ = write!(out, "\n - {} ===> {label}: {}", failure.name, failure.reason);
    }
}
