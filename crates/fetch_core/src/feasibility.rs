pub const GIB: u64 = 1024 * 1024 * 1024;

/// Free space that should remain after a download before a warning is issued.
pub const LOW_HEADROOM_BYTES: u64 = 100 * GIB;
/// Candidate count at which the caller must confirm before downloading.
pub const CONFIRM_ITEM_THRESHOLD: usize = 100;
/// Known byte total at which the caller must confirm before downloading.
pub const CONFIRM_BYTES_THRESHOLD: u64 = 10 * GIB;

/// Aggregate of remote size probes. Unknown-size items contribute zero bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    pub known_bytes: u64,
    pub unknown: usize,
    pub probed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskVerdict {
    /// Hard stop: the known bytes do not fit.
    Insufficient { required: u64, available: u64 },
    /// The download fits but leaves less than [`LOW_HEADROOM_BYTES`].
    LowHeadroom { remaining: u64 },
    Sufficient,
}

pub fn assess_disk_space(available: u64, required: u64) -> DiskVerdict {
    if available < required {
        return DiskVerdict::Insufficient {
            required,
            available,
        };
    }
    let remaining = available - required;
    if available > 0 && remaining < LOW_HEADROOM_BYTES {
        DiskVerdict::LowHeadroom { remaining }
    } else {
        DiskVerdict::Sufficient
    }
}

/// Reasons the caller should ask for confirmation; empty when none apply.
pub fn large_download_warnings(count: usize, known_bytes: u64) -> Vec<String> {
    let mut warnings = Vec::new();
    if count >= CONFIRM_ITEM_THRESHOLD {
        warnings.push(format!("You are about to download {count} files."));
    }
    if known_bytes >= CONFIRM_BYTES_THRESHOLD {
        warnings.push(format!(
            "Total download size exceeds {}: {}.",
            format_size(CONFIRM_BYTES_THRESHOLD),
            format_size(known_bytes)
        ));
    }
    warnings
}

/// Human readable size with two decimals, 1024 based.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}
