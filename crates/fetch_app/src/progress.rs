//! Terminal progress bars: one overall bar per stage plus one byte bar per
//! file transfer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fetch_engine::{EngineEvent, ItemOutcome, ProgressSink, Stage};
use fetch_logging::{fetch_debug, fetch_info};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const OVERALL_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}";
const TRANSFER_TEMPLATE: &str =
    "  {spinner:.blue} {wide_msg} [{bar:30.white/dim}] {bytes}/{total_bytes} {bytes_per_sec}";
const UNSIZED_TEMPLATE: &str = "  {spinner:.blue} {wide_msg} {bytes} {bytes_per_sec}";

#[derive(Default)]
struct Bars {
    overall: Option<ProgressBar>,
    transfers: HashMap<String, ProgressBar>,
}

pub struct BarProgress {
    multi: MultiProgress,
    bars: Mutex<Bars>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(Bars::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bars> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes every bar, e.g. before prompting on the terminal.
    pub fn clear(&self) {
        let mut bars = self.lock();
        for (_, bar) in bars.transfers.drain() {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if let Some(overall) = bars.overall.take() {
            overall.finish_and_clear();
            self.multi.remove(&overall);
        }
    }

    fn start_stage(&self, stage: Stage, total: usize) {
        self.clear();
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(style(OVERALL_TEMPLATE));
        bar.set_prefix(stage_label(stage));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.lock().overall = Some(bar);
        fetch_debug!("{} stage started ({} item(s))", stage_label(stage), total);
    }

    fn start_transfer(&self, name: String, total: Option<u64>) {
        let mut bars = self.lock();
        // A retry restarts the bar of the same file.
        if let Some(previous) = bars.transfers.remove(&name) {
            previous.finish_and_clear();
            self.multi.remove(&previous);
        }
        let bar = match total {
            Some(total) => ProgressBar::new(total).with_style(style(TRANSFER_TEMPLATE)),
            None => ProgressBar::no_length().with_style(style(UNSIZED_TEMPLATE)),
        };
        let bar = match &bars.overall {
            Some(overall) => self.multi.insert_before(overall, bar),
            None => self.multi.add(bar),
        };
        bar.set_message(name.clone());
        bars.transfers.insert(name, bar);
    }

    fn advance_transfer(&self, name: &str, bytes: u64) {
        if let Some(bar) = self.lock().transfers.get(name) {
            bar.inc(bytes);
        }
    }

    fn finish_item(&self, stage: Stage, name: String, outcome: ItemOutcome) {
        let mut bars = self.lock();
        if let Some(bar) = bars.transfers.remove(&name) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        let (done, total) = match &bars.overall {
            Some(overall) => {
                overall.inc(1);
                overall.set_message(name.clone());
                (overall.position(), overall.length().unwrap_or_default())
            }
            None => (0, 0),
        };
        drop(bars);
        self.multi.suspend(|| {
            fetch_info!(
                "{} [{}/{}] {}: {}",
                stage_label(stage),
                done,
                total,
                name,
                outcome_label(&outcome)
            );
        });
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::StageStarted { stage, total } => self.start_stage(stage, total),
            EngineEvent::TransferStarted { name, total } => self.start_transfer(name, total),
            EngineEvent::TransferProgress { name, bytes } => self.advance_transfer(&name, bytes),
            EngineEvent::ItemFinished {
                stage,
                name,
                outcome,
            } => self.finish_item(stage, name, outcome),
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Enumerating => "Enumerate",
        Stage::Estimating => "Estimate",
        Stage::Downloading => "Download",
        Stage::Extracting => "Extract",
        Stage::Deleting => "Delete",
    }
}

fn outcome_label(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Downloaded => "downloaded".to_string(),
        ItemOutcome::Skipped => "skipped (already exists)".to_string(),
        ItemOutcome::Failed { reason } => format!("failed ({reason})"),
        ItemOutcome::Extracted => "extracted".to_string(),
        ItemOutcome::ExtractionFailed { reason } => format!("extraction failed ({reason})"),
        ItemOutcome::Deleted => "deleted".to_string(),
        ItemOutcome::DeletionFailed { reason } => format!("deletion failed ({reason})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hidden() -> BarProgress {
        BarProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn overall_position(progress: &BarProgress) -> (u64, Option<u64>) {
        let bars = progress.lock();
        let overall = bars.overall.as_ref().unwrap();
        (overall.position(), overall.length())
    }

    #[test]
    fn overall_bar_advances_once_per_finished_item_and_restarts_per_stage() {
        let progress = hidden();
        progress.emit(EngineEvent::StageStarted {
            stage: Stage::Downloading,
            total: 2,
        });
        progress.emit(EngineEvent::ItemFinished {
            stage: Stage::Downloading,
            name: "a.bsp".to_string(),
            outcome: ItemOutcome::Downloaded,
        });
        assert_eq!(overall_position(&progress), (1, Some(2)));

        progress.emit(EngineEvent::StageStarted {
            stage: Stage::Extracting,
            total: 3,
        });
        assert_eq!(overall_position(&progress), (0, Some(3)));
    }

    #[test]
    fn transfer_bar_tracks_bytes_and_goes_away_with_the_item() {
        let progress = hidden();
        progress.emit(EngineEvent::StageStarted {
            stage: Stage::Downloading,
            total: 1,
        });
        progress.emit(EngineEvent::TransferStarted {
            name: "a.bsp".to_string(),
            total: Some(100),
        });
        progress.emit(EngineEvent::TransferProgress {
            name: "a.bsp".to_string(),
            bytes: 40,
        });
        {
            let bars = progress.lock();
            let bar = &bars.transfers["a.bsp"];
            assert_eq!((bar.position(), bar.length()), (40, Some(100)));
        }

        // Second attempt starts from zero.
        progress.emit(EngineEvent::TransferStarted {
            name: "a.bsp".to_string(),
            total: None,
        });
        assert_eq!(progress.lock().transfers["a.bsp"].position(), 0);

        progress.emit(EngineEvent::ItemFinished {
            stage: Stage::Downloading,
            name: "a.bsp".to_string(),
            outcome: ItemOutcome::Failed {
                reason: "http status 404".to_string(),
            },
        });
        assert!(progress.lock().transfers.is_empty());
        assert_eq!(overall_position(&progress), (1, Some(1)));

        progress.clear();
        assert!(progress.lock().overall.is_none());
    }
}
