mod cancel;
mod cli;
mod progress;
mod report;
mod settings;
mod sources;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use fetch_core::{format_size, render_summary};
use fetch_engine::{EngineConfig, Pipeline, PipelineError, RunContext};
use fetch_logging::{fetch_error, fetch_info, fetch_warn, LogDestination, Transcript};
use log::LevelFilter;

use crate::cli::Args;
use crate::progress::BarProgress;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let started = Local::now();
    let transcript = Transcript::new();
    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let destination = match &args.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    fetch_logging::initialize(destination, level, Some(transcript.clone()));

    let ctx = RunContext::new();
    cancel::spawn_signal_listener(ctx.cancel_token());

    let (report_dir, configured) = prepare(&args);
    let (workers, outcome) = match configured {
        Ok(config) => {
            let workers = config.workers;
            (workers, run(config, &ctx, args.yes).await)
        }
        Err(err) => (0, Err(err)),
    };
    if let Err(err) = &outcome {
        fetch_error!("[!] {:#}", err);
    }

    let summary = render_summary(&ctx.snapshot(), workers);
    println!("{summary}");
    match report::write_report(&report_dir, &started, &transcript.contents(), &summary) {
        Ok(path) => println!("Summary saved to {}", path.display()),
        Err(err) => eprintln!("Could not write the run report: {err}"),
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Loads the settings file and builds the engine configuration.
///
/// The report directory is known even when the settings file is unusable,
/// so setup failures still leave a report behind.
fn prepare(args: &Args) -> (PathBuf, anyhow::Result<EngineConfig>) {
    match Settings::load(&args.config) {
        Ok(settings) => (settings.report_dir(args), configure(args, &settings)),
        Err(err) => (Settings::default().report_dir(args), Err(err)),
    }
}

fn configure(args: &Args, settings: &Settings) -> anyhow::Result<EngineConfig> {
    let rules = settings.suffix_rules();
    let file_seeds = sources::load_or_create(&settings.sources_path(args), &rules)?;
    let config = settings.resolve(args, file_seeds);
    fetch_info!("Destination: {:?}", config.destination);
    fetch_info!("Workers: {}", config.workers);
    Ok(config)
}

async fn run(config: EngineConfig, ctx: &RunContext, assume_yes: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config).context("could not set up the http client")?;
    let progress = BarProgress::new();

    let plan = pipeline.plan(ctx, &progress).await?;
    if let Some(estimate) = plan.estimate {
        fetch_info!(
            "{} file(s) to fetch, {} known, {} of unknown size.",
            plan.work.len(),
            format_size(estimate.known_bytes),
            estimate.unknown
        );
    }
    if plan.needs_confirmation() && !assume_yes {
        let warnings = plan.confirmations.clone();
        progress.clear();
        let accepted = tokio::task::spawn_blocking(move || confirm(&warnings))
            .await
            .context("confirmation prompt failed")??;
        if !accepted {
            return Err(PipelineError::Declined.into());
        }
    }
    if plan.work.is_empty() {
        fetch_info!("Nothing to download.");
    } else {
        fetch_info!("Press Enter at any time to cancel.");
        cancel::spawn_key_listener(ctx.cancel_token());
    }

    pipeline.execute(plan, ctx, &progress).await;
    progress.clear();
    if ctx.is_cancelled() {
        fetch_warn!("Run was cancelled; the summary covers completed work only.");
    }
    Ok(())
}

fn confirm(warnings: &[String]) -> anyhow::Result<bool> {
    for warning in warnings {
        fetch_warn!("[!] {}", warning);
    }
    print!("Do you want to continue? (y/n): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
