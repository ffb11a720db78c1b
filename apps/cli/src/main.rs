//! s3check: checksum-verified multipart uploads to S3-compatible stores.

mod cli;
mod render;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s3check_credentials::CredentialResolver;
use s3check_s3::S3Store;
use s3check_upload::{UploadJob, UploadOrchestrator};

use cli::Args;
use render::Printer;
use settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "warn,s3check=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {e:#}", "Error".red());
            ExitCode::FAILURE
        }
    }
}

/// Runs one upload. `Ok(false)` means the upload ran and failed.
async fn run(args: Args) -> anyhow::Result<bool> {
    let settings = Settings::load(args.config.as_deref())?;
    let payload = args.payload()?;
    let job = UploadJob::new(args.job_config(&settings), payload)?;

    let target = CredentialResolver::from_env()
        .resolve(&args.resolve_request(&settings))
        .context("failed to resolve credentials")?;
    if let Some(endpoint) = &target.endpoint_url {
        println!("Using endpoint URL: {endpoint}");
        println!("Using region: {}", target.region);
    }

    let store = Arc::new(S3Store::connect(&target).await);
    let mut orchestrator = UploadOrchestrator::new(store);
    let mut events = orchestrator
        .take_events()
        .context("event stream already taken")?;

    let printer = Printer::new(job.verbose());
    let printer_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            printer.event(&event);
        }
    });

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    info!(source = %args.source_name(), bytes = job.total_bytes(), "uploading");
    let result = orchestrator.run(&job).await;

    // Closing the event stream lets the printer drain and exit.
    drop(orchestrator);
    let _ = printer_task.await;

    match result {
        Ok(outcome) => {
            println!(
                "{} {} → {}",
                "✓ Uploaded".green(),
                args.source_name(),
                job.target()
            );
            println!("{}", render::checksum_table(&outcome));
            println!("{}", render::phase_summary(&outcome.status));
            Ok(true)
        }
        Err(failure) => {
            println!("{}", render::phase_summary(&failure.status));
            eprintln!("{}: {}", "Upload failed".red(), failure.cause);
            Ok(false)
        }
    }
}
