//! abnormal-photo-sync entry point.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use core_runtime::config::AppConfig;
use core_runtime::events::{CoreEvent, EventSeverity, EventStream, RecvError};
use core_runtime::logging::{init_logging, LogLevel};
use core_service::{MarkOutcome, PhotoSyncService};
use core_sync::{barcode, SweepOutcome};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Needs neither configuration nor the network
    if let Commands::Normalize(args) = &cli.command {
        println!("{}", barcode::normalize(&args.raw));
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    match cli.verbose {
        0 => {}
        1 => config.logging = config.logging.with_level(LogLevel::Debug),
        _ => config.logging = config.logging.with_level(LogLevel::Trace),
    }
    // Flushes the file writer on drop
    let _guard = init_logging(config.logging.clone()).context("Failed to initialize logging")?;

    let service = PhotoSyncService::bootstrap(&config).context("Failed to start service")?;

    match cli.command {
        Commands::Run => run_monitor(&service).await?,
        Commands::Once => {
            let cycle = service.run_once().await;
            print_outcome("reconcile", cycle.reconcile.as_ref())?;
            print_outcome("compensate", cycle.compensate.as_ref())?;
        }
        Commands::SyncBarcode(args) => {
            let outcome = service
                .sync_barcode(&args.barcode)
                .await
                .with_context(|| format!("Sync failed for barcode {}", args.barcode))?;
            print_outcome("barcode", Some(&outcome))?;
        }
        Commands::MarkAbnormal(args) => {
            let outcome = service.mark_abnormal(&args.package_no, !args.clear).await?;
            match outcome {
                MarkOutcome::NotFound => println!("package {} not found", args.package_no),
                MarkOutcome::AlreadyMarked { record_id } => {
                    println!("package already flagged abnormal (record {})", record_id)
                }
                MarkOutcome::Unchanged { record_id } => println!("no change (record {})", record_id),
                MarkOutcome::Updated {
                    record_id,
                    abnormal,
                } => println!("record {} abnormal = {}", record_id, abnormal),
            }
        }
        Commands::Normalize(_) => {}
    }

    Ok(())
}

async fn run_monitor(service: &PhotoSyncService) -> Result<()> {
    let observer = tokio::spawn(log_events(service.event_stream(EventSeverity::Info)));
    service.start_monitor().await;
    info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested");
    if let Err(e) = service.stop_monitor().await {
        warn!(error = %e, "Monitor did not stop cleanly");
    }
    observer.abort();
    Ok(())
}

/// One log line per sweep outcome, at the event's own severity.
async fn log_events(mut stream: EventStream) {
    loop {
        match stream.recv().await {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &CoreEvent) {
    let detail = serde_json::to_string(event).unwrap_or_default();
    match event.severity() {
        EventSeverity::Error => error!(event = %detail, "{}", event.description()),
        EventSeverity::Warning => warn!(event = %detail, "{}", event.description()),
        EventSeverity::Info | EventSeverity::Debug => {
            info!(event = %detail, "{}", event.description())
        }
    }
}

fn print_outcome(label: &str, outcome: Option<&SweepOutcome>) -> Result<()> {
    match outcome {
        None => println!("{}: failed (see log)", label),
        Some(SweepOutcome::Skipped) => println!("{}: skipped, another sweep is running", label),
        Some(SweepOutcome::Completed(report)) => {
            println!("{}: {}", label, serde_json::to_string(report)?);
        }
    }
    Ok(())
}
