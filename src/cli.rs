//! Command-line interface definitions.
//!
//! ```bash
//! # Run the monitor until Ctrl-C
//! abnormal-photo-sync --config photo-sync.toml run
//!
//! # One reconciliation + compensation cycle
//! abnormal-photo-sync once
//!
//! # Upload photos for a single barcode now
//! abnormal-photo-sync sync-barcode 1234567890
//!
//! # Flag or clear a package
//! abnormal-photo-sync mark-abnormal PKG-1
//! abnormal-photo-sync mark-abnormal PKG-1 --clear
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Uploads locally captured photos of abnormal packages to the record store.
#[derive(Debug, Parser)]
#[command(name = "abnormal-photo-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file; built-in defaults apply when omitted
    #[arg(short, long, global = true, env = "PHOTO_SYNC_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the monitor and run until Ctrl-C
    Run,
    /// Run one reconciliation + compensation cycle and exit
    Once,
    /// Upload photos for flagged records carrying this barcode
    SyncBarcode(SyncBarcodeArgs),
    /// Set or clear the abnormal flag of a package
    MarkAbnormal(MarkAbnormalArgs),
    /// Print the normalized form of a scanned barcode
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
pub struct SyncBarcodeArgs {
    #[arg(value_name = "BARCODE")]
    pub barcode: String,
}

#[derive(Debug, Args)]
pub struct MarkAbnormalArgs {
    #[arg(value_name = "PACKAGE_NO")]
    pub package_no: String,

    /// Clear the flag instead of setting it
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    #[arg(value_name = "RAW")]
    pub raw: String,
}
