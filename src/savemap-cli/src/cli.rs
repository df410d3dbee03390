//! CLI argument definitions for savemap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "savemap")]
#[command(about = "Template-driven save and ROM editor", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Buffer and template selection shared by every session command
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Save file or ROM image
    pub input: PathBuf,

    /// Template file, or a template id looked up in the configured template
    /// directory (auto-detected from that directory if omitted)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Skip region detection and use this region
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List flattened items with their values
    #[command(visible_alias = "ls")]
    Items {
        #[command(flatten)]
        session: SessionArgs,

        /// Only show items whose id contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Include hidden items
        #[arg(short, long)]
        all: bool,

        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read one item
    #[command(visible_alias = "g")]
    Get {
        #[command(flatten)]
        session: SessionArgs,

        /// Item id (e.g. "slots[0].level")
        item: String,
    },

    /// Write one item and save the buffer back
    #[command(visible_alias = "s")]
    Set {
        #[command(flatten)]
        session: SessionArgs,

        /// Item id (e.g. "slots[0].level")
        item: String,

        /// New value: number, 0x hex, true/false, resource label or text
        value: String,

        /// Write to this file instead of the input
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not create a backup (overrides config)
        #[arg(long)]
        no_backup: bool,
    },

    /// Show stored vs computed checksums
    #[command(visible_alias = "sum")]
    Checksums {
        #[command(flatten)]
        session: SessionArgs,

        /// Regenerate every checksum and save the buffer back
        #[arg(long)]
        fix: bool,

        /// Do not create a backup when fixing (overrides config)
        #[arg(long)]
        no_backup: bool,
    },

    /// Show detected regions and header shift
    #[command(visible_alias = "r")]
    Regions {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Directory searched for templates by id
        #[arg(long)]
        template_dir: Option<PathBuf>,

        /// Create backups before writing (default: true)
        #[arg(long)]
        backup: Option<bool>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
