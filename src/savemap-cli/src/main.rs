mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "savemap=debug,savemap_cli=debug",
        _ => "savemap=trace,savemap_cli=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Items {
            session,
            filter,
            all,
            json,
        } => {
            commands::items::handle(&session, filter.as_deref(), all, json)?;
        }

        Commands::Get { session, item } => {
            commands::values::get(&session, &item)?;
        }

        Commands::Set {
            session,
            item,
            value,
            output,
            no_backup,
        } => {
            commands::values::set(&session, &item, &value, output.as_deref(), no_backup)?;
        }

        Commands::Checksums {
            session,
            fix,
            no_backup,
        } => {
            commands::checksums::handle(&session, fix, no_backup)?;
        }

        Commands::Regions { session } => {
            commands::regions::handle(&session)?;
        }

        Commands::Configure {
            template_dir,
            backup,
            show,
        } => {
            commands::configure::handle(template_dir, backup, show)?;
        }
    }

    Ok(())
}
