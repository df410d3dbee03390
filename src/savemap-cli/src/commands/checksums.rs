//! Checksum report and repair command handler

use anyhow::{Context, Result};
use savemap::{ItemKind, Session};

use crate::cli::SessionArgs;
use crate::config::Config;

use super::{open_session, write_session};

/// One row of the checksum report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: String,
    pub offset: usize,
    pub stored: Option<u32>,
    pub computed: Option<u32>,
}

impl Row {
    pub fn is_valid(&self) -> bool {
        self.stored == self.computed
    }
}

/// Checksums of every enabled instance. Checksums without an algorithm or
/// pointing out of bounds have no computed value.
pub fn report(session: &Session) -> Vec<Row> {
    session
        .items()
        .iter()
        .filter(|item| !item.disabled)
        .filter_map(|item| match &item.kind {
            ItemKind::Checksum { status, .. } => Some(Row {
                id: item.id.clone(),
                offset: item.offset,
                stored: status.map(|s| s.stored),
                computed: status.map(|s| s.computed),
            }),
            _ => None,
        })
        .collect()
}

fn hex(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:#x}"))
}

/// Handle `checksums` command
pub fn handle(args: &SessionArgs, fix: bool, no_backup: bool) -> Result<()> {
    let config = Config::load()?;
    let mut session = open_session(args, &config)?;

    let rows = report(&session);
    if rows.is_empty() {
        println!("No checksums in template {}", session.template().id);
        return Ok(());
    }

    println!("{:<32} {:>8} {:>12} {:>12}", "Checksum", "Offset", "Stored", "Computed");
    for row in &rows {
        println!(
            "{:<32} {:>#8x} {:>12} {:>12} {}",
            row.id,
            row.offset,
            hex(row.stored),
            hex(row.computed),
            if row.is_valid() { "ok" } else { "MISMATCH" }
        );
    }

    let invalid = rows.iter().filter(|r| !r.is_valid()).count();
    if !fix {
        if invalid > 0 {
            println!("\n{} checksum(s) invalid. Use --fix to regenerate.", invalid);
        }
        return Ok(());
    }

    let written = session
        .refresh_checksums()
        .context("Failed to regenerate checksums")?;
    let backup = config.backup_enabled() && !no_backup;
    let target = write_session(&session, &args.input, None, backup)?;
    println!(
        "\nRegenerated {} checksum(s), saved to: {}",
        written,
        target.display()
    );
    Ok(())
}
