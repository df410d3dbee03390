//! Single item read/write command handlers

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use savemap::{Session, Value};

use crate::cli::SessionArgs;
use crate::config::Config;

use super::{items::display_value, open_session, write_session};

/// Handle `get` command
pub fn get(args: &SessionArgs, id: &str) -> Result<()> {
    let config = Config::load()?;
    let session = open_session(args, &config)?;
    println!("{}", read(&session, id)?);
    Ok(())
}

fn read(session: &Session, id: &str) -> Result<String> {
    let Some(item) = session.item(id) else {
        bail!("Unknown item '{}'. Run 'savemap items' to list them.", id);
    };
    display_value(session, item)
}

/// Apply `value` to item `id` without touching the disk
pub fn apply(session: &mut Session, id: &str, value: &str) -> Result<(Value, Value)> {
    let before = session
        .value(id)
        .with_context(|| format!("Failed to read {}", id))?;
    session
        .set_value(id, Value::parse(value))
        .with_context(|| format!("Failed to set {} to '{}'", id, value))?;
    let after = session.value(id)?;
    Ok((before, after))
}

/// Handle `set` command
pub fn set(
    args: &SessionArgs,
    id: &str,
    value: &str,
    output: Option<&Path>,
    no_backup: bool,
) -> Result<PathBuf> {
    let config = Config::load()?;
    let mut session = open_session(args, &config)?;

    let (before, after) = apply(&mut session, id, value)?;
    let backup = config.backup_enabled() && !no_backup;
    let target = write_session(&session, &args.input, output, backup)?;

    println!("{}: {} -> {}", id, before, after);
    println!("Saved to: {}", target.display());
    Ok(target)
}
