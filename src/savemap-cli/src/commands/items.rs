//! Item listing command handler

use anyhow::{Context, Result};
use savemap::{Item, Session};

use crate::cli::SessionArgs;
use crate::config::Config;

use super::open_session;

/// Displayed value of an item, its resource label appended when it has one.
/// Items pointing past the end of the buffer show as unreadable instead of
/// aborting the listing.
pub fn display_value(session: &Session, item: &Item) -> Result<String> {
    let value = match session.value(&item.id) {
        Ok(value) => value,
        Err(e) if e.is_bounds() => return Ok("<out of bounds>".to_string()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", item.id)),
    };
    let label = session.label(&item.id).ok().flatten();
    Ok(match label {
        Some(label) => format!("{value} ({label})"),
        None => value.to_string(),
    })
}

fn selected<'a>(
    session: &'a Session,
    filter: Option<&'a str>,
    all: bool,
) -> impl Iterator<Item = &'a Item> {
    session
        .items()
        .iter()
        .filter(move |i| all || !i.hidden)
        .filter(move |i| filter.map_or(true, |f| i.id.contains(f)))
}

/// One `id  value  [flags]  name` line per item
pub fn render(session: &Session, filter: Option<&str>, all: bool) -> Result<Vec<String>> {
    let items: Vec<&Item> = selected(session, filter, all).collect();
    let width = items.iter().map(|i| i.id.len()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let mut flags = String::new();
        if item.disabled {
            flags.push_str(" [disabled]");
        }
        if item.hidden {
            flags.push_str(" [hidden]");
        }
        lines.push(format!(
            "{:width$}  {:>20}{}  {}",
            item.id,
            display_value(session, item)?,
            flags,
            item.name,
        ));
    }
    Ok(lines)
}

/// Items as a JSON array, each with its decoded value
pub fn render_json(session: &Session, filter: Option<&str>, all: bool) -> Result<String> {
    let entries: Vec<serde_json::Value> = selected(session, filter, all)
        .map(|item| {
            let value = session.value(&item.id).ok();
            serde_json::json!({ "item": item, "value": value })
        })
        .collect();
    serde_json::to_string_pretty(&entries).context("Failed to serialize items")
}

/// Handle `items` command
pub fn handle(args: &SessionArgs, filter: Option<&str>, all: bool, json: bool) -> Result<()> {
    let config = Config::load()?;
    let session = open_session(args, &config)?;

    if json {
        println!("{}", render_json(&session, filter, all)?);
        return Ok(());
    }

    println!("Template: {}", session.template().id);
    if let Some(region) = session.region() {
        println!("Region: {}", region);
    }
    println!();
    for line in render(&session, filter, all)? {
        println!("{}", line);
    }
    Ok(())
}
