//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up savemap CLI defaults.

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Handle the configure command
///
/// # Arguments
/// * `template_dir` - Directory to look templates up in
/// * `backup` - Whether writes back up the original file first
/// * `show` - If true, show current configuration
pub fn handle(template_dir: Option<PathBuf>, backup: Option<bool>, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if !apply(&mut config, template_dir, backup)? {
        show_usage();
        return Ok(());
    }

    config.save()?;
    println!("Configuration updated");
    if let Ok(path) = Config::config_path() {
        println!("Config saved to: {}", path.display());
    }
    Ok(())
}

/// Merge the given settings into `config`. Returns false when nothing was
/// given.
fn apply(config: &mut Config, template_dir: Option<PathBuf>, backup: Option<bool>) -> Result<bool> {
    if template_dir.is_none() && backup.is_none() {
        return Ok(false);
    }

    if let Some(dir) = template_dir {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Template directory {} not found", dir.display()))?;
        println!("Template directory: {}", dir.display());
        config.template_dir = Some(dir);
    }
    if let Some(backup) = backup {
        println!("Backups: {}", if backup { "on" } else { "off" });
        config.backup = Some(backup);
    }
    Ok(true)
}

/// Display current configuration
fn show_config(config: &Config) {
    match &config.template_dir {
        Some(dir) => println!("Template directory: {}", dir.display()),
        None => println!("No template directory configured"),
    }
    println!(
        "Backups: {}",
        if config.backup_enabled() { "on" } else { "off" }
    );

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: savemap configure --template-dir DIR [--backup true|false]");
    println!("       savemap configure --show");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_nothing() {
        let mut config = Config::default();
        assert!(!apply(&mut config, None, None).unwrap());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        assert!(apply(&mut config, Some(dir.path().to_path_buf()), Some(false)).unwrap());
        assert_eq!(config.template_dir, Some(dir.path().canonicalize().unwrap()));
        assert!(!config.backup_enabled());
    }

    #[test]
    fn test_apply_missing_dir() {
        let mut config = Config::default();
        let missing = PathBuf::from("/nonexistent/savemap/templates");
        assert!(apply(&mut config, Some(missing), None).is_err());
    }
}
