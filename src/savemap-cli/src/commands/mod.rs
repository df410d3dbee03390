//! Command handlers for savemap CLI
//!
//! Each subcommand has its own module with handler functions. Session
//! commands share template lookup and the backup-then-write sequence below.

pub mod checksums;
pub mod configure;
pub mod items;
pub mod regions;
pub mod values;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use savemap::{Error, HookRegistry, Session, SessionOptions, Template};

use crate::cli::SessionArgs;
use crate::config::Config;

const TEMPLATE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Find the template file for `name`: an existing path, or an id inside the
/// template directory
pub fn find_template(name: &str, template_dir: Option<&Path>) -> Result<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Ok(direct);
    }

    let dir = template_dir.with_context(|| {
        format!(
            "Template '{}' not found. Pass a file path or run \
             'savemap configure --template-dir DIR'.",
            name
        )
    })?;

    TEMPLATE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
        .with_context(|| format!("No template '{}' in {}", name, dir.display()))
}

/// Every template file in `dir`, sorted by name
pub fn list_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load `input` against the selected template, or against the first
/// template in the configured directory whose validators accept it
pub fn open_session(args: &SessionArgs, config: &Config) -> Result<Session> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let registry = HookRegistry::new();
    let options = SessionOptions {
        region: args.region.clone(),
        ..SessionOptions::default()
    };

    if let Some(name) = &args.template {
        let path = find_template(name, config.template_dir.as_deref())?;
        let template = Template::from_path(&path)
            .with_context(|| format!("Failed to load template {}", path.display()))?;
        return Session::load_with(bytes, Rc::new(template), &registry, options)
            .with_context(|| format!("Failed to load {}", args.input.display()));
    }

    let Some(dir) = config.template_dir.as_deref() else {
        bail!("No template given. Use --template or 'savemap configure --template-dir DIR'.");
    };
    detect_template(dir, bytes, &registry, options)
}

/// Try each template in `dir`. Templates with validators go first so a
/// template that accepts any buffer only wins when nothing else matches.
fn detect_template(
    dir: &Path,
    bytes: Vec<u8>,
    registry: &HookRegistry,
    options: SessionOptions,
) -> Result<Session> {
    let mut templates = Vec::new();
    for path in list_templates(dir)? {
        match Template::from_path(&path) {
            Ok(t) => templates.push(t),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping template"),
        }
    }
    templates.sort_by_key(|t| t.validator.is_empty());

    for template in templates {
        let id = template.id.clone();
        match Session::load_with(bytes.clone(), Rc::new(template), registry, options.clone()) {
            Ok(session) => {
                tracing::debug!(template = %id, "template matched");
                return Ok(session);
            }
            Err(Error::Validation { .. }) => continue,
            Err(e) => tracing::debug!(template = %id, error = %e, "template rejected"),
        }
    }
    bail!("No template in {} matches this file", dir.display())
}

/// Write the session buffer to `output` (or back to `input`), backing up the
/// original first when enabled
pub fn write_session(
    session: &Session,
    input: &Path,
    output: Option<&Path>,
    backup: bool,
) -> Result<PathBuf> {
    let target = output.unwrap_or(input);
    let backup = backup && target.exists();

    if backup {
        if let Some(path) =
            savemap::smart_backup(target).context("Failed to manage backup")?
        {
            eprintln!("Backup: {}", path.display());
        }
    }

    let bytes = session.save();
    fs::write(target, &bytes).with_context(|| format!("Failed to write {}", target.display()))?;

    if backup {
        savemap::update_after_edit(target, &bytes).context("Failed to update backup metadata")?;
    }
    Ok(target.to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const DEMO: &str = r#"{
        "id": "demo",
        "validator": {"us": {"offset": "0x0", "bytes": "44454d4f"}},
        "resources": {"items": {"0": "-", "1": "Potion"}},
        "items": [
            {"type": "variable", "id": "level", "name": "Level", "offset": "0x4", "dataType": "uint8", "max": 99},
            {"type": "variable", "id": "item", "name": "Item", "offset": "0x5", "dataType": "uint8", "resource": "items"},
            {"type": "checksum", "id": "sum", "name": "Checksum", "offset": "0xf",
             "dataType": "uint8", "control": {"offsetStart": "0x0", "offsetEnd": "0xf"},
             "algorithm": {"kind": "sum"}}
        ]
    }"#;

    pub fn demo_save() -> Vec<u8> {
        let mut bytes = vec![0u8; 16];
        bytes[..4].copy_from_slice(b"DEMO");
        bytes[4] = 12;
        bytes[5] = 1;
        let sum = bytes[..15].iter().fold(0u8, |a, b| a.wrapping_add(*b));
        bytes[15] = sum;
        bytes
    }

    /// Template dir with the demo template, plus a save file
    pub fn fixture() -> (tempfile::TempDir, SessionArgs, Config) {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir(&templates).unwrap();
        fs::write(templates.join("demo.json"), DEMO).unwrap();
        let input = dir.path().join("demo.sav");
        fs::write(&input, demo_save()).unwrap();

        let args = SessionArgs {
            input,
            template: None,
            region: None,
        };
        let config = Config {
            template_dir: Some(templates),
            backup: None,
        };
        (dir, args, config)
    }

    #[test]
    fn test_find_template_by_id() {
        let (_dir, _, config) = fixture();
        let path = find_template("demo", config.template_dir.as_deref()).unwrap();
        assert!(path.ends_with("demo.json"));
        assert!(find_template("missing", config.template_dir.as_deref()).is_err());
        assert!(find_template("demo", None).is_err());
    }

    #[test]
    fn test_open_session_detects_template() {
        let (_dir, args, config) = fixture();
        let session = open_session(&args, &config).unwrap();
        assert_eq!(session.template().id, "demo");
        assert_eq!(session.region(), Some("us"));
    }

    #[test]
    fn test_open_session_rejects_unknown_file() {
        let (dir, mut args, config) = fixture();
        let other = dir.path().join("other.sav");
        fs::write(&other, [0u8; 16]).unwrap();
        args.input = other;
        assert!(open_session(&args, &config).is_err());
    }

    #[test]
    fn test_write_session_backs_up_once() {
        let (_dir, args, config) = fixture();
        let session = open_session(&args, &config).unwrap();
        write_session(&session, &args.input, None, true).unwrap();
        write_session(&session, &args.input, None, true).unwrap();

        let (backup, ledger) = savemap::backup::backup_paths(&args.input);
        assert_eq!(fs::read(backup).unwrap(), demo_save());
        assert!(ledger.exists());
    }
}
