//! Handlers for `rolegate config` commands.

use rolegate_core::{Error, Result, RolegateConfig};
use std::io::Write;
use std::path::PathBuf;

/// Prints the resolved config file path.
pub fn cmd_config_path<W: Write>(config_path: Option<&str>, out: &mut W) -> Result<()> {
    let path = RolegateConfig::resolve_config_path(config_path)
        .ok_or_else(|| Error::config("Could not determine config directory for this platform"))?;

    writeln!(out, "{}", path.display())?;
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "Config file does not exist; run `{} config init` to create it",
            RolegateConfig::project_name()
        );
    }
    Ok(())
}

/// Writes the default configuration to `file` or the platform default path.
pub fn cmd_config_init<W: Write>(file: Option<&str>, force: bool, out: &mut W) -> Result<()> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => RolegateConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_str = RolegateConfig::default().to_toml_string()?;
    std::fs::write(&path, toml_str)?;

    writeln!(out, "Config file created at {}", path.display())?;
    Ok(())
}
