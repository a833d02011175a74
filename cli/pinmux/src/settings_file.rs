//! Reading and writing saved settings.

use std::path::Path;

use anyhow::{Context, Result};
use pinmux_vars::{Settings, SettingsFile};

pub fn read(path: &Path) -> Result<Settings> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file = SettingsFile::from_bytes(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(file.settings)
}

pub fn write(path: &Path, settings: &Settings) -> Result<()> {
    let bytes = SettingsFile::new(settings.clone()).to_bytes()?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), entries = settings.len(), "settings written");
    Ok(())
}
