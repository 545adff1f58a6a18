//! Loads the daemon configuration document from disk. Grounded on the
//! teacher's `config/loader.rs` (`read_to_string` + deserialize + default
//! fallback); generalized to accept either TOML or JSON on disk, per
//! SPEC_FULL §2's "matching whatever's on disk" — chosen by extension,
//! falling back to TOML parsing for anything else.

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::Config;

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: Config = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON config from {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config from {}", path.display()))?
    };

    Ok(config)
}
