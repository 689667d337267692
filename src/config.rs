//! Configuration loading and schema definitions for testops.
//!
//! Configuration lives in an optional TOML file (`testops.toml` by
//! default). Every key has a default, so an absent file is equivalent to an
//! empty one. Command-line flags and the `TESTOPS_TOKEN` / `TESTOPS_PROJECT`
//! environment variables take precedence over file values.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Loads testops configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use testops::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("testops.toml"))?;
/// println!("Batch size: {}", config.upload.batch_size);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}

/// Loads testops configuration from a TOML string.
///
/// # Example
///
/// ```
/// use testops::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [api]
///     project = "PRJ"
///
///     [upload]
///     batch_size = 50
/// "#)?;
///
/// assert_eq!(config.upload.batch_size, 50);
/// assert_eq!(config.api.project.as_deref(), Some("PRJ"));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
