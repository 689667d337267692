//! Configuration schema definitions for testops.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── ApiConfig        - Service endpoint and credentials
//! ├── UploadConfig     - Batching and run back-dating
//! └── XcresultConfig   - External tool and step visibility
//! ```

use serde::{Deserialize, Serialize};

use crate::parser::StepLevel;

/// Root configuration structure for testops.
///
/// # TOML Structure
///
/// ```toml
/// [api]
/// host = "https://api.qase.io"
/// token = "..."
/// project = "PRJ"
///
/// [upload]
/// batch_size = 200
/// run_lead_in_secs = 10
///
/// [xcresult]
/// program = "xcrun"
/// step_level = "first"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub xcresult: XcresultConfig,
}

/// Where results go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API root. `/v1` and `/v2` paths are appended.
    #[serde(default = "default_host")]
    pub host: String,

    /// Overridden by `TESTOPS_TOKEN` or `--token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Project code. Overridden by `TESTOPS_PROJECT` or `--project`.
    #[serde(default)]
    pub project: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: None,
            project: None,
        }
    }
}

fn default_host() -> String {
    "https://api.qase.io".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Results per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds a created run is back-dated before the earliest result.
    #[serde(default = "default_lead_in")]
    pub run_lead_in_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            run_lead_in_secs: default_lead_in(),
        }
    }
}

fn default_batch_size() -> usize {
    200
}

fn default_lead_in() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XcresultConfig {
    /// Entry point for `xcresulttool`, split shell-style.
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default)]
    pub step_level: StepLevel,
}

impl Default for XcresultConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            step_level: StepLevel::default(),
        }
    }
}

fn default_program() -> String {
    "xcrun".to_string()
}
