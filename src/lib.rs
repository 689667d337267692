//! testops: normalize test reports and upload them to a test-management service.
//!
//! Reports from several frameworks are decoded into one canonical model and
//! pushed to a remote test run in bounded-concurrency batches.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Model**: Canonical results, steps and attachments
//! - **Parser**: One decoder per input format (JUnit, Allure, native JSON, xcresult)
//! - **Client**: The remote API seam and its HTTP implementation
//! - **Upload**: Run lifecycle, result transforms, batching and the worker pool
//! - **Report**: Upload progress and summaries
//! - **Manage**: Environments, milestones, run and custom field cleanup, case filters
//!
//! # Example
//!
//! ```no_run
//! use testops::client::HttpClient;
//! use testops::config::load_config;
//! use testops::parser::{ParserOptions, ReportFormat, build_parser};
//! use testops::report::NullReporter;
//! use testops::upload::{RunSpec, RunTarget, UploadParams, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(std::path::Path::new("testops.toml"))?;
//!     let parser = build_parser(ReportFormat::Junit, "build/test-results", &ParserOptions::default())?;
//!     let results = parser.parse().await?;
//!
//!     let params = UploadParams::new("PRJ", RunTarget::Create(RunSpec::new("Nightly")));
//!     let uploader = Uploader::new(HttpClient::from_config(&config.api)?, NullReporter);
//!     uploader.upload(results, &params).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod manage;
pub mod model;
pub mod parser;
pub mod report;
pub mod upload;

// Re-export commonly used types
pub use client::{ClientError, HttpClient, TestOpsClient};
pub use config::{Config, load_config};
pub use model::{Attachment, Status, Step, StepStatus, TestResult};
pub use parser::{ReportFormat, ReportParser, build_parser};
pub use report::Reporter;
pub use upload::{UploadError, UploadParams, UploadSummary, Uploader};
