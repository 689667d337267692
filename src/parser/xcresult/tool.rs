//! Access to the external `xcresulttool` extraction tool.
//!
//! The tool is invoked as
//!
//! ```bash
//! xcrun xcresulttool get --path <bundle> --format json [--id <object>]
//! xcrun xcresulttool get --path <bundle> --format raw --id <payload>
//! ```
//!
//! Newer Xcode releases reject the object-graph commands with exit status
//! 64 unless `--legacy` is passed, so such a failure is retried once with
//! that flag before it is reported.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::parser::{ParserError, ParserResult};

/// Exit status that asks for the `--legacy` flag.
const LEGACY_EXIT_CODE: i32 = 64;

/// Source of xcresult object graphs and attachment payloads.
#[async_trait]
pub trait XcresultTool: Send + Sync {
    /// The JSON graph for `id`, or the bundle root when `id` is `None`.
    async fn json(&self, id: Option<&str>) -> ParserResult<Arc<Value>>;

    /// Raw bytes of an attachment payload.
    async fn raw(&self, id: &str) -> ParserResult<Arc<Vec<u8>>>;
}

/// Runs the real tool against one bundle.
pub struct XcrunTool {
    program: Vec<String>,
    bundle: PathBuf,
}

impl XcrunTool {
    /// `program` is split shell-style, so wrappers such as
    /// `"arch -arm64 xcrun"` work.
    pub fn new(bundle: &Path, program: &str) -> Self {
        let program = shell_words::split(program).unwrap_or_else(|_| vec![program.to_string()]);
        Self {
            program,
            bundle: bundle.to_path_buf(),
        }
    }

    fn args(&self, format: &str, id: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "xcresulttool".to_string(),
            "get".to_string(),
            "--path".to_string(),
            self.bundle.to_string_lossy().into_owned(),
            "--format".to_string(),
            format.to_string(),
        ];
        if let Some(id) = id {
            args.push("--id".to_string());
            args.push(id.to_string());
        }
        args
    }

    async fn invoke(&self, args: &[String]) -> ParserResult<Output> {
        let (program, prefix) = self
            .program
            .split_first()
            .ok_or_else(|| ParserError::Tool("empty xcresult program".to_string()))?;

        debug!("Running {} {:?} {:?}", program, prefix, args);

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(prefix);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd.output()
            .await
            .map_err(|e| ParserError::Tool(format!("failed to run {}: {}", program, e)))
    }

    async fn run(&self, mut args: Vec<String>) -> ParserResult<Vec<u8>> {
        let mut output = self.invoke(&args).await?;

        if output.status.code() == Some(LEGACY_EXIT_CODE) {
            debug!("xcresulttool exited with {}, retrying with --legacy", LEGACY_EXIT_CODE);
            args.push("--legacy".to_string());
            output = self.invoke(&args).await?;
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ParserError::Tool(format!(
                "xcresulttool {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl XcresultTool for XcrunTool {
    async fn json(&self, id: Option<&str>) -> ParserResult<Arc<Value>> {
        let stdout = self.run(self.args("json", id)).await?;
        Ok(Arc::new(serde_json::from_slice(&stdout)?))
    }

    async fn raw(&self, id: &str) -> ParserResult<Arc<Vec<u8>>> {
        Ok(Arc::new(self.run(self.args("raw", Some(id))).await?))
    }
}

/// Memoizes another tool by object id for the lifetime of one decode.
///
/// Failures are not cached.
pub struct Memoized<T> {
    inner: T,
    graphs: Mutex<HashMap<Option<String>, Arc<Value>>>,
    payloads: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl<T> Memoized<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            graphs: Mutex::new(HashMap::new()),
            payloads: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<T: XcresultTool> XcresultTool for Memoized<T> {
    async fn json(&self, id: Option<&str>) -> ParserResult<Arc<Value>> {
        let key = id.map(str::to_string);
        if let Some(hit) = lock(&self.graphs).get(&key) {
            return Ok(Arc::clone(hit));
        }
        let value = self.inner.json(id).await?;
        lock(&self.graphs).insert(key, Arc::clone(&value));
        Ok(value)
    }

    async fn raw(&self, id: &str) -> ParserResult<Arc<Vec<u8>>> {
        if let Some(hit) = lock(&self.payloads).get(id) {
            return Ok(Arc::clone(hit));
        }
        let bytes = self.inner.raw(id).await?;
        lock(&self.payloads).insert(id.to_string(), Arc::clone(&bytes));
        Ok(bytes)
    }
}

fn lock<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl XcresultTool for Counting {
        async fn json(&self, id: Option<&str>) -> ParserResult<Arc<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(serde_json::json!({ "id": id })))
        }

        async fn raw(&self, _id: &str) -> ParserResult<Arc<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ParserError::Tool("no payload".into()))
        }
    }

    #[tokio::test]
    async fn test_memoized_queries_each_id_once() {
        let tool = Memoized::new(Counting {
            calls: AtomicUsize::new(0),
        });

        tool.json(Some("a")).await.unwrap();
        tool.json(Some("a")).await.unwrap();
        tool.json(None).await.unwrap();

        assert_eq!(tool.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memoized_does_not_cache_failures() {
        let tool = Memoized::new(Counting {
            calls: AtomicUsize::new(0),
        });

        assert!(tool.raw("p").await.is_err());
        assert!(tool.raw("p").await.is_err());

        assert_eq!(tool.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_args_include_id() {
        let tool = XcrunTool::new(Path::new("/tmp/Run.xcresult"), "xcrun");
        assert_eq!(
            tool.args("raw", Some("payload-1")),
            vec![
                "xcresulttool",
                "get",
                "--path",
                "/tmp/Run.xcresult",
                "--format",
                "raw",
                "--id",
                "payload-1"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_64_retries_with_legacy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-xcrun");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do [ \"$a\" = \"--legacy\" ] && { echo '{\"ok\": true}'; exit 0; }; done\nexit 64\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = XcrunTool::new(Path::new("/tmp/Run.xcresult"), &script.to_string_lossy());
        let value = tool.json(None).await.unwrap();
        assert_eq!(value["ok"], Value::Bool(true));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_other_failures_are_reported() {
        let tool = XcrunTool::new(Path::new("/tmp/Run.xcresult"), "false");
        let err = tool.json(None).await.unwrap_err();
        assert!(matches!(err, ParserError::Tool(_)));
    }
}
