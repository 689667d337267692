//! Upload progress reporting and console output.

use async_trait::async_trait;

use crate::model::Status;
use crate::upload::UploadSummary;

/// Receives events while an upload runs.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Called once the run is resolved and results are batched.
    async fn on_upload_start(&self, run_id: i64, results: usize, batches: usize);

    /// Called after each batch is accepted. Calls may come from any worker.
    async fn on_batch_complete(&self, results: usize);

    /// Called after a fully successful upload.
    async fn on_upload_complete(&self, summary: &UploadSummary);
}

/// A reporter that does nothing (for testing or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_upload_start(&self, _run_id: i64, _results: usize, _batches: usize) {}
    async fn on_batch_complete(&self, _results: usize) {}
    async fn on_upload_complete(&self, _summary: &UploadSummary) {}
}

/// Console reporter that shows upload progress in the terminal.
pub struct ConsoleReporter {
    progress: std::sync::Mutex<Option<indicatif::ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: std::sync::Mutex::new(None),
            verbose,
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Option<indicatif::ProgressBar>> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_upload_start(&self, run_id: i64, results: usize, batches: usize) {
        println!(
            "Uploading {} results to run {} in {} batches",
            results, run_id, batches
        );

        let pb = indicatif::ProgressBar::new(results as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        *self.progress() = Some(pb);
    }

    async fn on_batch_complete(&self, results: usize) {
        if let Some(pb) = self.progress().as_ref() {
            pb.inc(results as u64);
            if self.verbose {
                pb.println(format!("{} batch of {}", console::style("SENT").green(), results));
            }
        }
    }

    async fn on_upload_complete(&self, summary: &UploadSummary) {
        if let Some(pb) = self.progress().take() {
            pb.finish_and_clear();
        }
        print_summary(summary);
    }
}

/// Prints a summary of an upload to the console.
pub fn print_summary(summary: &UploadSummary) {
    println!();
    println!("Upload Results:");
    println!("  Run:     {}", summary.run_id);
    println!("  Total:   {}", summary.total);
    println!("  Batches: {}", summary.batches);

    for (status, count) in &summary.statuses {
        if *count == 0 {
            continue;
        }
        let label = format!("{:<8}", format!("{}:", capitalize(status.as_str())));
        let styled = match status {
            Status::Passed => console::style(count).green(),
            Status::Failed => console::style(count).red(),
            Status::Skipped => console::style(count).yellow(),
            Status::Invalid => console::style(count).red().bold(),
            Status::Blocked => console::style(count).dim(),
        };
        println!("  {} {}", label, styled);
    }

    println!();
    if summary.run_created {
        println!(
            "{}",
            console::style(format!("Run {} created and completed.", summary.run_id))
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            console::style(format!("Results added to run {}.", summary.run_id))
                .green()
                .bold()
        );
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> UploadSummary {
        UploadSummary {
            run_id: 3,
            run_created: true,
            total: 4,
            batches: 2,
            statuses: vec![(Status::Passed, 3), (Status::Failed, 1)],
        }
    }

    #[tokio::test]
    async fn test_console_reporter_lifecycle() {
        let reporter = ConsoleReporter::new(true);
        reporter.on_upload_start(3, 4, 2).await;
        reporter.on_batch_complete(2).await;
        assert_eq!(
            reporter.progress().as_ref().map(|pb| pb.position()),
            Some(2)
        );
        reporter.on_upload_complete(&summary()).await;
        assert!(reporter.progress().is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("passed"), "Passed");
        assert_eq!(capitalize(""), "");
    }
}
