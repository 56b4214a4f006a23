//! Run report types returned by the pipeline driver.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

/// Outcome of one loaded source file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Source CSV.
    pub path: PathBuf,
    /// Rows appended to the target table.
    pub rows: u64,
    /// Wall time for transform + load.
    pub elapsed: Duration,
}

/// Full run report.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Files written by the fetch stage (empty when fetch was skipped).
    pub fetched: Vec<PathBuf>,
    /// Files returned by discovery, in processing order.
    pub discovered: Vec<PathBuf>,
    /// Per-file outcomes, in processing order.
    pub files: Vec<FileReport>,
    /// Total wall time of the run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Rows appended across all files.
    pub fn total_rows(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }
}

/// Builder for run reports.
#[derive(Debug)]
pub struct RunReportBuilder {
    start: Instant,
    report: RunReport,
}

impl Default for RunReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReportBuilder {
    /// Create a new builder and start the total timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            report: RunReport::default(),
        }
    }

    /// Record the files written by the fetch stage.
    pub fn set_fetched(&mut self, files: Vec<PathBuf>) {
        self.report.fetched = files;
    }

    /// Record the discovery result.
    pub fn set_discovered(&mut self, files: Vec<PathBuf>) {
        self.report.discovered = files;
    }

    /// Append a per-file entry.
    pub fn push_file(&mut self, path: PathBuf, rows: u64, elapsed: Duration) {
        self.report.files.push(FileReport {
            path,
            rows,
            elapsed,
        });
    }

    /// Finalize the report.
    pub fn finish(mut self) -> RunReport {
        self.report.elapsed = self.start.elapsed();
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_per_file_rows() {
        let mut builder = RunReportBuilder::new();
        builder.set_discovered(vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
        builder.push_file(PathBuf::from("a.csv"), 3, Duration::from_millis(2));
        builder.push_file(PathBuf::from("b.csv"), 4, Duration::from_millis(1));

        let report = builder.finish();

        assert_eq!(report.total_rows(), 7);
        assert_eq!(report.files.len(), 2);
        assert!(report.fetched.is_empty());
    }

    #[test]
    fn empty_report_has_zero_rows() {
        assert_eq!(RunReportBuilder::default().finish().total_rows(), 0);
    }
}
