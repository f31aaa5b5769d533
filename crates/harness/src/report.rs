//! Outcome collection and the run report

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::{Outcome, Verdict};
use crate::error::HarnessResult;

/// Receives outcomes in row order as the dispatcher produces them.
pub trait ReportSink: Send {
    fn record(&mut self, outcome: Outcome);
}

impl ReportSink for Vec<Outcome> {
    fn record(&mut self, outcome: Outcome) {
        self.push(outcome);
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<Outcome>,
}

impl Report {
    pub fn new(outcomes: Vec<Outcome>, duration: Duration) -> Self {
        let count = |verdict: Verdict| outcomes.iter().filter(|o| o.verdict == verdict).count();
        Self {
            generated_at: Utc::now(),
            total: outcomes.len(),
            passed: count(Verdict::Passed),
            failed: count(Verdict::Failed),
            errored: count(Verdict::Errored),
            duration_ms: duration.as_millis() as u64,
            outcomes,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        info!("Report written to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(row_index: usize, verdict: Verdict) -> Outcome {
        Outcome {
            row_index,
            test_type: "site_availability_test".into(),
            url: "https://example.org/".into(),
            verdict,
            message: String::new(),
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_counts() {
        let mut sink: Vec<Outcome> = Vec::new();
        sink.record(outcome(0, Verdict::Passed));
        sink.record(outcome(1, Verdict::Failed));
        sink.record(outcome(2, Verdict::Errored));
        sink.record(outcome(3, Verdict::Passed));

        let report = Report::new(sink, Duration::from_secs(2));
        assert_eq!((report.total, report.passed, report.failed, report.errored), (4, 2, 1, 1));
        assert_eq!(report.duration_ms, 2000);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        let report = Report::new(vec![outcome(0, Verdict::Passed)], Duration::ZERO);
        report.write_json(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert!(parsed.all_passed());
        assert_eq!(parsed.outcomes[0].verdict, Verdict::Passed);
    }
}
