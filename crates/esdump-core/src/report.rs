//! Job report: the terminal artifact of an export job

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExportError;
use crate::state::SliceResult;
use crate::verify::Verification;

/// Overall outcome of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Every slice succeeded, and combine (if requested) succeeded
    Success,
    /// Every slice succeeded but combine failed; slice artifacts preserved
    PartialFailure,
    /// At least one slice failed
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::Failed => "failed",
        })
    }
}

/// Combined per-index artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedOutput {
    pub path: PathBuf,
    pub bytes: u64,
    pub documents: u64,
    pub elapsed: Duration,
}

/// Aggregate of all slice results plus verification outcome.
#[derive(Debug)]
pub struct JobReport {
    pub index: String,
    /// Document count at plan time
    pub expected_documents: u64,
    pub slice_count: u32,
    /// Ordered by slice id
    pub slices: Vec<SliceResult>,
    pub slice_dir: PathBuf,
    pub combined: Option<CombinedOutput>,
    pub combine_error: Option<ExportError>,
    pub verification: Verification,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn status(&self) -> JobStatus {
        if self.slices.iter().any(|s| !s.is_success()) {
            JobStatus::Failed
        } else if self.combine_error.is_some() {
            JobStatus::PartialFailure
        } else {
            JobStatus::Success
        }
    }

    /// Documents written by successful slices
    pub fn documents(&self) -> u64 {
        self.slices
            .iter()
            .filter(|s| s.is_success())
            .map(|s| s.documents)
            .sum()
    }

    /// Compressed bytes written by successful slices
    pub fn bytes(&self) -> u64 {
        self.slices
            .iter()
            .filter(|s| s.is_success())
            .map(|s| s.bytes)
            .sum()
    }

    pub fn failed_slices(&self) -> Vec<u32> {
        self.slices
            .iter()
            .filter(|s| !s.is_success())
            .map(|s| s.id)
            .collect()
    }

    /// Documents per second over the whole job
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.documents() as f64 / secs
        } else {
            0.0
        }
    }
}
