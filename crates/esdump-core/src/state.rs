//! Export job state: configuration, planned jobs, slice tasks and results

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExportError;
use crate::plan::plan;
use crate::retry::RetryPolicy;

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// How the slice count is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceMode {
    /// Derived from the index document count
    Auto,
    /// Operator-requested count
    Fixed(u32),
}

impl std::fmt::Display for SliceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Immutable export settings, built once at the boundary.
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub slices: SliceMode,
    /// Upper bound for automatic slice counts
    pub max_slices: u32,
    /// Documents per slice targeted by automatic planning
    pub min_docs_per_slice: u64,
    /// Documents requested per page
    pub page_size: u32,
    /// Maximum slices exported concurrently
    pub concurrency: usize,
    /// Concatenate slice artifacts into one file per index
    pub combine: bool,
    /// Keep slice artifacts after a successful combine
    pub keep_slices: bool,
    /// Gzip level (0-9)
    pub compression_level: u32,
    pub retry: RetryPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let cpus = num_cpus();
        Self {
            output_dir: PathBuf::from("export"),
            slices: SliceMode::Auto,
            max_slices: (cpus * 2) as u32,
            min_docs_per_slice: 100_000,
            page_size: 5_000,
            concurrency: cpus * 2,
            combine: false,
            keep_slices: false,
            compression_level: 6,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-slice artifact: `<output>/<index>/<index>.slice<N>.ndjson.gz`
pub fn slice_path(output_dir: &Path, index: &str, slice_id: u32) -> PathBuf {
    output_dir
        .join(index)
        .join(format!("{index}.slice{slice_id}.ndjson.gz"))
}

/// Combined artifact: `<output>/<index>.ndjson.gz`
pub fn combined_path(output_dir: &Path, index: &str) -> PathBuf {
    output_dir.join(format!("{index}.ndjson.gz"))
}

/// A planned export of one index. Immutable once planned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportJob {
    pub index: String,
    /// Document count at plan time
    pub expected_documents: u64,
    pub slice_count: u32,
    pub output_dir: PathBuf,
    pub combine: bool,
    pub keep_slices: bool,
    pub concurrency: usize,
}

impl ExportJob {
    /// Plan a job for `index` holding `document_count` documents.
    pub fn plan(index: &str, document_count: u64, config: &ExportConfig) -> Self {
        let slice_count = match config.slices {
            SliceMode::Auto => plan(
                document_count,
                config.max_slices,
                config.min_docs_per_slice,
            ),
            SliceMode::Fixed(n) => n.max(1),
        };
        Self {
            index: index.to_string(),
            expected_documents: document_count,
            slice_count,
            output_dir: config.output_dir.clone(),
            combine: config.combine,
            keep_slices: config.keep_slices,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Directory holding this job's slice artifacts
    pub fn slice_dir(&self) -> PathBuf {
        self.output_dir.join(&self.index)
    }

    pub fn slice_path(&self, slice_id: u32) -> PathBuf {
        slice_path(&self.output_dir, &self.index, slice_id)
    }

    pub fn combined_path(&self) -> PathBuf {
        combined_path(&self.output_dir, &self.index)
    }

    /// Worker pool size
    pub fn workers(&self) -> usize {
        (self.slice_count as usize).min(self.concurrency).max(1)
    }

    /// One task per slice, ids `0..slice_count`
    pub fn tasks(&self) -> Vec<SliceTask> {
        (0..self.slice_count)
            .map(|id| SliceTask {
                id,
                max: self.slice_count,
                cursor: None,
                path: self.slice_path(id),
            })
            .collect()
    }
}

/// Work item for one slice, owned by the worker that executes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SliceTask {
    pub id: u32,
    pub max: u32,
    /// Last continuation token issued by the service
    pub cursor: Option<String>,
    /// Destination artifact
    pub path: PathBuf,
}

impl SliceTask {
    /// Log/progress label, e.g. `logs.slice3`
    pub fn label(&self, index: &str) -> String {
        format!("{index}.slice{}", self.id)
    }
}

/// Terminal status of a slice
#[derive(Debug)]
pub enum SliceStatus {
    Success,
    Failed(ExportError),
}

/// Outcome of one slice. Immutable once produced.
#[derive(Debug)]
pub struct SliceResult {
    pub id: u32,
    pub documents: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    pub status: SliceStatus,
}

impl SliceResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, SliceStatus::Success)
    }

    pub fn error(&self) -> Option<&ExportError> {
        match &self.status {
            SliceStatus::Success => None,
            SliceStatus::Failed(e) => Some(e),
        }
    }

    /// Log slice completion (non-TTY mode only).
    pub fn log(&self, index: &str) {
        match &self.status {
            SliceStatus::Success => log::info!(
                "{index}.slice{}: {} documents, {} bytes [{:.1}s]",
                self.id,
                crate::progress::fmt_num(self.documents as usize),
                self.bytes,
                self.elapsed.as_secs_f64()
            ),
            SliceStatus::Failed(e) => log::error!("{index}.slice{} failed: {e}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExportConfig {
        ExportConfig {
            output_dir: PathBuf::from("/out"),
            max_slices: 16,
            min_docs_per_slice: 1_000,
            concurrency: 4,
            ..Default::default()
        }
    }

    #[test]
    fn slice_path_layout() {
        assert_eq!(
            slice_path(Path::new("/out"), "logs", 3),
            PathBuf::from("/out/logs/logs.slice3.ndjson.gz")
        );
        assert_eq!(
            combined_path(Path::new("/out"), "logs"),
            PathBuf::from("/out/logs.ndjson.gz")
        );
    }

    #[test]
    fn auto_plan() {
        let job = ExportJob::plan("logs", 10_000, &config());
        assert_eq!(job.slice_count, 10);
        assert_eq!(job.expected_documents, 10_000);
        assert_eq!(job.workers(), 4);
    }

    #[test]
    fn fixed_plan() {
        let cfg = ExportConfig {
            slices: SliceMode::Fixed(3),
            ..config()
        };
        let job = ExportJob::plan("logs", 10, &cfg);
        assert_eq!(job.slice_count, 3);
        assert_eq!(job.workers(), 3);
    }

    #[test]
    fn fixed_zero_clamped() {
        let cfg = ExportConfig {
            slices: SliceMode::Fixed(0),
            ..config()
        };
        assert_eq!(ExportJob::plan("logs", 10, &cfg).slice_count, 1);
    }

    #[test]
    fn tasks_contiguous_ids() {
        let job = ExportJob::plan("logs", 5_000, &config());
        let tasks = job.tasks();
        let ids: Vec<u32> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(tasks.iter().all(|t| t.max == 5 && t.cursor.is_none()));
        assert_eq!(tasks[2].label("logs"), "logs.slice2");
    }
}
