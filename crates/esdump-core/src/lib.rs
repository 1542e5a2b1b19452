//! esdump core - parallel sliced export of search indices to gzip NDJSON
//!
//! Plans a slice count per index, exports every slice on a bounded worker
//! pool through a streaming gzip sink, optionally concatenates the slice
//! artifacts into one gzip file, and verifies the written document count.
//! The remote service is abstracted behind [`SearchClient`].

pub mod client;
pub mod combine;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod plan;
pub mod progress;
pub mod report;
pub mod retry;
pub mod runner;
pub mod shutdown;
pub mod sink;
pub mod state;
pub mod verify;
pub mod work_queue;

// Re-exports for convenience
pub use client::{Page, PageRequest, SearchClient};
pub use combine::{CombineInput, combine};
pub use error::ExportError;
pub use exporter::SliceExporter;
pub use logging::{IndicatifLogger, init_logging};
pub use plan::plan;
pub use progress::{ProgressContext, SharedProgress, fmt_mb, fmt_num};
pub use report::{CombinedOutput, JobReport, JobStatus};
pub use retry::RetryPolicy;
pub use runner::{export_index, run_job};
pub use shutdown::CancelToken;
pub use sink::GzipSink;
pub use state::{ExportConfig, ExportJob, SliceMode, SliceResult, SliceStatus, SliceTask};
pub use verify::{Verification, verify};
