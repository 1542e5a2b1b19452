//! Single-slice export: paginated fetch → gzip NDJSON artifact

use std::fs;
use std::time::Instant;

use indicatif::ProgressBar;

use crate::client::{PageRequest, SearchClient};
use crate::error::ExportError;
use crate::progress::upgrade_to_bar;
use crate::retry::RetryPolicy;
use crate::shutdown::CancelToken;
use crate::sink::{GzipSink, SinkStats};
use crate::state::{ExportConfig, SliceResult, SliceStatus, SliceTask};

/// Drives one slice's fetch session and streams it into its artifact.
///
/// Shared by all workers of a job; each call to [`run`](SliceExporter::run)
/// owns its [`SliceTask`] exclusively.
pub struct SliceExporter<'a, C: SearchClient + ?Sized> {
    client: &'a C,
    index: &'a str,
    page_size: u32,
    compression_level: u32,
    retry: RetryPolicy,
    cancel: &'a CancelToken,
}

impl<'a, C: SearchClient + ?Sized> SliceExporter<'a, C> {
    pub fn new(client: &'a C, index: &'a str, config: &ExportConfig, cancel: &'a CancelToken) -> Self {
        Self {
            client,
            index,
            page_size: config.page_size.max(1),
            compression_level: config.compression_level,
            retry: config.retry,
            cancel,
        }
    }

    /// Export one slice. Never panics on remote or local errors; they end up
    /// in the returned [`SliceResult`].
    ///
    /// The server-side cursor is released on every exit path.
    pub fn run(&self, mut task: SliceTask, pb: &ProgressBar) -> SliceResult {
        let start = Instant::now();
        let label = task.label(self.index);
        log::debug!("{label}: started ({}/{})", task.id, task.max);

        let outcome = self.export(&mut task, &label, pb);
        self.release(&mut task, &label);

        let (documents, bytes, status) = match outcome {
            Ok(stats) => (stats.documents, stats.bytes, SliceStatus::Success),
            Err(e) => {
                if !e.is_cancelled() {
                    log::error!("{label}: failed: {e}");
                }
                if task.path.exists() {
                    if let Err(rm) = fs::remove_file(&task.path) {
                        log::warn!("{label}: cannot remove {}: {rm}", task.path.display());
                    }
                }
                (0, 0, SliceStatus::Failed(e))
            }
        };
        SliceResult {
            id: task.id,
            documents,
            bytes,
            elapsed: start.elapsed(),
            status,
        }
    }

    fn export(
        &self,
        task: &mut SliceTask,
        label: &str,
        pb: &ProgressBar,
    ) -> Result<SinkStats, ExportError> {
        let mut sink = GzipSink::create(&task.path, self.compression_level)?;
        match self.fetch_all(task, &mut sink, label, pb) {
            Ok(()) => {
                pb.set_message("finalizing...");
                let stats = sink.finalize()?;
                log::debug!("{label}: {} documents, {} bytes", stats.documents, stats.bytes);
                Ok(stats)
            }
            Err(e) => {
                sink.abandon();
                Err(e)
            }
        }
    }

    /// Fetch loop. Ends when the service reports no further pages or a page
    /// comes back empty.
    fn fetch_all(
        &self,
        task: &mut SliceTask,
        sink: &mut GzipSink,
        label: &str,
        pb: &ProgressBar,
    ) -> Result<(), ExportError> {
        let mut first = true;
        loop {
            if self.cancel.is_cancelled() {
                log::debug!("{label}: cancelled");
                return Err(ExportError::Cancelled);
            }

            let page = self.retry.run(label, self.cancel, pb, || {
                self.client.fetch_page(&PageRequest {
                    index: self.index,
                    slice_id: task.id,
                    slice_max: task.max,
                    page_size: self.page_size,
                    cursor: task.cursor.as_deref(),
                })
            })?;

            if let Some(cursor) = page.cursor {
                task.cursor = Some(cursor);
            }
            if first {
                if let Some(total) = page.total_hint {
                    upgrade_to_bar(pb, total);
                }
                pb.set_message("fetching...");
                first = false;
            }

            for doc in &page.documents {
                sink.write_document(doc)?;
            }
            pb.set_position(sink.documents());

            if page.exhausted || page.documents.is_empty() {
                return Ok(());
            }
        }
    }

    fn release(&self, task: &mut SliceTask, label: &str) {
        if let Some(cursor) = task.cursor.take() {
            if let Err(e) = self.client.release(&cursor) {
                log::warn!("{label}: cannot release cursor: {e}");
            }
        }
    }
}
