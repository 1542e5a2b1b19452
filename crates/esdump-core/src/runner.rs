//! Export orchestration: plan, fan out slices, combine, verify

use std::fs;
use std::sync::Mutex;
use std::time::Instant;

use indicatif::ProgressBar;

use crate::client::SearchClient;
use crate::combine::{CombineInput, combine, remove_inputs};
use crate::error::ExportError;
use crate::exporter::SliceExporter;
use crate::progress::{ProgressContext, fmt_mb, fmt_num};
use crate::report::{CombinedOutput, JobReport};
use crate::shutdown::CancelToken;
use crate::sink::{cleanup_tmp_files, remove_slice_files};
use crate::state::{ExportConfig, ExportJob, SliceResult};
use crate::verify::verify;
use crate::work_queue::WorkQueue;

/// Count the index, plan its slices, and export it.
///
/// Returns `Err` only for job preconditions: the count request failing
/// (index absent, credentials rejected, retries exhausted) or the output
/// directory being unusable. Slice failures are reported in the [`JobReport`].
pub fn export_index<C: SearchClient + ?Sized>(
    index: &str,
    config: &ExportConfig,
    client: &C,
    cancel: &CancelToken,
    progress: &ProgressContext,
) -> Result<JobReport, ExportError> {
    let label = format!("{index}: count");
    let count = config
        .retry
        .run(&label, cancel, &ProgressBar::hidden(), || client.count(index))?;

    let job = ExportJob::plan(index, count, config);
    if job.slice_count == 1 {
        log::info!(
            "{index}: {} documents, 1 slice (no slicing)",
            fmt_num(count as usize)
        );
    } else {
        log::info!(
            "{index}: {} documents, {} slices ({}), ~{} docs per slice",
            fmt_num(count as usize),
            job.slice_count,
            config.slices,
            fmt_num((count / u64::from(job.slice_count)) as usize)
        );
    }

    run_job(&job, config, client, cancel, progress)
}

/// Run a planned job to completion.
///
/// Slices run on a pool of `min(slice_count, concurrency)` workers. A failed
/// slice does not stop its siblings; cancellation makes every slice that has
/// not finished yet fail with [`ExportError::Cancelled`].
pub fn run_job<C: SearchClient + ?Sized>(
    job: &ExportJob,
    config: &ExportConfig,
    client: &C,
    cancel: &CancelToken,
    progress: &ProgressContext,
) -> Result<JobReport, ExportError> {
    let start = Instant::now();
    let slice_dir = job.slice_dir();
    fs::create_dir_all(&slice_dir)?;
    cleanup_tmp_files(&slice_dir)?;
    let stale = remove_slice_files(&slice_dir, &job.index)?;
    if stale > 0 {
        log::debug!("{}: removed {stale} slice files from an earlier run", job.index);
    }

    let slices = export_slices(job, config, client, cancel, progress)?;
    let failed = slices.iter().filter(|s| !s.is_success()).count();

    let mut report = JobReport {
        index: job.index.clone(),
        expected_documents: job.expected_documents,
        slice_count: job.slice_count,
        slices,
        slice_dir,
        combined: None,
        combine_error: None,
        verification: crate::verify::Verification::Match,
        cancelled: cancel.is_cancelled(),
        elapsed: start.elapsed(),
    };

    if job.combine {
        if failed > 0 {
            log::warn!("{}: {failed} slices failed, not combining", job.index);
        } else {
            match combine_job(job, &report.slices, progress) {
                Ok(combined) => report.combined = Some(combined),
                Err(e) => {
                    log::error!(
                        "{}: combine failed, slice files kept in {}: {e}",
                        job.index,
                        report.slice_dir.display()
                    );
                    report.combine_error = Some(e);
                }
            }
        }
    }

    report.verification = verify(job.expected_documents, report.documents());
    if !report.verification.is_match() {
        log::warn!("{}: verification: {}", job.index, report.verification);
    }
    report.elapsed = start.elapsed();
    Ok(report)
}

/// Fan slices out to the worker pool; results come back ordered by slice id.
fn export_slices<C: SearchClient + ?Sized>(
    job: &ExportJob,
    config: &ExportConfig,
    client: &C,
    cancel: &CancelToken,
    progress: &ProgressContext,
) -> Result<Vec<SliceResult>, ExportError> {
    let workers = job.workers();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("slice-worker-{i}"))
        .build()
        .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;

    let queue = WorkQueue::new(job.tasks());
    let results: Mutex<Vec<SliceResult>> = Mutex::new(Vec::with_capacity(queue.total()));
    let exporter = SliceExporter::new(client, &job.index, config, cancel);
    let is_tty = progress.is_tty();

    log::debug!("{}: {} slices on {workers} workers", job.index, queue.total());

    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| {
                while let Some(task) = queue.take() {
                    let pb = progress.slice_bar(&task.label(&job.index));
                    pb.set_message("connecting...");

                    let result = exporter.run(task, &pb);
                    pb.finish_and_clear();
                    if !is_tty {
                        result.log(&job.index);
                    }
                    results
                        .lock()
                        .expect("worker thread panicked")
                        .push(result);
                }
            });
        }
    });

    let mut results = results.into_inner().expect("worker thread panicked");
    results.sort_by_key(|r| r.id);
    Ok(results)
}

/// Concatenate slice artifacts in slice order; drop them only on full success.
fn combine_job(
    job: &ExportJob,
    slices: &[SliceResult],
    progress: &ProgressContext,
) -> Result<CombinedOutput, ExportError> {
    let start = Instant::now();
    let stage = progress.stage_line("combine");
    stage.set_message(format!("{}: {} files", job.index, slices.len()));

    let inputs: Vec<CombineInput> = slices
        .iter()
        .map(|s| CombineInput {
            path: job.slice_path(s.id),
            expected_bytes: s.bytes,
        })
        .collect();
    let destination = job.combined_path();
    let result = combine(&inputs, &destination);
    stage.finish_and_clear();
    let bytes = result?;

    if !job.keep_slices {
        if let Err(e) = remove_inputs(&inputs, &job.slice_dir()) {
            log::warn!("{}: cannot remove slice files: {e}", job.index);
        }
    }

    let combined = CombinedOutput {
        path: destination,
        bytes,
        documents: slices.iter().map(|s| s.documents).sum(),
        elapsed: start.elapsed(),
    };
    log::info!(
        "{}: combined into {} ({} in {:.1}s)",
        job.index,
        combined.path.display(),
        fmt_mb(combined.bytes),
        combined.elapsed.as_secs_f64()
    );
    Ok(combined)
}
