//! Run statistics and summary tables

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use esdump_core::{JobReport, JobStatus, Verification, fmt_mb, fmt_num};

/// Exit status when the run was interrupted by a signal
const EXIT_CANCELLED: u8 = 130;

/// Print a key-value table on stderr
pub fn print_table(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Human-readable duration: `42.1s`, `3m 12s`, `1h 04m`
pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{}m {:02}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    } else {
        format!("{}h {:02}m", (secs / 3600.0) as u64, ((secs % 3600.0) / 60.0) as u64)
    }
}

fn fmt_verification(v: Verification) -> String {
    match v {
        Verification::Match => "match".to_string(),
        Verification::Mismatch(delta) if delta > 0 => {
            format!("{} fewer than counted", fmt_num(delta.unsigned_abs() as usize))
        }
        Verification::Mismatch(delta) => {
            format!("{} more than counted", fmt_num(delta.unsigned_abs() as usize))
        }
    }
}

/// Per-index summary table
pub fn print_index_summary(report: &JobReport) {
    let failed = report.failed_slices();
    let mut rows = vec![
        ("Expected", fmt_num(report.expected_documents as usize)),
        ("Exported", fmt_num(report.documents() as usize)),
        ("Verification", fmt_verification(report.verification)),
        ("Status", report.status().to_string()),
        ("Slices", report.slice_count.to_string()),
    ];
    if !failed.is_empty() {
        let ids: Vec<String> = failed.iter().map(u32::to_string).collect();
        rows.push(("Failed slices", ids.join(", ")));
    }
    rows.push(("Time", fmt_duration(report.elapsed)));
    rows.push((
        "Throughput",
        format!("{} docs/s", fmt_num(report.throughput() as usize)),
    ));
    match &report.combined {
        Some(combined) => {
            rows.push(("Output", combined.path.display().to_string()));
            rows.push(("Combined size", fmt_mb(combined.bytes)));
        }
        None => {
            rows.push(("Output", format!("{}/", report.slice_dir.display())));
            rows.push(("Size", fmt_mb(report.bytes())));
        }
    }
    if let Some(e) = &report.combine_error {
        rows.push(("Combine error", e.to_string()));
    }
    print_table(&report.index, &rows);
}

/// Aggregate over every index of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
    pub mismatched: Vec<String>,
    pub expected_documents: u64,
    pub exported_documents: u64,
    pub combined: Vec<(PathBuf, u64)>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, report: &JobReport) {
        self.expected_documents += report.expected_documents;
        self.exported_documents += report.documents();
        if let Some(combined) = &report.combined {
            self.combined.push((combined.path.clone(), combined.bytes));
        }
        match report.status() {
            JobStatus::Success => self.successful.push(report.index.clone()),
            JobStatus::PartialFailure | JobStatus::Failed => self.failed.push(report.index.clone()),
        }
        if !report.verification.is_match() {
            self.mismatched.push(report.index.clone());
        }
    }

    /// Index whose export could not start
    pub fn record_error(&mut self, index: &str) {
        self.failed.push(index.to_string());
    }

    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// 130 when cancelled, 1 on any failure or count mismatch, else 0
    pub fn exit_code(&self, cancelled: bool) -> ExitCode {
        ExitCode::from(self.exit_status(cancelled))
    }

    fn exit_status(&self, cancelled: bool) -> u8 {
        if cancelled {
            EXIT_CANCELLED
        } else if !self.failed.is_empty() || !self.mismatched.is_empty() {
            1
        } else {
            0
        }
    }

    pub fn print(&self) {
        let mut rows = vec![
            ("Indices", self.total().to_string()),
            ("Successful", self.successful.len().to_string()),
            ("Failed", self.failed.len().to_string()),
        ];
        if !self.failed.is_empty() {
            rows.push(("Failed indices", self.failed.join(", ")));
        }
        rows.push(("Expected documents", fmt_num(self.expected_documents as usize)));
        rows.push(("Exported documents", fmt_num(self.exported_documents as usize)));
        if !self.mismatched.is_empty() {
            rows.push(("Count mismatches", self.mismatched.join(", ")));
        }
        rows.push(("Total time", fmt_duration(self.elapsed)));
        let secs = self.elapsed.as_secs_f64();
        if self.exported_documents > 0 && secs > 0.0 {
            rows.push((
                "Throughput",
                format!(
                    "{} docs/s",
                    fmt_num((self.exported_documents as f64 / secs) as usize)
                ),
            ));
        }
        for (path, bytes) in &self.combined {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            rows.push(("Combined", format!("{name} ({})", fmt_mb(*bytes))));
        }
        print_table("Summary", &rows);
    }
}
