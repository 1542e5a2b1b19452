//! Gzip member concatenation of per-slice artifacts
//!
//! A gzip file may hold several members back to back; decoders read it as
//! the concatenation of the members' contents. Appending the raw bytes of
//! each slice artifact in slice order therefore yields one valid artifact
//! without touching the compressed payload.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::sink::has_gzip_header;

/// One per-slice artifact to append
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombineInput {
    pub path: PathBuf,
    /// Byte count reported when the artifact was written
    pub expected_bytes: u64,
}

fn integrity(path: &Path, reason: impl Into<String>) -> ExportError {
    ExportError::CombineIntegrity {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Check an artifact before copying: gzip header present, size as written.
fn check_input(input: &CombineInput) -> Result<(), ExportError> {
    let len = fs::metadata(&input.path)
        .map_err(|e| integrity(&input.path, format!("cannot stat: {e}")))?
        .len();
    if len != input.expected_bytes {
        return Err(integrity(
            &input.path,
            format!("size {len} != written {}", input.expected_bytes),
        ));
    }
    let is_gzip = has_gzip_header(&input.path)
        .map_err(|e| integrity(&input.path, format!("cannot read: {e}")))?;
    if !is_gzip {
        return Err(integrity(&input.path, "not a gzip member"));
    }
    Ok(())
}

/// Concatenate `inputs` (in order) into `destination`, returning bytes written.
///
/// Writes to `<destination>.tmp` and renames on success; on any error the
/// temporary file is removed and `destination` is left untouched. Inputs are
/// never modified.
pub fn combine(inputs: &[CombineInput], destination: &Path) -> Result<u64, ExportError> {
    let mut tmp_name = destination.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    match append_all(inputs, &tmp_path) {
        Ok(written) => {
            fs::rename(&tmp_path, destination)?;
            Ok(written)
        }
        Err(e) => {
            if tmp_path.exists() {
                if let Err(rm) = fs::remove_file(&tmp_path) {
                    log::warn!("Cannot remove {}: {rm}", tmp_path.display());
                }
            }
            Err(e)
        }
    }
}

fn append_all(inputs: &[CombineInput], tmp_path: &Path) -> Result<u64, ExportError> {
    for input in inputs {
        check_input(input)?;
    }

    let mut out = File::create(tmp_path)?;
    let mut written = 0u64;
    for input in inputs {
        let mut src = File::open(&input.path)?;
        let copied = io::copy(&mut src, &mut out)?;
        if copied != input.expected_bytes {
            return Err(integrity(
                &input.path,
                format!("copied {copied} of {} bytes", input.expected_bytes),
            ));
        }
        written += copied;
    }
    out.flush()?;
    out.sync_all()?;
    Ok(written)
}

/// Remove per-slice artifacts, then their directory if it is left empty.
pub fn remove_inputs(inputs: &[CombineInput], slice_dir: &Path) -> io::Result<()> {
    for input in inputs {
        fs::remove_file(&input.path)?;
    }
    if fs::read_dir(slice_dir)?.next().is_none() {
        fs::remove_dir(slice_dir)?;
    }
    Ok(())
}
