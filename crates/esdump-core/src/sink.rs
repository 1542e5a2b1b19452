//! Gzip NDJSON sink with atomic tmp→rename

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::value::RawValue;

/// Buffer size between the encoder and the file (256KB)
const WRITE_BUF_SIZE: usize = 256 * 1024;

/// Gzip member header: magic bytes + deflate method
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Smallest valid gzip member: 10-byte header, empty deflate block, 8-byte trailer
pub const GZIP_MIN_LEN: u64 = 20;

/// Writer wrapper that tracks bytes written
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Bytes and documents in a finalized artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkStats {
    pub documents: u64,
    pub bytes: u64,
}

/// Streams documents as newline-delimited JSON through gzip into a temporary file.
///
/// [`finalize`](GzipSink::finalize) closes the gzip member and renames the
/// file into place, so the final path only ever holds a complete member.
pub struct GzipSink {
    encoder: GzEncoder<CountingWriter<BufWriter<File>>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    documents: u64,
}

impl std::fmt::Debug for GzipSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipSink")
            .field("final_path", &self.final_path)
            .field("documents", &self.documents)
            .finish_non_exhaustive()
    }
}

impl GzipSink {
    /// Create a sink for `final_path`, writing to `<final_path>.tmp` until finalized.
    pub fn create(final_path: &Path, level: u32) -> io::Result<Self> {
        let mut tmp_name = final_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let writer = CountingWriter::new(BufWriter::with_capacity(WRITE_BUF_SIZE, file));
        let encoder = GzEncoder::new(writer, Compression::new(level.min(9)));

        Ok(Self {
            encoder,
            tmp_path,
            final_path: final_path.to_path_buf(),
            documents: 0,
        })
    }

    /// Write one document as a single JSON line.
    pub fn write_document(&mut self, doc: &RawValue) -> io::Result<()> {
        let text = doc.get();
        if text.contains(['\n', '\r']) {
            // Pretty-printed source: re-serialize compactly to keep one document per line
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(io::Error::other)?;
            serde_json::to_writer(&mut self.encoder, &value).map_err(io::Error::other)?;
        } else {
            self.encoder.write_all(text.as_bytes())?;
        }
        self.encoder.write_all(b"\n")?;
        self.documents += 1;
        Ok(())
    }

    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Close the gzip member, flush, and atomically rename tmp → final.
    pub fn finalize(self) -> io::Result<SinkStats> {
        let counting = self.encoder.finish()?;
        let bytes = counting.count();
        let file = counting.into_inner().into_inner().map_err(|e| e.into_error())?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(SinkStats {
            documents: self.documents,
            bytes,
        })
    }

    /// Drop the partial output without producing an artifact.
    pub fn abandon(self) {
        let tmp_path = self.tmp_path.clone();
        drop(self.encoder);
        if let Err(e) = fs::remove_file(&tmp_path) {
            log::warn!("Cannot remove {}: {e}", tmp_path.display());
        }
    }
}

/// Check that a file starts with a gzip member header and is long enough to hold one.
pub fn has_gzip_header(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() < GZIP_MIN_LEN {
        return Ok(false);
    }
    let mut magic = [0u8; 3];
    file.read_exact(&mut magic)?;
    Ok(magic == GZIP_MAGIC)
}

/// Remove slice artifacts of `index` left in `dir` by an earlier run
pub fn remove_slice_files(dir: &Path, index: &str) -> io::Result<usize> {
    let prefix = format!("{index}.slice");
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_slice = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".ndjson.gz"))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
        if is_slice {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn raw(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    fn read_gz(path: &Path) -> String {
        let mut out = String::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn writes_one_line_per_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.ndjson.gz");
        let mut sink = GzipSink::create(&path, 6).unwrap();
        sink.write_document(&raw(r#"{"a":1}"#)).unwrap();
        sink.write_document(&raw(r#"{"b":"x"}"#)).unwrap();
        let stats = sink.finalize().unwrap();

        assert_eq!(stats.documents, 2);
        assert_eq!(stats.bytes, std::fs::metadata(&path).unwrap().len());
        assert_eq!(read_gz(&path), "{\"a\":1}\n{\"b\":\"x\"}\n");
        assert!(!dir.path().join("a.ndjson.gz.tmp").exists());
    }

    #[test]
    fn pretty_printed_document_compacted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.ndjson.gz");
        let mut sink = GzipSink::create(&path, 1).unwrap();
        sink.write_document(&raw("{\n  \"a\": [1,\r\n 2]\n}")).unwrap();
        sink.finalize().unwrap();
        assert_eq!(read_gz(&path), "{\"a\":[1,2]}\n");
    }

    #[test]
    fn empty_sink_is_valid_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.ndjson.gz");
        let stats = GzipSink::create(&path, 6).unwrap().finalize().unwrap();
        assert_eq!(stats.documents, 0);
        assert!(stats.bytes >= GZIP_MIN_LEN);
        assert!(has_gzip_header(&path).unwrap());
        assert_eq!(read_gz(&path), "");
    }

    #[test]
    fn abandon_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.ndjson.gz");
        let mut sink = GzipSink::create(&path, 6).unwrap();
        sink.write_document(&raw("{}")).unwrap();
        sink.abandon();
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn has_gzip_header_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.gz");
        std::fs::write(&path, b"this is definitely not gzip").unwrap();
        assert!(!has_gzip_header(&path).unwrap());
        std::fs::write(&path, [0x1f, 0x8b, 0x08]).unwrap();
        assert!(!has_gzip_header(&path).unwrap());
    }

    #[test]
    fn remove_slice_files_matches_only_own_slices() {
        let dir = TempDir::new().unwrap();
        for name in [
            "logs.slice0.ndjson.gz",
            "logs.slice12.ndjson.gz",
            "logs-a.slice0.ndjson.gz",
            "logs.slicex.ndjson.gz",
            "logs.ndjson.gz",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        assert_eq!(remove_slice_files(dir.path(), "logs").unwrap(), 2);

        assert!(!dir.path().join("logs.slice0.ndjson.gz").exists());
        assert!(!dir.path().join("logs.slice12.ndjson.gz").exists());
        assert!(dir.path().join("logs-a.slice0.ndjson.gz").exists());
        assert!(dir.path().join("logs.slicex.ndjson.gz").exists());
        assert!(dir.path().join("logs.ndjson.gz").exists());
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ndjson.gz.tmp"), b"stale").unwrap();
        std::fs::write(dir.path().join("b.ndjson.gz"), b"keep").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.ndjson.gz.tmp").exists());
        assert!(dir.path().join("b.ndjson.gz").exists());
    }
}
