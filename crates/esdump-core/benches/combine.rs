use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use esdump_core::{CombineInput, GzipSink, combine};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::value::RawValue;

fn synthetic_slices(dir: &Path, slices: usize, docs: usize) -> Vec<CombineInput> {
    (0..slices)
        .map(|s| {
            let path = dir.join(format!("bench.slice{s}.ndjson.gz"));
            let mut sink = GzipSink::create(&path, 6).unwrap();
            for i in 0..docs {
                let doc = format!(
                    r#"{{"id":{i},"slice":{s},"message":"synthetic log line {i}","level":"info"}}"#
                );
                sink.write_document(&RawValue::from_string(doc).unwrap())
                    .unwrap();
            }
            let stats = sink.finalize().unwrap();
            CombineInput {
                path,
                expected_bytes: stats.bytes,
            }
        })
        .collect()
}

fn recompress(inputs: &[CombineInput], destination: &Path) {
    let out = BufWriter::new(File::create(destination).unwrap());
    let mut encoder = GzEncoder::new(out, Compression::new(6));
    for input in inputs {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(&input.path).unwrap()));
        io::copy(&mut decoder, &mut encoder).unwrap();
    }
    encoder.finish().unwrap();
}

#[divan::bench(args = [4, 16])]
fn member_concatenation(bencher: divan::Bencher, slices: usize) {
    let dir = tempfile::tempdir().unwrap();
    let inputs = synthetic_slices(dir.path(), slices, 20_000);
    let destination = dir.path().join("combined.ndjson.gz");
    bencher.bench(|| combine(&inputs, &destination).unwrap());
}

#[divan::bench(args = [4, 16])]
fn decompress_recompress(bencher: divan::Bencher, slices: usize) {
    let dir = tempfile::tempdir().unwrap();
    let inputs = synthetic_slices(dir.path(), slices, 20_000);
    let destination = dir.path().join("merged.ndjson.gz");
    bencher.bench(|| recompress(&inputs, &destination));
}

fn main() {
    divan::main();
}
