//! Timestamp stream codec (§4.5): a buffered, delta-encoded, optionally
//! zlib-compressed stream of `(tstart, tend)` pairs.

use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Quantizes a non-negative delta to `floor(delta / resolution)`,
/// truncating toward zero, saturating into range rather than wrapping.
pub fn quantize(delta: f64, resolution: f64) -> u32 {
    let units = (delta / resolution).max(0.0);
    if units >= u32::MAX as f64 {
        u32::MAX
    } else {
        units as u32
    }
}

/// Dynamically growing buffer of `(tstart, tend)` deltas, quantized
/// relative to the previous record's `tstart`. Doubles its backing
/// capacity when full; never spills to disk on its own (that happens once,
/// explicitly, at finalize).
pub struct TimestampBuffer {
    resolution: f64,
    prev_tstart: Option<f64>,
    values: Vec<u32>,
    capacity: usize,
}

impl TimestampBuffer {
    pub fn new(resolution: f64, initial_capacity: usize) -> Self {
        TimestampBuffer {
            resolution,
            prev_tstart: None,
            values: Vec::with_capacity(initial_capacity.max(2)),
            capacity: initial_capacity.max(2),
        }
    }

    /// Appends `quantize(tstart - prev_tstart)` and `quantize(tend -
    /// prev_tstart)`, then sets `prev_tstart = tstart` (§4.4 step 5).
    pub fn push(&mut self, tstart: f64, tend: f64) {
        let prev = self.prev_tstart.unwrap_or(tstart);
        let qs = quantize(tstart - prev, self.resolution);
        let qe = quantize(tend - prev, self.resolution);
        if self.values.len() + 2 > self.capacity {
            self.capacity *= 2;
        }
        self.values.push(qs);
        self.values.push(qe);
        self.prev_tstart = Some(tstart);
    }

    pub fn record_count(&self) -> usize {
        self.values.len() / 2
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Renders the buffer to bytes, optionally zlib-compressed
    /// (`Z_DEFAULT_COMPRESSION`, finished as one stream).
    pub fn to_payload(&self, compress: bool) -> io::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            raw.extend_from_slice(&v.to_ne_bytes());
        }
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            encoder.finish()
        } else {
            Ok(raw)
        }
    }
}

/// Decodes a `.ts` payload back into quantized `(tstart, tend)` pairs.
pub fn decode_payload(bytes: &[u8], compressed: bool) -> io::Result<Vec<u32>> {
    let raw = if compressed {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        bytes.to_vec()
    };
    Ok(raw
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
        .collect())
}

/// Reconstructs absolute `(tstart, tend)` pairs from quantized deltas,
/// given the resolution and the rank's base timestamp (§4.5's reader-side
/// numeric semantics). Used by tests to check §8 property 6 (monotonicity).
pub fn reconstruct(values: &[u32], resolution: f64, base_ts: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(values.len() / 2);
    let mut prev_tstart = base_ts;
    for pair in values.chunks_exact(2) {
        let tstart = prev_tstart + pair[0] as f64 * resolution;
        let tend = prev_tstart + pair[1] as f64 * resolution;
        out.push((tstart, tend));
        prev_tstart = tstart;
    }
    out
}

fn rank_ts_path(dir: &Path, rank: i32) -> std::path::PathBuf {
    dir.join(format!("{}.ts", rank))
}

pub fn write_rank_file(dir: &Path, rank: i32, payload: &[u8]) -> io::Result<()> {
    std::fs::write(rank_ts_path(dir, rank), payload)
}

pub fn read_rank_file(dir: &Path, rank: i32) -> io::Result<Vec<u8>> {
    std::fs::read(rank_ts_path(dir, rank))
}

pub fn remove_rank_file(dir: &Path, rank: i32) -> io::Result<()> {
    std::fs::remove_file(rank_ts_path(dir, rank))
}

/// Assembles the trace-wide `recorder.ts`: `total_ranks` `u64` lengths
/// (native `size_t` width assumed 64-bit), then the concatenation of each
/// rank's payload in rank order (§4.5).
pub fn assemble_trace_wide(payloads_in_rank_order: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in payloads_in_rank_order {
        out.extend_from_slice(&(p.len() as u64).to_ne_bytes());
    }
    for p in payloads_in_rank_order {
        out.extend_from_slice(p);
    }
    out
}

pub fn write_trace_wide(dir: &Path, payloads_in_rank_order: &[Vec<u8>]) -> io::Result<()> {
    std::fs::write(
        dir.join("recorder.ts"),
        assemble_trace_wide(payloads_in_rank_order),
    )
}
