//! Trace metadata (§3/§6): the `recorder.mt` header and the `VERSION` file.
//!
//! Field order is fixed for on-disk compatibility and must never be
//! reordered without bumping `VERSION_MAJOR`.

use std::io::{self, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::{RecorderError, Result};
use crate::functions::FUNC_NAMES;

pub const VERSION_MAJOR: u32 = 2;
pub const VERSION_MINOR: u32 = 5;
pub const VERSION_PATCH: u32 = 0;

/// The `recorder.mt` header, written once by rank 0 at finalize (§4.4/§6).
///
/// Layout: `total_ranks: i32`, six tracing/capture flags, `start_ts: f64`,
/// `time_resolution: f64`, `ts_buffer_elements: i32`, four more flags —
/// in that exact order, matching the original `RecorderMetadata_t` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub total_ranks: i32,

    pub posix_tracing: bool,
    pub mpi_tracing: bool,
    pub mpiio_tracing: bool,
    pub hdf5_tracing: bool,
    pub store_tid: bool,
    pub store_call_depth: bool,

    pub start_ts: f64,
    pub time_resolution: f64,
    pub ts_buffer_elements: i32,

    pub ts_compression: bool,
    pub interprocess_compression: bool,
    pub interprocess_pattern_recognition: bool,
    pub intraprocess_pattern_recognition: bool,
}

impl Metadata {
    pub fn new(total_ranks: i32, start_ts: f64, config: &Config) -> Self {
        Metadata {
            total_ranks,
            posix_tracing: true,
            mpi_tracing: true,
            mpiio_tracing: true,
            hdf5_tracing: true,
            store_tid: config.store_tid,
            store_call_depth: config.store_call_depth,
            start_ts,
            time_resolution: config.time_resolution,
            ts_buffer_elements: config.ts_initial_capacity as i32,
            ts_compression: config.ts_compression,
            interprocess_compression: config.interprocess_compression,
            interprocess_pattern_recognition: config.interprocess_pattern_recognition,
            intraprocess_pattern_recognition: config.intraprocess_pattern_recognition,
        }
    }

    fn flags(&self) -> [bool; 10] {
        [
            self.posix_tracing,
            self.mpi_tracing,
            self.mpiio_tracing,
            self.hdf5_tracing,
            self.store_tid,
            self.store_call_depth,
            self.ts_compression,
            self.interprocess_compression,
            self.interprocess_pattern_recognition,
            self.intraprocess_pattern_recognition,
        ]
    }

    /// Serializes the struct bytes (native-endian, no padding beyond what
    /// each field naturally needs) followed by newline-terminated function
    /// names in `func_id` order, as `recorder.mt` stores them (§6).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.total_ranks.to_ne_bytes());
        for (i, flag) in self.flags().iter().enumerate() {
            out.push(*flag as u8);
            if i == 5 {
                out.extend_from_slice(&self.start_ts.to_ne_bytes());
                out.extend_from_slice(&self.time_resolution.to_ne_bytes());
                out.extend_from_slice(&self.ts_buffer_elements.to_ne_bytes());
            }
        }
        for name in FUNC_NAMES {
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let total_ranks = read_i32(bytes, &mut pos)?;

        let mut flag = |pos: &mut usize| -> Result<bool> {
            let b = *bytes
                .get(*pos)
                .ok_or_else(|| RecorderError::Invariant("truncated metadata".into()))?;
            *pos += 1;
            Ok(b != 0)
        };
        let posix_tracing = flag(&mut pos)?;
        let mpi_tracing = flag(&mut pos)?;
        let mpiio_tracing = flag(&mut pos)?;
        let hdf5_tracing = flag(&mut pos)?;
        let store_tid = flag(&mut pos)?;
        let store_call_depth = flag(&mut pos)?;

        let start_ts = read_f64(bytes, &mut pos)?;
        let time_resolution = read_f64(bytes, &mut pos)?;
        let ts_buffer_elements = read_i32(bytes, &mut pos)?;

        let ts_compression = flag(&mut pos)?;
        let interprocess_compression = flag(&mut pos)?;
        let interprocess_pattern_recognition = flag(&mut pos)?;
        let intraprocess_pattern_recognition = flag(&mut pos)?;

        Ok(Metadata {
            total_ranks,
            posix_tracing,
            mpi_tracing,
            mpiio_tracing,
            hdf5_tracing,
            store_tid,
            store_call_depth,
            start_ts,
            time_resolution,
            ts_buffer_elements,
            ts_compression,
            interprocess_compression,
            interprocess_pattern_recognition,
            intraprocess_pattern_recognition,
        })
    }

    pub fn write(&self, dir: &Path) -> io::Result<()> {
        std::fs::write(dir.join("recorder.mt"), self.serialize())
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let bytes = std::fs::read(dir.join("recorder.mt"))?;
        Self::deserialize(&bytes)
    }
}

fn read_i32(bytes: &[u8], pos: &mut usize) -> Result<i32> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| RecorderError::Invariant("truncated metadata".into()))?;
    *pos += 4;
    Ok(i32::from_ne_bytes(slice.try_into().unwrap()))
}

fn read_f64(bytes: &[u8], pos: &mut usize) -> Result<f64> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| RecorderError::Invariant("truncated metadata".into()))?;
    *pos += 8;
    Ok(f64::from_ne_bytes(slice.try_into().unwrap()))
}

/// Writes the bare `major.minor.patch` `VERSION` file (no trailing newline).
pub fn write_version_file(dir: &Path) -> io::Result<()> {
    let mut f = std::fs::File::create(dir.join("VERSION"))?;
    write!(f, "{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

pub fn read_version_file(dir: &Path) -> io::Result<String> {
    std::fs::read_to_string(dir.join("VERSION"))
}

/// Compatibility check (§7): major and minor must match exactly; patch may
/// differ freely.
pub fn is_compatible_version(trace_version: &str) -> bool {
    parse_major_minor(trace_version) == Some((VERSION_MAJOR, VERSION_MINOR))
}

fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let config = Config::default();
        let meta = Metadata::new(4, 12.5, &config);
        let bytes = meta.serialize();
        // the struct prefix precedes the function-name trailer.
        let prefix_len = bytes.len() - FUNC_NAMES.iter().map(|n| n.len() + 1).sum::<usize>();
        let back = Metadata::deserialize(&bytes[..prefix_len]).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn version_file_round_trips() {
        let dir = std::env::temp_dir().join("recorder_metadata_test_version");
        std::fs::create_dir_all(&dir).unwrap();
        write_version_file(&dir).unwrap();
        let contents = read_version_file(&dir).unwrap();
        assert_eq!(contents, "2.5.0");
        assert!(is_compatible_version(&contents));
        assert!(is_compatible_version("2.5.9"));
        assert!(!is_compatible_version("3.0.0"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn metadata_file_round_trips_on_disk() {
        let dir = std::env::temp_dir().join("recorder_metadata_test_mt");
        std::fs::create_dir_all(&dir).unwrap();
        let config = Config::default();
        let meta = Metadata::new(2, 0.0, &config);
        meta.write(&dir).unwrap();
        let back = Metadata::read(&dir).unwrap();
        assert_eq!(back, meta);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
