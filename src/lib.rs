//! Recorder core (§2): a Call-Signature Table, a Sequitur-derived grammar, a
//! compressed timestamp stream and a per-thread capture stack, merged
//! across ranks at finalize. Interception, argument formatting, directory
//! creation, offline reading and replay are all external collaborators'
//! jobs — this crate only covers the compression and trace-emission engine.

pub mod capture;
pub mod clock;
pub mod config;
pub mod cst;
pub mod error;
pub mod functions;
pub mod merge;
pub mod metadata;
pub mod record;
pub mod sequitur;
pub mod timestamps;
pub mod transport;
pub mod writer;

use std::path::Path;
use std::sync::Arc;

use capture::CaptureStack;
use clock::{Clock, Tid};
use config::Config;
use error::Result;
use functions::FuncId;
use merge::{
    build_remap, dedup_grammars, fallback_local_artifacts, flatten_grammar, gather_grammars,
    interprocess_pattern_recognition, merge_csts, write_unique_grammars,
};
use record::Record;
use transport::Transport;
use writer::Writer;

/// One call in flight, handed back by [`Recorder::begin_call`] and consumed
/// by [`Recorder::end_call`]; carries the record across the real library
/// call so the wrapper can fill in `tend` once it returns.
pub struct CallHandle {
    record: Record,
}

/// Ties the capture stack, writer, and (at finalize) the merger together
/// for one process. Constructed once at process init, consumed once at
/// finalize — there is no reopening a finalized `Recorder`.
pub struct Recorder {
    rank: i32,
    config: Config,
    clock: Arc<dyn Clock>,
    writer: Writer,
}

impl Recorder {
    pub fn init(rank: i32, config: Config, clock: Arc<dyn Clock>) -> Self {
        let writer = Writer::new(rank, &config);
        Recorder {
            rank,
            config,
            clock,
            writer,
        }
    }

    /// Begins capturing one call (§4.3): stamps `tstart`, assigns
    /// `call_depth` from this thread's capture stack, and queues the record.
    /// `args` are already-rendered argument strings; rendering them is an
    /// external, per-library concern (§1).
    pub fn begin_call(&self, func_id: FuncId, args: Vec<Option<String>>) -> CallHandle {
        let mut record = Record::new(func_id, Tid::current(), args);
        record.tstart = self.clock.now();
        CaptureStack::enter(&mut record);
        CallHandle { record }
    }

    /// Ends the call started by `begin_call`: stamps `tend`, then — once
    /// this was the outermost call in its cascade — commits every queued
    /// record to the writer in entry order (§4.3/§4.4). A wrapper that
    /// panics mid-call should let `handle` drop instead: see
    /// [`capture::CaptureGuard`] for the RAII form.
    pub fn end_call(&self, mut handle: CallHandle) {
        handle.record.tend = self.clock.now();
        if let Some(batch) = CaptureStack::exit_with(handle.record) {
            self.writer.commit(&batch);
        }
    }

    pub fn disable(&self) {
        self.writer.disable();
    }

    pub fn is_disabled(&self) -> bool {
        self.writer.is_disabled()
    }

    pub fn num_records(&self) -> u64 {
        self.writer.num_records()
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finalizes this rank's trace into `dir` (§4.4's exit path, §4.6).
    /// `total_ranks` and `start_ts` come from the embedding collaborator,
    /// since the core doesn't itself discover rank counts or process start
    /// time. When `interprocess_compression` is set, `transport` drives the
    /// §4.6 merge and grammar dedup; pass
    /// [`transport::SingleProcessTransport`] for a single-rank run, which
    /// degenerates the merge to the identity. `offset_pattern_candidates`
    /// names the `(func_id, offset_arg_idx)` pairs §4.6's offset-pattern
    /// recognition should check when
    /// `config.interprocess_pattern_recognition` is set — which functions
    /// take a byte offset, and at which argument position, is a
    /// per-library concern external to the core (§1), so the embedding
    /// collaborator supplies the list rather than the core hardcoding one.
    pub fn finalize(
        self,
        dir: &Path,
        total_ranks: i32,
        start_ts: f64,
        transport: &dyn Transport,
        offset_pattern_candidates: &[(FuncId, usize)],
    ) -> Result<()> {
        let config = self.config.clone();
        let rank = self.rank;
        let (mut local_cst, mut grammar, timestamps, _num_records) = self.writer.into_parts();

        if config.interprocess_pattern_recognition {
            for &(func_id, offset_arg_idx) in offset_pattern_candidates {
                interprocess_pattern_recognition(
                    &mut local_cst,
                    func_id.0,
                    offset_arg_idx,
                    transport,
                );
            }
        }

        let ts_payload = timestamps.to_payload(config.ts_compression)?;
        timestamps::write_rank_file(dir, rank, &ts_payload)?;
        transport::barrier(transport);
        if rank == 0 {
            let mut payloads = Vec::with_capacity(total_ranks as usize);
            for r in 0..total_ranks {
                payloads.push(timestamps::read_rank_file(dir, r)?);
            }
            timestamps::write_trace_wide(dir, &payloads)?;
            for r in 0..total_ranks {
                timestamps::remove_rank_file(dir, r)?;
            }
        }

        if config.interprocess_compression {
            let merged = merge_csts(&local_cst, transport);
            let remap = build_remap(&local_cst, &merged);
            grammar.update(&remap);

            let flat = flatten_grammar(&grammar.serialize());
            if let Some(gathered) = gather_grammars(flat, transport) {
                let unique = dedup_grammars(&gathered);
                write_unique_grammars(dir, &unique)?;
                std::fs::write(dir.join(format!("{}.cst", rank)), merged.serialize_merged())?;
            }
        } else {
            let (cst_bytes, cfg_bytes) = fallback_local_artifacts(&local_cst, &grammar);
            std::fs::write(dir.join(format!("{}.cst", rank)), cst_bytes)?;
            std::fs::write(dir.join(format!("{}.cfg", rank)), cfg_bytes)?;
        }

        if rank == 0 {
            let metadata = metadata::Metadata::new(total_ranks, start_ts, &config);
            metadata.write(dir)?;
            metadata::write_version_file(dir)?;
        }

        Ok(())
    }
}
