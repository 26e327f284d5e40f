//! Writer pipeline (§4.4): the single mutex-protected sink every committed
//! call cascade flows through before it becomes CST/CFG/timestamp state.

use std::sync::Mutex;

use crate::config::Config;
use crate::cst::Cst;
use crate::record::{compose_call_key, Record};
use crate::sequitur::Grammar;
use crate::timestamps::TimestampBuffer;

struct WriterState {
    cst: Cst,
    grammar: Grammar,
    timestamps: TimestampBuffer,
    num_records: u64,
    disabled: bool,
}

/// Owns one rank's mutable trace state. `commit` is the only hot-path entry
/// point and is safe to call from any thread: the lock serializes access,
/// and a failure here never reaches the caller (§7's propagation policy) —
/// it flips `disabled` and the wrapper keeps forwarding to the real library.
pub struct Writer {
    rank: i32,
    store_tid: bool,
    store_call_depth: bool,
    ts_compression: bool,
    state: Mutex<WriterState>,
}

impl Writer {
    pub fn new(rank: i32, config: &Config) -> Self {
        Writer {
            rank,
            store_tid: config.store_tid,
            store_call_depth: config.store_call_depth,
            ts_compression: config.ts_compression,
            state: Mutex::new(WriterState {
                cst: Cst::new(rank),
                grammar: Grammar::init(),
                timestamps: TimestampBuffer::new(
                    config.time_resolution,
                    config.ts_initial_capacity,
                ),
                num_records: 0,
                disabled: false,
            }),
        }
    }

    /// Commits one outermost call's cascade (§4.4 step 5): locks once,
    /// then for each record in entry order composes its key, interns it
    /// into the CST, appends the resulting terminal to the grammar, and
    /// pushes its timestamp delta. A disabled writer drops the whole batch.
    pub fn commit(&self, records: &[Record]) {
        let mut state = self.lock();
        if state.disabled {
            return;
        }
        for record in records {
            let key = compose_call_key(record, self.store_tid, self.store_call_depth);
            let terminal_id = state.cst.intern(&key);
            state.grammar.append_terminal(terminal_id, 1);
            state.timestamps.push(record.tstart, record.tend);
            state.num_records += 1;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WriterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            // A panicking commit leaves the mutex poisoned but the data
            // structures themselves intact; recover rather than wedge the
            // whole process's tracing over one bad batch.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Disables future commits. Called once a failure elsewhere (e.g. an
    /// unwritable trace directory at init) means this rank should stop
    /// tracing without affecting the host program (§7).
    pub fn disable(&self) {
        self.lock().disabled = true;
        log::warn!(
            "[Recorder] tracing disabled for rank {} after an internal failure",
            self.rank
        );
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().disabled
    }

    pub fn num_records(&self) -> u64 {
        self.lock().num_records
    }

    pub fn ts_compression(&self) -> bool {
        self.ts_compression
    }

    /// Consumes the writer, handing finalize (§4.4's exit path) the CST,
    /// grammar and timestamp buffer to persist or merge. No further calls
    /// are possible afterward — that is enforced by ownership, not a flag.
    pub fn into_parts(self) -> (Cst, Grammar, TimestampBuffer, u64) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (state.cst, state.grammar, state.timestamps, state.num_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Tid;
    use crate::functions::FuncId;

    fn rec(tstart: f64, tend: f64) -> Record {
        let mut r = Record::new(FuncId(1), Tid(1), vec![Some("x".into())]);
        r.tstart = tstart;
        r.tend = tend;
        r
    }

    #[test]
    fn commit_grows_cst_grammar_and_timestamps_together() {
        let writer = Writer::new(0, &Config::default());
        writer.commit(&[rec(1.0, 1.1), rec(1.2, 1.3)]);
        assert_eq!(writer.num_records(), 2);
        let (cst, grammar, timestamps, num_records) = writer.into_parts();
        assert_eq!(num_records, 2);
        assert_eq!(cst.len(), 1); // both records share the same call signature
        assert_eq!(timestamps.record_count(), 2);
        assert_eq!(grammar.expand_terminals().len(), 2);
    }

    #[test]
    fn disabled_writer_drops_batches_silently() {
        let writer = Writer::new(0, &Config::default());
        writer.disable();
        writer.commit(&[rec(1.0, 1.1)]);
        assert_eq!(writer.num_records(), 0);
        assert!(writer.is_disabled());
    }

    #[test]
    fn distinct_call_signatures_intern_to_distinct_terminals() {
        let writer = Writer::new(0, &Config::default());
        let mut a = rec(1.0, 1.1);
        a.func_id = FuncId(1);
        let mut b = rec(1.2, 1.3);
        b.func_id = FuncId(2);
        writer.commit(&[a, b]);
        let (cst, _, _, _) = writer.into_parts();
        assert_eq!(cst.len(), 2);
    }
}
