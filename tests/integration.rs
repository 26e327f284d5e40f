//! End-to-end scenarios (§8) exercised through the public `Recorder` API
//! and `ChannelTransport`, rather than a single module's unit tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;

use recorder_core::clock::FixedClock;
use recorder_core::config::Config;
use recorder_core::cst::Cst;
use recorder_core::functions::FuncId;
use recorder_core::metadata::Metadata;
use recorder_core::record::KEY_ARGS_START;
use recorder_core::transport::{ChannelTransport, Transport};
use recorder_core::Recorder;

fn scratch_dir(name: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// S5: two ranks with one shared call signature and one unique call each —
/// after finalize with `interprocess_compression`, rank 0's merged `0.cst`
/// must hold both the shared entry (counted across ranks) and the two
/// unique ones, and `recorder.ts` must be the trace-wide file rather than
/// two leftover per-rank `.ts` files.
#[test]
fn s5_two_rank_cst_merge_produces_trace_wide_artifacts() {
    let dir = scratch_dir("recorder_integration_s5");
    let transports = ChannelTransport::cluster(2);

    let handles: Vec<_> = transports
        .into_iter()
        .map(|t| {
            let dir = dir.clone();
            thread::spawn(move || {
                let rank = t.rank();
                let clock = Arc::new(FixedClock::new(vec![0.0, 0.1, 0.2, 0.3]));
                let recorder = Recorder::init(rank, Config::default(), clock);

                let shared = recorder.begin_call(FuncId(2), vec![Some("shared.txt".into())]);
                recorder.end_call(shared);
                let unique = recorder.begin_call(
                    FuncId(5),
                    vec![Some(format!("only_on_rank_{}", rank))],
                );
                recorder.end_call(unique);

                recorder
                    .finalize(&dir, 2, 100.0, &t, &[])
                    .expect("finalize should succeed");
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(dir.join("0.cst").is_file());
    assert!(!dir.join("1.cst").is_file());
    assert!(dir.join("recorder.ts").is_file());
    assert!(!dir.join("0.ts").is_file());
    assert!(!dir.join("1.ts").is_file());

    let merged = Cst::deserialize_merged(&std::fs::read(dir.join("0.cst")).unwrap());
    assert_eq!(merged.len(), 3);
    let shared_entry = merged
        .iter()
        .find(|(key, _)| &key[KEY_ARGS_START..] == b"shared.txt")
        .expect("shared call signature must survive the merge")
        .1;
    assert_eq!(shared_entry.count, 2);

    let metadata = Metadata::read(&dir).unwrap();
    assert_eq!(metadata.total_ranks, 2);
    assert_eq!(metadata.start_ts, 100.0);

    std::fs::remove_dir_all(&dir).unwrap();
}

/// S6: four ranks whose offset argument grows linearly with rank.
/// `interprocess_pattern_recognition` must collapse the four per-rank
/// occurrences into the single `"1024*r+0"` call-signature key before the
/// CST merge runs, so the merged table holds one entry with count 4 rather
/// than four distinct entries.
#[test]
fn s6_four_rank_offset_pattern_recognition_collapses_before_merge() {
    let dir = scratch_dir("recorder_integration_s6");
    let transports = ChannelTransport::cluster(4);

    let mut config = Config::default();
    config.interprocess_pattern_recognition = true;

    let handles: Vec<_> = transports
        .into_iter()
        .map(|t| {
            let dir = dir.clone();
            let config = config.clone();
            thread::spawn(move || {
                let rank = t.rank();
                let clock = Arc::new(FixedClock::new(vec![0.0, 0.1]));
                let recorder = Recorder::init(rank, config, clock);

                let offset = rank as i64 * 1024;
                let handle = recorder.begin_call(
                    FuncId(6),
                    vec![Some("3".into()), Some(offset.to_string()), Some("512".into())],
                );
                recorder.end_call(handle);

                recorder
                    .finalize(&dir, 4, 0.0, &t, &[(FuncId(6), 1)])
                    .expect("finalize should succeed");
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let merged = Cst::deserialize_merged(&std::fs::read(dir.join("0.cst")).unwrap());
    assert_eq!(merged.len(), 1);
    let (key, entry) = merged.iter().next().unwrap();
    assert_eq!(entry.count, 4);
    let args = std::str::from_utf8(&key[KEY_ARGS_START..]).unwrap();
    assert_eq!(args, "3 1024*r+0 512");

    std::fs::remove_dir_all(&dir).unwrap();
}
