//! Inter-process merger (§4.6): recursive-doubling CST merge, per-rank CFG
//! terminal remapping, whole-grammar deduplication, and the offset-pattern
//! recognition pass that runs ahead of the merge.
//!
//! Every collective here is expressed against [`crate::transport::Transport`]
//! rather than a concrete MPI binding — see that module's header comment.

use std::io::{self, Write};
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use rustc_hash::FxHashMap;

use crate::cst::{Cst, CstEntry};
use crate::record;
use crate::sequitur::Grammar;
use crate::transport::Transport;

/// Recursive-doubling merge (§4.6): at phase `k`, rank `r` exchanges with
/// `r XOR (1<<k)`; the lower-numbered rank of the pair receives and merges,
/// the higher-numbered rank sends once and drops out. After `ceil(log2(size))`
/// phases rank 0 holds every entry; it renumbers terminal ids contiguously
/// in the canonical by-terminal-id order and broadcasts the final table back
/// to every rank, so all ranks remap their CFG against identical ids.
pub fn merge_csts(local: &Cst, transport: &dyn Transport) -> Cst {
    let rank = transport.rank();
    let size = transport.size();

    let mut merged = Cst::new(rank);
    for (key, entry) in local.iter() {
        merged.insert_raw(key.to_vec(), entry.clone());
    }

    if size <= 1 {
        merged.renumber_contiguous();
        return merged;
    }

    let phases = phase_count(size);
    let mut done = false;
    for k in 0..phases {
        if done {
            break;
        }
        let mask = 1 << k;
        let partner = rank ^ mask;
        if partner >= size {
            continue;
        }
        if rank < partner {
            let bytes = transport.recv(partner);
            let incoming = Cst::deserialize_merged(&bytes);
            for (key, entry) in incoming.iter() {
                merged.merge_entry(key.to_vec(), entry.clone());
            }
        } else {
            transport.send(partner, merged.serialize_merged());
            done = true;
        }
    }

    if rank == 0 {
        merged.renumber_contiguous();
    }
    let final_bytes = transport.broadcast_from_root(
        0,
        if rank == 0 {
            Some(merged.serialize_merged())
        } else {
            None
        },
    );
    Cst::deserialize_merged(&final_bytes)
}

fn phase_count(size: i32) -> u32 {
    let mut phases = 0u32;
    while (1i32 << phases) < size {
        phases += 1;
    }
    phases
}

/// Builds the per-local-terminal-id remapping array a rank needs to rewrite
/// its own CFG's terminals against the final merged CST (§4.6's "CFG
/// terminal remapping"). `local` must be the same table the rank interned
/// its terminals against; `merged` is the table `merge_csts` returned.
pub fn build_remap(local: &Cst, merged: &Cst) -> Vec<i32> {
    let mut remap = vec![0i32; local.len_terminal_ids().max(0) as usize];
    for (key, entry) in local.entries_by_terminal_id() {
        let global_id = merged
            .get(key)
            .expect("merged CST is missing a locally-interned key")
            .terminal_id;
        remap[entry.terminal_id as usize] = global_id;
    }
    remap
}

/// Rewrites every terminal occurrence in `grammar` from local to global
/// terminal ids, per the remap built from [`build_remap`].
pub fn remap_grammar(grammar: &mut Grammar, remap: &[i32]) {
    grammar.update(remap);
}

/// One rank's serialized, flattened grammar (`Grammar::serialize`'s `Vec<i32>`
/// form) rendered to the byte layout persisted on disk (native-endian `i32`
/// words, §6).
pub fn flatten_grammar(serialized: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(serialized.len() * 4);
    for v in serialized {
        out.extend_from_slice(&v.to_ne_bytes());
    }
    out
}

/// One globally unique grammar blob plus the table mapping each rank to the
/// blob it shares (§4.6 "whole-grammar deduplication"): ranks whose CFG
/// serializes identically after remapping point at the same slot.
pub struct UniqueGrammars {
    pub blobs: Vec<Vec<u8>>,
    pub rank_to_blob: Vec<i32>,
}

/// Deduplicates the per-rank flattened, remapped grammars. `flattened_by_rank`
/// must be indexed by rank (rank 0 first).
pub fn dedup_grammars(flattened_by_rank: &[Vec<u8>]) -> UniqueGrammars {
    let mut seen: FxHashMap<Vec<u8>, i32> = FxHashMap::default();
    let mut blobs = Vec::new();
    let mut rank_to_blob = Vec::with_capacity(flattened_by_rank.len());
    for bytes in flattened_by_rank {
        let id = *seen.entry(bytes.clone()).or_insert_with(|| {
            blobs.push(bytes.clone());
            (blobs.len() - 1) as i32
        });
        rank_to_blob.push(id);
    }
    UniqueGrammars { blobs, rank_to_blob }
}

/// Locates the `arg_idx`-th (0-based) space-delimited argument within a
/// composed call-signature key and parses it as a base-10 integer, returning
/// `(value, start, end)` — `start..end` is the byte range of the digits
/// within `key`, for later substitution.
fn parse_offset_arg(key: &[u8], arg_idx: usize) -> Option<(i64, usize, usize)> {
    if key.len() <= record::KEY_ARGS_START {
        return None;
    }
    let args = &key[record::KEY_ARGS_START..];
    let mut idx = 0usize;
    let mut start = 0usize;
    for (i, &b) in args.iter().enumerate() {
        if b == b' ' {
            if idx == arg_idx {
                let s = std::str::from_utf8(&args[start..i]).ok()?;
                return Some((
                    s.parse().ok()?,
                    record::KEY_ARGS_START + start,
                    record::KEY_ARGS_START + i,
                ));
            }
            idx += 1;
            start = i + 1;
        }
    }
    if idx == arg_idx {
        let s = std::str::from_utf8(&args[start..]).ok()?;
        return Some((
            s.parse().ok()?,
            record::KEY_ARGS_START + start,
            record::KEY_ARGS_START + args.len(),
        ));
    }
    None
}

/// Rebuilds a key with the `arg_idx`-th argument replaced by `pattern`,
/// fixing up the `arg_strlen` field to match.
fn substitute_offset_arg(key: &[u8], arg_idx: usize, pattern: &str) -> Vec<u8> {
    let (_, start, end) =
        parse_offset_arg(key, arg_idx).expect("offset argument must be present to substitute");
    let prefix_end = record::KEY_ARGS_START - 4;

    let mut new_args = Vec::with_capacity(key.len());
    new_args.extend_from_slice(&key[record::KEY_ARGS_START..start]);
    new_args.extend_from_slice(pattern.as_bytes());
    new_args.extend_from_slice(&key[end..]);

    let mut new_key = Vec::with_capacity(prefix_end + 4 + new_args.len());
    new_key.extend_from_slice(&key[..prefix_end]);
    new_key.extend_from_slice(&(new_args.len() as i32).to_ne_bytes());
    new_key.extend_from_slice(&new_args);
    new_key
}

fn gather_and_broadcast(transport: &dyn Transport, local: Vec<u8>) -> Vec<u8> {
    let rank = transport.rank();
    let size = transport.size();
    if rank == 0 {
        let mut all = local;
        for r in 1..size {
            all.extend(transport.recv(r));
        }
        for r in 1..size {
            transport.send(r, all.clone());
        }
        all
    } else {
        transport.send(0, local);
        transport.recv(0)
    }
}

/// Offset-pattern recognition (§4.6): for every local call signature of
/// `func_id` whose `offset_arg_idx`-th argument is a base-10 offset, checks
/// whether the same positional call's offset varies linearly with rank
/// across the whole run (`offset_r = a*r + b`). If so, rewrites that
/// argument to the symbolic pattern `"a*r+b"` so every rank's occurrence
/// collapses onto one call-signature key instead of one per rank.
///
/// Runs on each rank's *local* CST, ahead of [`merge_csts`] — by the time
/// CSTs are merged, a collapsed entry is already a single key rather than
/// one per rank.
pub fn interprocess_pattern_recognition(
    cst: &mut Cst,
    func_id: u8,
    offset_arg_idx: usize,
    transport: &dyn Transport,
) {
    let rank = transport.rank() as i64;
    let size = transport.size();
    if size <= 2 {
        return;
    }

    let local_matches: Vec<(Vec<u8>, i64)> = cst
        .iter()
        .filter(|(key, _)| record::key_func_id(key) == func_id)
        .filter_map(|(key, _)| {
            parse_offset_arg(key, offset_arg_idx).map(|(offset, _, _)| (key.to_vec(), offset))
        })
        .collect();

    for (key, offset) in local_matches {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&offset.to_ne_bytes());
        let gathered = gather_and_broadcast(transport, buf);
        let offsets: Vec<i64> = gathered
            .chunks_exact(8)
            .map(|c| i64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        if offsets.len() < 2 {
            continue;
        }
        let a = offsets[1] - offsets[0];
        let b = offsets[0];
        let uniform = offsets
            .iter()
            .enumerate()
            .all(|(r, &o)| o == a * r as i64 + b);
        if uniform {
            let _ = rank;
            let pattern = format!("{}*r+{}", a, b);
            let new_key = substitute_offset_arg(&key, offset_arg_idx, &pattern);
            cst.rekey(&key, new_key);
        }
    }
}

/// Gathers each rank's flattened, remapped grammar to rank 0 in rank order
/// (§4.6 "Grammar deduplication"). Unlike the CST merge this needs no
/// associative reduction, so it is a plain point-to-point gather: rank 0
/// collects, every other rank just sends and gets `None` back.
pub fn gather_grammars(local_flat: Vec<u8>, transport: &dyn Transport) -> Option<Vec<Vec<u8>>> {
    let rank = transport.rank();
    let size = transport.size();
    if rank == 0 {
        let mut all = Vec::with_capacity(size as usize);
        all.push(local_flat);
        for r in 1..size {
            all.push(transport.recv(r));
        }
        Some(all)
    } else {
        transport.send(0, local_flat);
        None
    }
}

fn compress_blob(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Writes `ug.cfg` (each unique grammar zlib-compressed independently,
/// concatenated) and `ug.mt` (`rank -> ug_id` array followed by the unique
/// grammar count), per §6's layout table.
pub fn write_unique_grammars(dir: &Path, unique: &UniqueGrammars) -> io::Result<()> {
    let mut cfg_bytes = Vec::new();
    for blob in &unique.blobs {
        cfg_bytes.extend_from_slice(&compress_blob(blob)?);
    }
    std::fs::write(dir.join("ug.cfg"), cfg_bytes)?;

    let mut mt_bytes = Vec::with_capacity(unique.rank_to_blob.len() * 4 + 4);
    for &ug_id in &unique.rank_to_blob {
        mt_bytes.extend_from_slice(&ug_id.to_ne_bytes());
    }
    mt_bytes.extend_from_slice(&(unique.blobs.len() as i32).to_ne_bytes());
    std::fs::write(dir.join("ug.mt"), mt_bytes)
}

/// The no-interprocess-compression fallback (§4.6 "Fallback"): each rank
/// persists its own local CST and CFG under `{rank}.cst` / `{rank}.cfg`
/// rather than participating in the merge at all.
pub fn fallback_local_artifacts(cst: &Cst, grammar: &Grammar) -> (Vec<u8>, Vec<u8>) {
    (cst.serialize_local(), flatten_grammar(&grammar.serialize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequitur::Grammar;
    use crate::transport::ChannelTransport;
    use std::thread;

    fn cst_from(rank: i32, keys: &[&[u8]]) -> Cst {
        let mut cst = Cst::new(rank);
        for k in keys {
            cst.intern(k);
        }
        cst
    }

    #[test]
    fn merge_combines_disjoint_and_shared_keys_across_four_ranks() {
        let transports = ChannelTransport::cluster(4);
        let locals = vec![
            cst_from(0, &[b"shared", b"only_on_0"]),
            cst_from(1, &[b"shared", b"only_on_1"]),
            cst_from(2, &[b"shared"]),
            cst_from(3, &[b"shared", b"only_on_3"]),
        ];

        let handles: Vec<_> = transports
            .into_iter()
            .zip(locals)
            .map(|(t, local)| thread::spawn(move || merge_csts(&local, &t)))
            .collect();
        let results: Vec<Cst> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for merged in &results {
            assert_eq!(merged.len(), 5);
            assert_eq!(merged.get(b"shared").unwrap().count, 4);
            assert_eq!(merged.get(b"only_on_0").unwrap().count, 1);
        }
        // every rank's broadcast final table is byte-identical.
        let reference = results[0].serialize_merged();
        for merged in &results[1..] {
            assert_eq!(merged.serialize_merged(), reference);
        }
    }

    #[test]
    fn remap_rewrites_only_terminal_occurrences() {
        let local = cst_from(0, &[b"a", b"b"]);
        let mut merged = Cst::new(0);
        // merged assigns "b" id 0 and "a" id 1, the opposite of local.
        merged.insert_raw(
            b"b".to_vec(),
            CstEntry {
                terminal_id: 0,
                origin_rank: 0,
                count: 1,
            },
        );
        merged.insert_raw(
            b"a".to_vec(),
            CstEntry {
                terminal_id: 1,
                origin_rank: 0,
                count: 1,
            },
        );

        let remap = build_remap(&local, &merged);
        let mut grammar = Grammar::init();
        grammar.append_terminal(0, 1); // local id for "a"
        grammar.append_terminal(1, 1); // local id for "b"
        remap_grammar(&mut grammar, &remap);
        assert_eq!(grammar.expand_terminals(), vec![1, 0]);
    }

    #[test]
    fn gather_grammars_collects_in_rank_order_and_writes_ug_files() {
        let transports = ChannelTransport::cluster(3);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let local = vec![t.rank() as u8; 2];
                    gather_grammars(local, &t)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        let gathered = results[0].clone().unwrap();
        assert_eq!(gathered, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);

        let unique = dedup_grammars(&gathered);
        let dir = std::env::temp_dir().join("recorder_merge_test_ug");
        std::fs::create_dir_all(&dir).unwrap();
        write_unique_grammars(&dir, &unique).unwrap();
        assert!(dir.join("ug.cfg").is_file());
        assert!(dir.join("ug.mt").is_file());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dedup_grammars_groups_identical_blobs() {
        let a = vec![1u8, 2, 3];
        let b = vec![1u8, 2, 3];
        let c = vec![9u8];
        let result = dedup_grammars(&[a, b, c]);
        assert_eq!(result.blobs.len(), 2);
        assert_eq!(result.rank_to_blob, vec![0, 0, 1]);
    }

    #[test]
    fn pattern_recognition_collapses_linear_offsets_across_ranks() {
        use crate::clock::Tid;
        use crate::functions::FuncId;
        use crate::record::{compose_call_key, Record};

        let size = 4;
        let transports = ChannelTransport::cluster(size);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let rank = t.rank();
                    let offset = rank as i64 * 1024;
                    let record = Record::new(
                        FuncId(6),
                        Tid(1),
                        vec![Some("3".into()), Some(offset.to_string()), Some("512".into())],
                    );
                    let key = compose_call_key(&record, true, true);
                    let mut cst = Cst::new(rank);
                    cst.intern(&key);
                    interprocess_pattern_recognition(&mut cst, 6, 1, &t);
                    cst
                })
            })
            .collect();

        for h in handles {
            let cst = h.join().unwrap();
            assert_eq!(cst.len(), 1);
            let (key, _) = cst.iter().next().unwrap();
            let args = std::str::from_utf8(&key[record::KEY_ARGS_START..]).unwrap();
            assert_eq!(args, "3 1024*r+0 512");
        }
    }

    #[test]
    fn pattern_recognition_leaves_non_linear_offsets_untouched() {
        use crate::clock::Tid;
        use crate::functions::FuncId;
        use crate::record::{compose_call_key, Record};

        let size = 4;
        let transports = ChannelTransport::cluster(size);
        let handles: Vec<_> = transports
            .into_iter()
            .map(|t| {
                thread::spawn(move || {
                    let rank = t.rank();
                    // rank 2 breaks the linear pattern.
                    let offset = if rank == 2 { 99 } else { rank as i64 * 100 };
                    let record =
                        Record::new(FuncId(6), Tid(1), vec![Some(offset.to_string())]);
                    let key = compose_call_key(&record, true, true);
                    let mut cst = Cst::new(rank);
                    cst.intern(&key);
                    interprocess_pattern_recognition(&mut cst, 6, 0, &t);
                    cst
                })
            })
            .collect();

        for h in handles {
            let cst = h.join().unwrap();
            let (key, _) = cst.iter().next().unwrap();
            let args = std::str::from_utf8(&key[record::KEY_ARGS_START..]).unwrap();
            assert!(!args.contains('*'));
        }
    }
}
