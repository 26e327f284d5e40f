//! Call-Signature Table (§4.2): deduplicates Records and assigns stable
//! integer terminal ids, content-addressed on the canonical byte key
//! (§3/§6).

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CstEntry {
    pub terminal_id: i32,
    pub origin_rank: i32,
    pub count: u32,
}

/// A content-addressed map from call-signature key to (terminal_id,
/// occurrence_count, originating_rank). Insertion order assigns terminal
/// ids 0, 1, 2, ... on first sight.
pub struct Cst {
    rank: i32,
    entries: FxHashMap<Vec<u8>, CstEntry>,
    next_terminal_id: i32,
}

impl Cst {
    pub fn new(rank: i32) -> Self {
        Cst {
            rank,
            entries: FxHashMap::default(),
            next_terminal_id: 0,
        }
    }

    /// `intern(key) -> terminal_id`: O(1) expected, hashing the raw key
    /// bytes directly (no owned-string render per lookup).
    pub fn intern(&mut self, key: &[u8]) -> i32 {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.count += 1;
            return entry.terminal_id;
        }
        let terminal_id = self.next_terminal_id;
        self.next_terminal_id += 1;
        self.entries.insert(
            key.to_vec(),
            CstEntry {
                terminal_id,
                origin_rank: self.rank,
                count: 1,
            },
        );
        terminal_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by terminal id — the spec's required "canonical
    /// visiting order derivable solely from the data" (§4.2, §9) so that
    /// two merged CSTs with byte-identical content serialize identically.
    pub fn entries_by_terminal_id(&self) -> Vec<(&[u8], &CstEntry)> {
        let mut v: Vec<(&[u8], &CstEntry)> =
            self.entries.iter().map(|(k, e)| (k.as_slice(), e)).collect();
        v.sort_by_key(|(_, e)| e.terminal_id);
        v
    }

    pub fn get(&self, key: &[u8]) -> Option<&CstEntry> {
        self.entries.get(key)
    }

    /// Replaces an existing entry's key (used by pattern recognition,
    /// §4.6) while preserving its terminal id, origin rank and count.
    pub fn rekey(&mut self, old_key: &[u8], new_key: Vec<u8>) {
        if let Some(entry) = self.entries.remove(old_key) {
            self.entries.insert(new_key, entry);
        }
    }

    /// Local layout (§4.2/§6): `[entry_count, (terminal_id, key_len,
    /// key_bytes)...]`, visited by terminal id.
    pub fn serialize_local(&self) -> Vec<u8> {
        let entries = self.entries_by_terminal_id();
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as i32).to_ne_bytes());
        for (key, entry) in entries {
            out.extend_from_slice(&entry.terminal_id.to_ne_bytes());
            out.extend_from_slice(&(key.len() as i32).to_ne_bytes());
            out.extend_from_slice(key);
        }
        out
    }

    /// Merged layout: `[entry_count, (terminal_id, origin_rank, key_len,
    /// count, key_bytes)...]`, visited by terminal id.
    pub fn serialize_merged(&self) -> Vec<u8> {
        let entries = self.entries_by_terminal_id();
        let mut out = Vec::new();
        out.extend_from_slice(&(entries.len() as i32).to_ne_bytes());
        for (key, entry) in entries {
            out.extend_from_slice(&entry.terminal_id.to_ne_bytes());
            out.extend_from_slice(&entry.origin_rank.to_ne_bytes());
            out.extend_from_slice(&(key.len() as i32).to_ne_bytes());
            out.extend_from_slice(&entry.count.to_ne_bytes());
            out.extend_from_slice(key);
        }
        out
    }

    pub fn deserialize_merged(bytes: &[u8]) -> Self {
        let mut cst = Cst::new(0);
        let mut pos = 0usize;
        let count = read_i32(bytes, &mut pos);
        let mut max_terminal = -1;
        for _ in 0..count {
            let terminal_id = read_i32(bytes, &mut pos);
            let origin_rank = read_i32(bytes, &mut pos);
            let key_len = read_i32(bytes, &mut pos) as usize;
            let occ_count = read_u32(bytes, &mut pos);
            let key = bytes[pos..pos + key_len].to_vec();
            pos += key_len;
            max_terminal = max_terminal.max(terminal_id);
            cst.entries.insert(
                key,
                CstEntry {
                    terminal_id,
                    origin_rank,
                    count: occ_count,
                },
            );
        }
        cst.next_terminal_id = max_terminal + 1;
        cst
    }

    /// Iterates `(key, entry)` pairs in arbitrary order; used internally by
    /// the merger, which re-derives a deterministic order itself.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &CstEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_slice(), e))
    }

    pub fn insert_raw(&mut self, key: Vec<u8>, entry: CstEntry) {
        self.next_terminal_id = self.next_terminal_id.max(entry.terminal_id + 1);
        self.entries.insert(key, entry);
    }

    pub fn len_terminal_ids(&self) -> i32 {
        self.next_terminal_id
    }

    /// Merges one incoming entry (§4.6 CST merge): if the key is already
    /// present, add counts; otherwise insert the incoming fields verbatim.
    pub fn merge_entry(&mut self, key: Vec<u8>, incoming: CstEntry) {
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.count += incoming.count;
        } else {
            self.next_terminal_id = self.next_terminal_id.max(incoming.terminal_id + 1);
            self.entries.insert(key, incoming);
        }
    }

    /// Renumbers every entry's `terminal_id` contiguously from 0, in
    /// terminal-id order (the spec's required deterministic visiting
    /// order, §9).
    pub fn renumber_contiguous(&mut self) {
        let ordered_keys: Vec<Vec<u8>> = self
            .entries_by_terminal_id()
            .into_iter()
            .map(|(k, _)| k.to_vec())
            .collect();
        for (new_id, key) in ordered_keys.into_iter().enumerate() {
            self.entries.get_mut(&key).unwrap().terminal_id = new_id as i32;
        }
        self.next_terminal_id = self.entries.len() as i32;
    }
}

fn read_i32(bytes: &[u8], pos: &mut usize) -> i32 {
    let v = i32::from_ne_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_ne_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_assigns_sequential_ids_and_dedupes() {
        let mut cst = Cst::new(0);
        assert_eq!(cst.intern(b"a"), 0);
        assert_eq!(cst.intern(b"b"), 1);
        assert_eq!(cst.intern(b"a"), 0);
        assert_eq!(cst.get(b"a").unwrap().count, 2);
        assert_eq!(cst.len(), 2);
    }

    #[test]
    fn local_round_trips_through_merged_layout() {
        let mut cst = Cst::new(3);
        cst.intern(b"alpha");
        cst.intern(b"beta");
        cst.intern(b"alpha");
        let bytes = cst.serialize_merged();
        let back = Cst::deserialize_merged(&bytes);
        assert_eq!(back.get(b"alpha").unwrap().count, 2);
        assert_eq!(back.get(b"beta").unwrap().count, 1);
        assert_eq!(back.get(b"alpha").unwrap().origin_rank, 3);
    }

    #[test]
    fn serialize_merged_is_byte_equal_for_equal_content() {
        let mut a = Cst::new(0);
        a.intern(b"x");
        a.intern(b"y");
        let mut b = Cst::new(0);
        b.intern(b"x");
        b.intern(b"y");
        assert_eq!(a.serialize_merged(), b.serialize_merged());
    }
}
