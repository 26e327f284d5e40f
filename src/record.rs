//! The data model (§3): a captured call and its canonical byte key.

use crate::clock::Tid;
use crate::functions::FuncId;

/// One captured call. Ephemeral: built by a wrapper, consumed by the
/// writer pipeline, then discarded.
#[derive(Debug, Clone)]
pub struct Record {
    pub tstart: f64,
    pub tend: f64,
    pub func_id: FuncId,
    /// How many intercepted calls from the same thread were on the stack
    /// when this call began; the outermost call has depth 0. Assigned by
    /// [`crate::capture::CaptureStack::enter`], not by the caller.
    pub call_depth: u8,
    pub tid: Tid,
    /// Already-rendered argument strings; a `None` slot is a missing
    /// argument, rendered as `???` in the signature key. Rendering the
    /// arguments themselves is an external (per-library) concern.
    pub args: Vec<Option<String>>,
}

impl Record {
    pub fn new(func_id: FuncId, tid: Tid, args: Vec<Option<String>>) -> Self {
        Record {
            tstart: 0.0,
            tend: 0.0,
            func_id,
            call_depth: 0,
            tid,
            args,
        }
    }

    pub fn arg_count(&self) -> u8 {
        self.args.len() as u8
    }
}

/// Replaces internal spaces with `_` and renders a missing argument as
/// `???`, matching the canonical call-signature key encoding (§3/§6).
fn render_arg(arg: &Option<String>) -> String {
    match arg {
        Some(s) => s.replace(' ', "_"),
        None => "???".to_string(),
    }
}

/// Builds the canonical Call Signature Key (§3, §6) for `record`, honoring
/// the `store_tid` / `store_call_depth` capture flags by zeroing those
/// fields when disabled (§4.4 step 1).
///
/// Layout: `tid: u64`, `func_id: u8`, `call_depth: u8`, `arg_count: u8`,
/// `arg_strlen: i32`, then `arg_strlen` bytes of space-joined arguments.
/// No trailing space.
pub fn compose_call_key(record: &Record, store_tid: bool, store_call_depth: bool) -> Vec<u8> {
    let tid = if store_tid { record.tid.0 } else { 0 };
    let call_depth = if store_call_depth { record.call_depth } else { 0 };

    let rendered: Vec<String> = record.args.iter().map(render_arg).collect();
    let joined = rendered.join(" ");
    let arg_strlen = joined.len() as i32;

    let mut key = Vec::with_capacity(8 + 1 + 1 + 1 + 4 + joined.len());
    key.extend_from_slice(&tid.to_ne_bytes());
    key.push(record.func_id.0);
    key.push(call_depth);
    key.push(record.arg_count());
    key.extend_from_slice(&arg_strlen.to_ne_bytes());
    key.extend_from_slice(joined.as_bytes());
    key
}

/// Byte offset within a composed key where the argument bytes begin, i.e.
/// the fixed-size prefix length (`tid + func_id + call_depth + arg_count +
/// arg_strlen`). Used by the inter-process pattern-recognition pass to
/// locate an argument substring without re-parsing the whole key.
pub const KEY_ARGS_START: usize = 8 + 1 + 1 + 1 + 4;

/// Extracts `func_id` from a composed key.
pub fn key_func_id(key: &[u8]) -> u8 {
    key[8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut r = Record::new(
            FuncId(6),
            Tid(42),
            vec![Some("3".into()), Some("0x0".into()), Some("100".into())],
        );
        r.call_depth = 2;
        r
    }

    #[test]
    fn key_respects_capture_flags() {
        let r = sample_record();
        let with_both = compose_call_key(&r, true, true);
        let without_either = compose_call_key(&r, false, false);
        assert_ne!(with_both, without_either);
        assert_eq!(&without_either[0..8], &0u64.to_ne_bytes());
        assert_eq!(without_either[8 + 1], 0);
    }

    #[test]
    fn missing_argument_renders_as_placeholder() {
        let r = Record::new(FuncId::USER, Tid(1), vec![None, Some("a b".into())]);
        let key = compose_call_key(&r, true, true);
        let args_bytes = &key[KEY_ARGS_START..];
        assert_eq!(std::str::from_utf8(args_bytes).unwrap(), "??? a_b");
    }

    #[test]
    fn key_has_no_trailing_space() {
        let r = Record::new(FuncId(0), Tid(1), vec![Some("x".into())]);
        let key = compose_call_key(&r, true, true);
        assert_eq!(key.last().copied().unwrap(), b'x');
    }

    #[test]
    fn identical_records_produce_identical_keys() {
        let a = sample_record();
        let b = sample_record();
        assert_eq!(
            compose_call_key(&a, true, true),
            compose_call_key(&b, true, true)
        );
    }
}
