//! The Sequitur grammar engine (§4.1): an online, linear-time inferencer
//! over a stream of integer terminals, enforcing digram-uniqueness and
//! rule-utility at every step.
//!
//! Symbols are arena-allocated and addressed by index rather than by
//! pointer (§9's preferred strategy for determinism and debuggability).
//! Two arenas are kept, one per the algorithm's two structurally distinct
//! node roles: [`BodySymbol`] (a terminal or non-terminal occurrence inside
//! some rule's body) and [`RuleHead`] (a rule: its body's head/tail and its
//! reference count). The original implementation unifies both into one
//! struct and distinguishes them with a `rule_head == NULL` check; keeping
//! them as separate arenas removes that ambiguity and the pointer-trick
//! used to find a list's tail in O(1) (here each `RuleHead` just stores its
//! own tail index).

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

#[derive(Debug, Clone)]
struct BodySymbol {
    value: i32,
    exp: u32,
    terminal: bool,
    /// Set only for non-terminal occurrences: the rule this occurrence
    /// denotes.
    references: Option<RuleId>,
    /// The rule whose body contains this occurrence.
    container: RuleId,
    prev: Option<SymbolId>,
    next: Option<SymbolId>,
}

#[derive(Debug, Clone)]
struct RuleHead {
    id: i32,
    body_head: Option<SymbolId>,
    body_tail: Option<SymbolId>,
    ref_count: u32,
    list_prev: Option<RuleId>,
    list_next: Option<RuleId>,
}

type DigramKey = (i32, u32, i32, u32);

/// A context-free grammar built incrementally by [`Grammar::append_terminal`].
pub struct Grammar {
    symbols: Vec<Option<BodySymbol>>,
    rules: Vec<Option<RuleHead>>,
    rules_list_head: Option<RuleId>,
    rules_list_tail: Option<RuleId>,
    start_rule: RuleId,
    next_rule_id: i32,
    twins_removal: bool,
    digram_table: FxHashMap<DigramKey, SymbolId>,
}

impl Grammar {
    /// `init(start_rule_id, twins_removal_enabled)`.
    pub fn new(start_rule_id: i32, twins_removal: bool) -> Self {
        let mut g = Grammar {
            symbols: Vec::new(),
            rules: Vec::new(),
            rules_list_head: None,
            rules_list_tail: None,
            start_rule: RuleId(0), // placeholder, fixed up below
            next_rule_id: start_rule_id,
            twins_removal,
            digram_table: FxHashMap::default(),
        };
        let start = g.new_rule();
        g.rule_list_append(start);
        g.start_rule = start;
        g
    }

    /// Convenience matching `sequitur_init`: start rule id −1, twins
    /// removal on.
    pub fn init() -> Self {
        Grammar::new(-1, true)
    }

    // -- arena helpers -----------------------------------------------

    fn sym(&self, id: SymbolId) -> &BodySymbol {
        self.symbols[id.0].as_ref().expect("dangling SymbolId")
    }

    fn sym_mut(&mut self, id: SymbolId) -> &mut BodySymbol {
        self.symbols[id.0].as_mut().expect("dangling SymbolId")
    }

    fn rule(&self, id: RuleId) -> &RuleHead {
        self.rules[id.0].as_ref().expect("dangling RuleId")
    }

    fn rule_mut(&mut self, id: RuleId) -> &mut RuleHead {
        self.rules[id.0].as_mut().expect("dangling RuleId")
    }

    fn alloc_symbol(&mut self, s: BodySymbol) -> SymbolId {
        self.symbols.push(Some(s));
        SymbolId(self.symbols.len() - 1)
    }

    fn free_symbol(&mut self, id: SymbolId) {
        self.symbols[id.0] = None;
    }

    fn alloc_rule_slot(&mut self, r: RuleHead) -> RuleId {
        self.rules.push(Some(r));
        RuleId(self.rules.len() - 1)
    }

    fn free_rule_slot(&mut self, id: RuleId) {
        self.rules[id.0] = None;
    }

    // -- rule list (insertion order, survives deletions) --------------

    fn rule_list_append(&mut self, rule: RuleId) {
        let tail = self.rules_list_tail;
        self.rule_mut(rule).list_prev = tail;
        self.rule_mut(rule).list_next = None;
        match tail {
            Some(t) => self.rule_mut(t).list_next = Some(rule),
            None => self.rules_list_head = Some(rule),
        }
        self.rules_list_tail = Some(rule);
    }

    fn rule_list_remove(&mut self, rule: RuleId) {
        let (prev, next) = {
            let r = self.rule(rule);
            (r.list_prev, r.list_next)
        };
        match prev {
            Some(p) => self.rule_mut(p).list_next = next,
            None => self.rules_list_head = next,
        }
        match next {
            Some(n) => self.rule_mut(n).list_prev = prev,
            None => self.rules_list_tail = prev,
        }
    }

    fn rule_list_iter(&self) -> Vec<RuleId> {
        let mut out = Vec::new();
        let mut cur = self.rules_list_head;
        while let Some(r) = cur {
            out.push(r);
            cur = self.rule(r).list_next;
        }
        out
    }

    // -- rule / symbol construction ------------------------------------

    fn new_rule(&mut self) -> RuleId {
        let id = self.next_rule_id;
        self.next_rule_id -= 1;
        self.alloc_rule_slot(RuleHead {
            id,
            body_head: None,
            body_tail: None,
            ref_count: 0,
            list_prev: None,
            list_next: None,
        })
    }

    fn rule_ref(&mut self, rule: RuleId) {
        self.rule_mut(rule).ref_count += 1;
    }

    fn rule_deref(&mut self, rule: RuleId) {
        let r = self.rule_mut(rule);
        r.ref_count = r.ref_count.saturating_sub(1);
    }

    fn new_body_symbol(
        &mut self,
        container: RuleId,
        value: i32,
        exp: u32,
        terminal: bool,
        references: Option<RuleId>,
    ) -> SymbolId {
        self.alloc_symbol(BodySymbol {
            value,
            exp,
            terminal,
            references,
            container,
            prev: None,
            next: None,
        })
    }

    /// Links `sym` into `rule`'s body, after `pos` (or as the sole/first
    /// element if `pos` is `None`). Bumps the referenced rule's ref count
    /// if `sym` is a non-terminal, unconditionally — mirrors the original
    /// always incrementing on insertion regardless of call site.
    fn symbol_put(&mut self, rule: RuleId, pos: Option<SymbolId>, sym: SymbolId) {
        self.sym_mut(sym).container = rule;
        match pos {
            None => {
                let old_head = self.rule(rule).body_head;
                self.sym_mut(sym).next = old_head;
                self.sym_mut(sym).prev = None;
                if let Some(h) = old_head {
                    self.sym_mut(h).prev = Some(sym);
                }
                self.rule_mut(rule).body_head = Some(sym);
                if self.rule(rule).body_tail.is_none() {
                    self.rule_mut(rule).body_tail = Some(sym);
                }
            }
            Some(p) => {
                let old_next = self.sym(p).next;
                self.sym_mut(sym).prev = Some(p);
                self.sym_mut(sym).next = old_next;
                self.sym_mut(p).next = Some(sym);
                match old_next {
                    Some(n) => self.sym_mut(n).prev = Some(sym),
                    None => self.rule_mut(rule).body_tail = Some(sym),
                }
            }
        }
        if let Some(r) = self.sym(sym).references {
            self.rule_ref(r);
        }
    }

    /// Unlinks `sym` from its container's body and frees its slot. Derefs
    /// the referenced rule (if any and `deref` is set) before freeing.
    fn symbol_delete(&mut self, sym: SymbolId, deref: bool) {
        let (prev, next, container, terminal, references) = {
            let s = self.sym(sym);
            (s.prev, s.next, s.container, s.terminal, s.references)
        };
        match prev {
            Some(p) => self.sym_mut(p).next = next,
            None => self.rule_mut(container).body_head = next,
        }
        match next {
            Some(n) => self.sym_mut(n).prev = prev,
            None => self.rule_mut(container).body_tail = prev,
        }
        if !terminal && deref {
            if let Some(r) = references {
                self.rule_deref(r);
            }
        }
        self.free_symbol(sym);
    }

    fn delete_symbol(&mut self, sym: SymbolId) {
        self.symbol_delete(sym, true);
    }

    fn rule_delete(&mut self, rule: RuleId) {
        self.rule_list_remove(rule);
        self.free_rule_slot(rule);
    }

    // -- digram table ---------------------------------------------------

    fn digram_key(&self, a: SymbolId, b: SymbolId) -> DigramKey {
        let sa = self.sym(a);
        let sb = self.sym(b);
        (sa.value, sa.exp, sb.value, sb.exp)
    }

    fn digram_get(&self, a: SymbolId, b: SymbolId) -> Option<SymbolId> {
        self.digram_table.get(&self.digram_key(a, b)).copied()
    }

    /// No-op if the key is already present (mirrors the original: the
    /// first occurrence registered for a key wins).
    fn digram_put(&mut self, sym: SymbolId) {
        let next = match self.sym(sym).next {
            Some(n) => n,
            None => return,
        };
        let key = self.digram_key(sym, next);
        self.digram_table.entry(key).or_insert(sym);
    }

    /// Deletes the digram keyed by `(sym, sym.next)` only if the table's
    /// stored symbol for that key is still `sym` — resolving the "which
    /// deletions must check the stored pointer" design question (§9)
    /// uniformly, everywhere a digram is removed.
    fn digram_delete(&mut self, sym: Option<SymbolId>) {
        let sym = match sym {
            Some(s) => s,
            None => return,
        };
        let next = match self.sym(sym).next {
            Some(n) => n,
            None => return,
        };
        let key = self.digram_key(sym, next);
        if self.digram_table.get(&key) == Some(&sym) {
            self.digram_table.remove(&key);
        }
    }

    fn is_entire_rule_body(&self, s: SymbolId) -> bool {
        let sym = self.sym(s);
        if sym.prev.is_some() {
            return false;
        }
        match sym.next {
            None => false,
            Some(n) => self.sym(n).next.is_none(),
        }
    }

    // -- the enforcement algorithm ---------------------------------------

    /// `replace_digram`: splices a non-terminal referencing `rule` in place
    /// of the digram starting at `origin`. `delete_digram` is false when
    /// the caller already knows the digram for `origin` was never
    /// registered (e.g. it is the freshly-appended digram still being
    /// classified by `check_digram`).
    fn replace_digram(&mut self, origin: SymbolId, rule: RuleId, delete_digram: bool) {
        let rule_val = self.rule(rule).id;
        let origin_container = self.sym(origin).container;
        let replaced = self.new_body_symbol(origin_container, rule_val, 1, false, Some(rule));

        let is_head = self.rule(origin_container).body_head == Some(origin);
        let prev = if is_head { None } else { self.sym(origin).prev };
        if let Some(p) = prev {
            self.digram_delete(Some(p));
        }

        if delete_digram {
            self.digram_delete(Some(origin));
            let origin_next = self.sym(origin).next;
            self.digram_delete(origin_next);
        }

        let origin_next = self.sym(origin).next.expect("replace_digram needs a pair");
        self.delete_symbol(origin_next);
        self.delete_symbol(origin);

        self.symbol_put(origin_container, prev, replaced);

        if !self.check_digram(prev) {
            match prev {
                None => {
                    self.check_digram(Some(replaced));
                }
                Some(p) => {
                    if self.sym(p).next == Some(replaced) {
                        self.check_digram(Some(replaced));
                    }
                }
            }
        }
    }

    /// Rule utility: inline a rule used exactly once by splicing its body
    /// in place of the sole non-terminal occurrence `sym`.
    fn expand_instance(&mut self, sym: SymbolId) {
        let referenced = self
            .sym(sym)
            .references
            .expect("expand_instance requires a non-terminal");
        debug_assert_eq!(
            self.rule(referenced).ref_count,
            1,
            "attempted to inline a rule referenced more than once"
        );

        self.digram_delete(Some(sym));

        let container = self.sym(sym).container;
        let mut tail = sym;
        let mut n = 0u32;
        let mut cur = self.rule(referenced).body_head;
        while let Some(this) = cur {
            let next_iter = self.sym(this).next;
            self.digram_delete(Some(this));

            let (val, exp, terminal, refs) = {
                let s = self.sym(this);
                (s.value, s.exp, s.terminal, s.references)
            };
            let copy = self.new_body_symbol(container, val, exp, terminal, refs);
            self.symbol_put(container, Some(tail), copy);
            tail = copy;
            n += 1;

            self.delete_symbol(this);
            cur = next_iter;
        }

        let mut this = self.sym(sym).next;
        for _ in 0..n {
            if let Some(t) = this {
                self.digram_put(t);
                this = self.sym(t).next;
            }
        }

        self.delete_symbol(sym);
        self.rule_delete(referenced);
    }

    /// Handle a just-formed digram `(this, this.next)` matching the
    /// existing occurrence `match_sym`.
    fn process_match(&mut self, this: SymbolId, match_sym: SymbolId) {
        let rule;
        if self.is_entire_rule_body(match_sym) {
            rule = self.sym(match_sym).container;
            self.replace_digram(this, rule, false);
        } else {
            rule = self.new_rule();
            self.rule_list_append(rule);

            let this_next = self.sym(this).next.expect("process_match needs a pair");
            let (v1, e1, t1, r1) = {
                let s = self.sym(this);
                (s.value, s.exp, s.terminal, s.references)
            };
            let (v2, e2, t2, r2) = {
                let s = self.sym(this_next);
                (s.value, s.exp, s.terminal, s.references)
            };

            let s1 = self.new_body_symbol(rule, v1, e1, t1, r1);
            self.symbol_put(rule, None, s1);
            let s2 = self.new_body_symbol(rule, v2, e2, t2, r2);
            let tail = self.rule(rule).body_tail;
            self.symbol_put(rule, tail, s2);

            self.replace_digram(match_sym, rule, true);
            self.replace_digram(this, rule, false);

            self.digram_put(s1);
        }

        if let Some(head) = self.rule(rule).body_head {
            if let Some(referenced) = self.sym(head).references {
                let ref_count = self.rule(referenced).ref_count;
                let exp = self.sym(head).exp;
                if ref_count < 2 && exp < 2 {
                    self.expand_instance(head);
                }
            }
        }
    }

    /// Returns `true` if a substitution occurred.
    fn check_digram(&mut self, sym: Option<SymbolId>) -> bool {
        let sym = match sym {
            Some(s) => s,
            None => return false,
        };
        let next = match self.sym(sym).next {
            Some(n) => n,
            None => return false,
        };
        if next == sym {
            return false;
        }

        if self.twins_removal && self.sym(sym).value == self.sym(next).value {
            let prev = self.sym(sym).prev;
            self.digram_delete(prev);
            let next_exp = self.sym(next).exp;
            self.sym_mut(sym).exp = self.sym(sym).exp.saturating_add(next_exp);
            self.symbol_delete(next, false);
            return self.check_digram(prev);
        }

        match self.digram_get(sym, next) {
            None => {
                self.digram_put(sym);
                false
            }
            Some(found) => {
                if self.sym(found).next == Some(sym) {
                    false
                } else {
                    self.process_match(sym, found);
                    true
                }
            }
        }
    }

    // -- public API -------------------------------------------------------

    /// `append_terminal(value, exponent)`.
    pub fn append_terminal(&mut self, value: i32, exp: u32) {
        let sym = self.new_body_symbol(self.start_rule, value, exp, true, None);
        let tail = self.rule(self.start_rule).body_tail;
        self.symbol_put(self.start_rule, tail, sym);
        let prev = self.sym(sym).prev;
        self.check_digram(prev);
    }

    /// `update(remapping)`: rewrites every terminal value in place.
    pub fn update(&mut self, remapping: &[i32]) {
        for rule in self.rule_list_iter() {
            let mut cur = self.rule(rule).body_head;
            while let Some(s) = cur {
                let sym = self.sym_mut(s);
                if sym.value >= 0 {
                    sym.value = remapping[sym.value as usize];
                }
                cur = self.sym(s).next;
            }
        }
    }

    /// `serialize()`: `[rule_count, (rule_id, symbol_count, v, e, ...)...]`,
    /// rules visited in insertion order.
    pub fn serialize(&self) -> Vec<i32> {
        let rules = self.rule_list_iter();
        let mut out = vec![rules.len() as i32];
        for rule in rules {
            let mut body = Vec::new();
            let mut cur = self.rule(rule).body_head;
            while let Some(s) = cur {
                let sym = self.sym(s);
                body.push((sym.value, sym.exp));
                cur = sym.next;
            }
            out.push(self.rule(rule).id);
            out.push(body.len() as i32);
            for (v, e) in body {
                out.push(v);
                out.push(e as i32);
            }
        }
        out
    }

    /// Fully expands the start rule into its terminal sequence (with
    /// exponents unrolled); used by tests and by readers that want the
    /// original un-compressed stream (§8 property 4, "reconstruction").
    pub fn expand_terminals(&self) -> Vec<i32> {
        let mut out = Vec::new();
        self.expand_rule(self.start_rule, &mut out);
        out
    }

    fn expand_rule(&self, rule: RuleId, out: &mut Vec<i32>) {
        let mut cur = self.rule(rule).body_head;
        while let Some(s) = cur {
            let sym = self.sym(s);
            if sym.terminal {
                for _ in 0..sym.exp {
                    out.push(sym.value);
                }
            } else {
                let referenced = sym.references.expect("non-terminal without reference");
                for _ in 0..sym.exp {
                    self.expand_rule(referenced, out);
                }
            }
            cur = self.sym(s).next;
        }
    }

    /// `cleanup()`: frees every symbol, rule and digram entry.
    pub fn cleanup(&mut self) {
        self.symbols.clear();
        self.rules.clear();
        self.digram_table.clear();
        self.rules_list_head = None;
        self.rules_list_tail = None;
        self.next_rule_id = -1;
    }

    /// Number of live rules (including the start rule), for tests and
    /// diagnostics.
    pub fn rule_count(&self) -> usize {
        self.rule_list_iter().len()
    }

    #[cfg(test)]
    fn start_rule_body_summary(&self) -> Vec<(i32, u32)> {
        let mut out = Vec::new();
        let mut cur = self.rule(self.start_rule).body_head;
        while let Some(s) = cur {
            let sym = self.sym(s);
            out.push((sym.value, sym.exp));
            cur = sym.next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S1 — trivial intern: a single append produces a one-symbol body.
    #[test]
    fn single_terminal_append() {
        let mut g = Grammar::init();
        g.append_terminal(0, 1);
        assert_eq!(g.start_rule_body_summary(), vec![(0, 1)]);
        assert_eq!(g.expand_terminals(), vec![0]);
    }

    // S2 — twins collapse: five identical terminals become one symbol with
    // exponent 5.
    #[test]
    fn twins_removal_collapses_repeated_terminal() {
        let mut g = Grammar::init();
        for _ in 0..5 {
            g.append_terminal(0, 1);
        }
        assert_eq!(g.start_rule_body_summary(), vec![(0, 5)]);
        assert_eq!(g.expand_terminals(), vec![0, 0, 0, 0, 0]);
    }

    // S3 — new rule formation: `A B A B A B` forms one rule `[A, B]` and
    // the start rule collapses to a single exponentiated reference to it.
    #[test]
    fn repeating_pair_forms_rule_and_collapses() {
        let mut g = Grammar::init();
        for _ in 0..3 {
            g.append_terminal(10, 1);
            g.append_terminal(20, 1);
        }
        assert_eq!(g.expand_terminals(), vec![10, 20, 10, 20, 10, 20]);
        // one new rule besides the start rule
        assert_eq!(g.rule_count(), 2);
        let body = g.start_rule_body_summary();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].1, 3); // exponent 3
    }

    // S4 — overlap guard, twins-removal on: `A A A` collapses to (A,3).
    #[test]
    fn overlap_guard_with_twins_removal() {
        let mut g = Grammar::init();
        g.append_terminal(7, 1);
        g.append_terminal(7, 1);
        g.append_terminal(7, 1);
        assert_eq!(g.start_rule_body_summary(), vec![(7, 3)]);
    }

    // S4 — overlap guard, twins-removal off: no rule is formed for `A A A`
    // because the second digram overlaps the first.
    #[test]
    fn overlap_guard_without_twins_removal() {
        let mut g = Grammar::new(-1, false);
        g.append_terminal(7, 1);
        g.append_terminal(7, 1);
        g.append_terminal(7, 1);
        assert_eq!(
            g.start_rule_body_summary(),
            vec![(7, 1), (7, 1), (7, 1)]
        );
        assert_eq!(g.rule_count(), 1);
    }

    #[test]
    fn reconstruction_matches_input_for_mixed_stream() {
        let input = vec![1, 2, 1, 2, 3, 3, 3, 4, 1, 2, 5];
        let mut g = Grammar::init();
        for v in &input {
            g.append_terminal(*v, 1);
        }
        assert_eq!(g.expand_terminals(), input);
    }

    #[test]
    fn update_rewrites_only_terminals() {
        let mut g = Grammar::init();
        for _ in 0..3 {
            g.append_terminal(0, 1);
            g.append_terminal(1, 1);
        }
        // A rule now exists referencing terminals 0 and 1; update remaps
        // terminal ids, not rule ids.
        let remap = vec![100, 200];
        g.update(&remap);
        assert_eq!(g.expand_terminals(), vec![100, 200, 100, 200, 100, 200]);
    }

    #[test]
    fn serialize_visits_rules_in_insertion_order_with_start_first() {
        let mut g = Grammar::init();
        for _ in 0..3 {
            g.append_terminal(0, 1);
            g.append_terminal(1, 1);
        }
        let flat = g.serialize();
        assert_eq!(flat[0], 2); // rule_count: start + one formed rule
        assert_eq!(flat[1], -1); // start rule id first
    }

    #[test]
    fn cleanup_empties_the_grammar() {
        let mut g = Grammar::init();
        g.append_terminal(0, 1);
        g.cleanup();
        assert_eq!(g.rules.len(), 0);
        assert_eq!(g.symbols.len(), 0);
        assert!(g.digram_table.is_empty());
    }
}
