use std::fmt;

use itertools::Itertools;
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing::trace;

use rpcgram_core::{Alphabet, Dfa, DfaBuilder, Show, StateId, Symbol, Word, math};

use crate::oracle::MembershipOracle;

/// The identity of a state in the observation table: the tuple of verdicts
/// of one prefix row under every suffix, in suffix order. Two prefixes with
/// equal rows denote the same state of the hypothesis.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Row(Vec<bool>);

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            write!(f, "{}", u8::from(*bit))?;
        }
        Ok(())
    }
}

/// The L* observation table: an insertion-ordered prefix set P (always
/// containing ε), suffix set S (always containing ε) and the cell map over
/// (P ∪ P·Σ) × S. Cells are filled by membership queries whenever P or S
/// grows, so closedness and consistency checks only ever read.
pub struct ObservationTable<S: Symbol> {
    alphabet: Alphabet<S>,
    prefixes: math::OrderedSet<Word<S>>,
    suffixes: math::OrderedSet<Word<S>>,
    cells: math::OrderedMap<Word<S>, math::OrderedMap<Word<S>, bool>>,
}

impl<S: Symbol> ObservationTable<S> {
    /// Creates the table with P = S = {ε} and no cells filled yet.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        Self {
            alphabet,
            prefixes: [Word::epsilon()].into_iter().collect(),
            suffixes: [Word::epsilon()].into_iter().collect(),
            cells: math::OrderedMap::default(),
        }
    }

    /// The prefix set P in insertion order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Word<S>> {
        self.prefixes.iter()
    }

    /// The suffix set S in insertion order.
    pub fn suffixes(&self) -> impl Iterator<Item = &Word<S>> {
        self.suffixes.iter()
    }

    /// The verdict stored for `prefix · suffix`.
    ///
    /// # Panics
    /// Panics if the cell was never filled; all cells of
    /// (P ∪ P·Σ) × S are filled by [`Self::refill`] before any check reads
    /// them.
    pub fn cell(&self, prefix: &Word<S>, suffix: &Word<S>) -> bool {
        *self
            .cells
            .get(prefix)
            .and_then(|row| row.get(suffix))
            .unwrap_or_else(|| panic!("unfilled cell ({}, {})", prefix.show(), suffix.show()))
    }

    /// The row of `prefix` over the current suffix set.
    pub fn row(&self, prefix: &Word<S>) -> Row {
        Row(self.suffixes.iter().map(|s| self.cell(prefix, s)).collect())
    }

    /// All row words, i.e. P followed by the one-symbol extensions P·Σ with
    /// duplicates removed in first-seen order.
    fn row_words(&self) -> math::OrderedSet<Word<S>> {
        let mut words: math::OrderedSet<Word<S>> = self.prefixes.iter().cloned().collect();
        for prefix in &self.prefixes {
            for sym in self.alphabet.universe() {
                words.insert(prefix.appended(sym));
            }
        }
        words
    }

    /// Fills every missing cell of (P ∪ P·Σ) × S with a membership query.
    pub fn refill<O: MembershipOracle<S>>(&mut self, oracle: &O) {
        for word in self.row_words() {
            let row = self.cells.entry(word.clone()).or_default();
            for suffix in &self.suffixes {
                if !row.contains_key(suffix) {
                    row.insert(suffix.clone(), oracle.mq(&word.concat(suffix)));
                }
            }
        }
    }

    /// Looks for a closedness defect: the first one-symbol extension p·a
    /// (scanning P in insertion order, then Σ in alphabet order) whose row
    /// matches no prefix row.
    pub fn closedness_defect(&self) -> Option<Word<S>> {
        let prefix_rows: math::OrderedSet<Row> =
            self.prefixes.iter().map(|p| self.row(p)).collect();
        for prefix in &self.prefixes {
            for sym in self.alphabet.universe() {
                let extension = prefix.appended(sym);
                if !prefix_rows.contains(&self.row(&extension)) {
                    return Some(extension);
                }
            }
        }
        None
    }

    /// Looks for a consistency defect: two prefixes with equal rows whose
    /// extensions disagree under some symbol a and suffix s. Returns the
    /// distinguishing suffix a·s.
    pub fn consistency_defect(&self) -> Option<Word<S>> {
        for (p1, p2) in self
            .prefixes
            .iter()
            .cartesian_product(self.prefixes.iter())
        {
            if p1 == p2 || self.row(p1) != self.row(p2) {
                continue;
            }
            for sym in self.alphabet.universe() {
                for suffix in &self.suffixes {
                    if self.cell(&p1.appended(sym), suffix) != self.cell(&p2.appended(sym), suffix)
                    {
                        trace!(
                            "prefixes {} and {} share a row but disagree on {}·{}",
                            p1.show(),
                            p2.show(),
                            sym.show(),
                            suffix.show()
                        );
                        return Some(Word::singleton(sym).concat(suffix));
                    }
                }
            }
        }
        None
    }

    /// Adds `prefix` to P (if new) and refills the table.
    pub fn add_prefix<O: MembershipOracle<S>>(&mut self, prefix: Word<S>, oracle: &O) {
        if self.prefixes.insert(prefix) {
            self.refill(oracle);
        }
    }

    /// Adds `suffix` to S (if new) and refills the table.
    pub fn add_suffix<O: MembershipOracle<S>>(&mut self, suffix: Word<S>, oracle: &O) {
        if self.suffixes.insert(suffix) {
            self.refill(oracle);
        }
    }

    /// Absorbs a counter-example by adding every non-empty prefix of it to
    /// P, shortest first.
    pub fn absorb_counterexample<O: MembershipOracle<S>>(&mut self, ce: &Word<S>, oracle: &O) {
        for i in 1..=ce.len() {
            self.add_prefix(ce.prefix(i), oracle);
        }
    }

    /// Builds the hypothesis automaton from a closed and consistent table.
    /// States are the row-equivalence classes of P, named by the first
    /// prefix (in insertion order) with that row; the start state is
    /// row(ε), a state accepts iff its representative's ε-cell is set, and
    /// δ(row(p), a) = row(p·a).
    ///
    /// # Panics
    /// Panics if the table is not closed; callers run the defect loop
    /// first.
    pub fn hypothesis(&self) -> Dfa<S> {
        let mut classes: math::OrderedMap<Row, Word<S>> = math::OrderedMap::default();
        for prefix in &self.prefixes {
            classes.entry(self.row(prefix)).or_insert_with(|| prefix.clone());
        }

        let mut builder = DfaBuilder::new(self.alphabet.clone());
        let mut ids: math::OrderedMap<Row, StateId> = math::OrderedMap::default();
        for (row, representative) in &classes {
            let accepting = self.cell(representative, &Word::epsilon());
            ids.insert(row.clone(), builder.add_state(representative.clone(), accepting));
        }
        for (row, representative) in &classes {
            let source = ids[row];
            for sym in self.alphabet.universe() {
                let target_row = self.row(&representative.appended(sym));
                let target = *ids
                    .get(&target_row)
                    .expect("table must be closed before constructing a hypothesis");
                builder.add_transition(source, sym, target);
            }
        }

        let start = ids[&self.row(&Word::epsilon())];
        builder.into_dfa(start)
    }
}

impl<S: Symbol> fmt::Display for ObservationTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(
            std::iter::once(String::new()).chain(self.suffixes.iter().map(|s| s.show())),
        );
        for word in self.row_words() {
            let marker = if self.prefixes.contains(&word) { "" } else { "·" };
            builder.push_record(std::iter::once(format!("{marker}{}", word.show())).chain(
                self.suffixes.iter().map(|s| {
                    self.cells
                        .get(&word)
                        .and_then(|row| row.get(s))
                        .map_or("?".to_string(), |b| u8::from(*b).to_string())
                }),
            ));
        }
        write!(f, "{}", builder.build().with(Style::sharp()))
    }
}
