use std::fmt;

use bimap::BiBTreeMap;
use itertools::Itertools;

use crate::alphabet::{Alphabet, Symbol};
use crate::math;
use crate::show::Show;
use crate::word::Word;

/// Opaque identity of a DFA state. Indices are dense and assigned in the
/// order states were added to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    /// The position of this state in construction order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// An immutable deterministic finite automaton, the result of one learning
/// round. Besides the transition structure it carries, for every state, the
/// access word the learner used as that state's canonical name; the mapping
/// is bidirectional so hosts can go from words to states and back.
///
/// The transition map may be partial. [`Dfa::accepts`] treats a missing
/// transition as rejection, so a hypothesis is always safe to evaluate even
/// if a learner emitted it before reaching totality.
#[derive(Debug, Clone)]
pub struct Dfa<S: Symbol> {
    alphabet: Alphabet<S>,
    state_count: usize,
    initial: StateId,
    accepting: math::OrderedSet<StateId>,
    transitions: math::OrderedMap<(StateId, S), StateId>,
    names: BiBTreeMap<StateId, Word<S>>,
}

impl<S: Symbol> Dfa<S> {
    /// The alphabet this automaton is defined over.
    pub fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    /// Number of states.
    pub fn size(&self) -> usize {
        self.state_count
    }

    /// The initial state.
    pub fn initial(&self) -> StateId {
        self.initial
    }

    /// Iterates over all state indices in construction order.
    pub fn state_indices(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.state_count).map(StateId)
    }

    /// Whether `state` is accepting.
    pub fn is_accepting(&self, state: StateId) -> bool {
        self.accepting.contains(&state)
    }

    /// Number of accepting states.
    pub fn accepting_count(&self) -> usize {
        self.accepting.len()
    }

    /// The target of the transition from `state` on `sym`, if defined.
    pub fn successor(&self, state: StateId, sym: S) -> Option<StateId> {
        self.transitions.get(&(state, sym)).copied()
    }

    /// The access word naming `state`.
    pub fn access_word(&self, state: StateId) -> Option<&Word<S>> {
        self.names.get_by_left(&state)
    }

    /// The state named by the given access word, if any.
    pub fn state_named(&self, access: &Word<S>) -> Option<StateId> {
        self.names.get_by_right(access).copied()
    }

    /// Runs `word` from the initial state and returns the reached state, or
    /// `None` if a transition is missing along the way.
    pub fn reached_state(&self, word: &Word<S>) -> Option<StateId> {
        let mut current = self.initial;
        for sym in word.symbols() {
            current = self.successor(current, sym)?;
        }
        Some(current)
    }

    /// Whether the automaton accepts `word`: follow δ from the initial
    /// state; an undefined transition rejects, otherwise the verdict is
    /// membership of the reached state in the accepting set. For ε this
    /// degenerates to checking the initial state.
    pub fn accepts(&self, word: &Word<S>) -> bool {
        self.reached_state(word)
            .is_some_and(|state| self.is_accepting(state))
    }

    /// Whether δ is defined on every (state, symbol) pair.
    pub fn is_total(&self) -> bool {
        self.state_indices().all(|state| {
            self.alphabet
                .universe()
                .all(|sym| self.successor(state, sym).is_some())
        })
    }

    /// Emits graphviz dot source for the automaton: accepting states are
    /// doubled circles, the initial state is marked by an edge from an
    /// anonymous point, and parallel edges are merged into one edge whose
    /// label joins the symbols.
    pub fn dot_representation(&self) -> String {
        let mut ordered: Vec<StateId> = vec![self.initial];
        ordered.extend(
            self.state_indices()
                .filter(|state| *state != self.initial)
                .sorted_by_key(|state| self.access_word(*state).cloned()),
        );
        let name =
            |state: StateId| -> String { format!("S{}", ordered.iter().position(|s| *s == state).unwrap()) };

        let mut out = String::from("digraph dfa {\n  rankdir=TB;\n");
        for state in &ordered {
            let shape = if self.is_accepting(*state) {
                "doublecircle"
            } else {
                "circle"
            };
            let access = self
                .access_word(*state)
                .map(|w| w.show())
                .unwrap_or_default();
            out.push_str(&format!(
                "  {} [shape={shape}, label=\"{}\\n{access}\"];\n",
                name(*state),
                name(*state),
            ));
        }
        out.push_str("  __start__ [shape=point];\n");
        out.push_str(&format!("  __start__ -> {};\n", name(self.initial)));

        let mut merged: math::OrderedMap<(StateId, StateId), Vec<S>> = math::OrderedMap::default();
        for ((source, sym), target) in &self.transitions {
            merged.entry((*source, *target)).or_default().push(*sym);
        }
        for ((source, target), mut syms) in merged {
            syms.sort();
            let label = syms.iter().map(|s| s.show()).join(",");
            out.push_str(&format!(
                "  {} -> {} [label=\"{label}\"];\n",
                name(source),
                name(target),
            ));
        }
        out.push_str("}\n");
        out
    }
}

/// Assembles a [`Dfa`] from states and transitions. States are registered
/// with their access word and acceptance, transitions afterwards; the
/// builder checks determinism and symbol membership eagerly so a malformed
/// hypothesis fails at construction rather than at evaluation.
#[derive(Debug, Clone)]
pub struct DfaBuilder<S: Symbol> {
    alphabet: Alphabet<S>,
    accepting: math::OrderedSet<StateId>,
    names: BiBTreeMap<StateId, Word<S>>,
    transitions: math::OrderedMap<(StateId, S), StateId>,
}

impl<S: Symbol> DfaBuilder<S> {
    /// Creates a builder for automata over the given alphabet.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        Self {
            alphabet,
            accepting: math::OrderedSet::default(),
            names: BiBTreeMap::new(),
            transitions: math::OrderedMap::default(),
        }
    }

    /// Number of states added so far.
    pub fn state_count(&self) -> usize {
        self.names.len()
    }

    /// Adds a state named by `access` and returns its index.
    ///
    /// # Panics
    /// Panics if a state with the same access word already exists.
    pub fn add_state(&mut self, access: Word<S>, accepting: bool) -> StateId {
        assert!(
            self.names.get_by_right(&access).is_none(),
            "duplicate state access word {}",
            access.show()
        );
        let state = StateId(self.names.len());
        self.names.insert(state, access);
        if accepting {
            self.accepting.insert(state);
        }
        state
    }

    /// Adds the transition `source --sym--> target`.
    ///
    /// # Panics
    /// Panics if `sym` is not in the alphabet, if either state is unknown,
    /// or if a different transition for `(source, sym)` exists already.
    pub fn add_transition(&mut self, source: StateId, sym: S, target: StateId) {
        assert!(
            self.alphabet.contains(sym),
            "symbol {} not in alphabet {}",
            sym.show(),
            self.alphabet.show()
        );
        assert!(source.index() < self.names.len() && target.index() < self.names.len());
        let previous = self.transitions.insert((source, sym), target);
        assert!(
            previous.is_none_or(|p| p == target),
            "conflicting transition from {source} on {}",
            sym.show()
        );
    }

    /// Finalises the automaton with the given initial state.
    pub fn into_dfa(self, initial: StateId) -> Dfa<S> {
        assert!(initial.index() < self.names.len(), "unknown initial state");
        Dfa {
            alphabet: self.alphabet,
            state_count: self.names.len(),
            initial,
            accepting: self.accepting,
            transitions: self.transitions,
            names: self.names,
        }
    }
}
