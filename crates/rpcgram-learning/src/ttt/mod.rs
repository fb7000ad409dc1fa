mod tree;

pub use tree::{DiscriminationTree, Node, NodeId};

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use rpcgram_core::{Alphabet, Dfa, DfaBuilder, Show, StateId, Symbol, Word, math};

use crate::equivalence::EquivalenceOracle;
use crate::oracle::MembershipOracle;

/// Hard cap on outer rounds; reaching it returns the current hypothesis.
pub const MAX_ROUNDS: usize = 300;

/// Hard cap on successful refinements per run.
pub const MAX_REFINEMENTS: usize = 80;

/// The TTT-style learner. Hypothesis states live in the leaves of a binary
/// discrimination tree, keyed by access words; internal nodes carry suffix
/// discriminators. A counter-example is absorbed by finding a prefix whose
/// sifted leaf it separates from that leaf's representative and splitting
/// the leaf on the separating suffix.
pub struct TttLearner<'a, S: Symbol, O: MembershipOracle<S>> {
    alphabet: Alphabet<S>,
    oracle: &'a O,
    tree: DiscriminationTree<S>,
    cache: math::OrderedMap<Word<S>, bool>,
    initialized: bool,
}

impl<'a, S: Symbol, O: MembershipOracle<S>> TttLearner<'a, S, O> {
    /// Creates a learner for the language answered by `oracle`.
    pub fn new(alphabet: Alphabet<S>, oracle: &'a O) -> Self {
        Self {
            alphabet,
            oracle,
            tree: DiscriminationTree::new(),
            cache: math::OrderedMap::default(),
            initialized: false,
        }
    }

    /// The discrimination tree in its current state.
    pub fn tree(&self) -> &DiscriminationTree<S> {
        &self.tree
    }

    /// Membership query through the learner's own cache. The oracle caches
    /// as well, but keeping a local copy makes the learner's query pattern
    /// independent of how the oracle is shared with the equivalence side.
    fn mq(&mut self, word: &Word<S>) -> bool {
        if let Some(verdict) = self.cache.get(word) {
            return *verdict;
        }
        let verdict = self.oracle.mq(word);
        self.cache.insert(word.clone(), verdict);
        verdict
    }

    /// Hangs the two initial leaves under the root: the `false` leaf keeps
    /// ε as representative, the `true` leaf the first single-symbol word
    /// the oracle accepts. If no symbol is accepted the `true` leaf also
    /// starts at ε as a placeholder; [`Self::sift`] adopts the first word
    /// that legitimately reaches it.
    fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let symbols: Vec<S> = self.alphabet.universe().collect();
        let witness = symbols
            .iter()
            .map(|sym| Word::singleton(*sym))
            .find(|word| self.mq(word))
            .unwrap_or_else(Word::epsilon);
        trace!("initial accepting witness: {}", witness.show());

        let true_leaf = self.tree.add_leaf(witness);
        let false_leaf = self.tree.add_leaf(Word::epsilon());
        let root = self.tree.root();
        self.tree.set_child(root, true, true_leaf);
        self.tree.set_child(root, false, false_leaf);
    }

    /// Routes `word` through the tree, answering MQ(word · d) at every
    /// internal node, and returns the reached leaf. Missing children are
    /// created on the fly, with the sifted word itself as representative.
    ///
    /// A leaf whose representative does not answer the branch it hangs on
    /// the way the branch claims carries a placeholder (the initial
    /// true-leaf when no single-symbol word is accepted); the first word
    /// that legitimately sifts into such a leaf is adopted as its
    /// representative.
    fn sift(&mut self, word: &Word<S>) -> NodeId {
        let mut current = self.tree.root();
        let mut constraint = None;
        while !self.tree.is_leaf(current) {
            let discriminator = self.tree.discriminator(current).clone();
            let verdict = self.mq(&word.concat(&discriminator));
            current = match self.tree.child(current, verdict) {
                Some(child) => child,
                None => {
                    let leaf = self.tree.add_leaf(word.clone());
                    self.tree.set_child(current, verdict, leaf);
                    leaf
                }
            };
            constraint = Some((discriminator, verdict));
        }
        if let Some((discriminator, verdict)) = constraint {
            let rep = self.tree.rep(current).clone();
            if self.mq(&rep.concat(&discriminator)) != verdict {
                trace!(
                    "leaf representative {} violates its branch, adopting {}",
                    rep.show(),
                    word.show()
                );
                self.tree.set_rep(current, word.clone());
            }
        }
        current
    }

    /// Builds the hypothesis: states are the representatives of all
    /// reachable leaves plus ε (the start state), δ(s, a) is the
    /// representative of the leaf that s·a sifts to, and a state accepts
    /// iff its representative is in the language. The worklist runs to a
    /// fixpoint, so the transition function of the result is total.
    fn build_hypothesis(&mut self) -> Dfa<S> {
        let symbols: Vec<S> = self.alphabet.universe().collect();

        let mut states: math::OrderedSet<Word<S>> = math::OrderedSet::default();
        states.insert(Word::epsilon());
        for leaf in self.tree.leaves() {
            states.insert(self.tree.rep(leaf).clone());
        }

        let mut transitions: Vec<(Word<S>, S, Word<S>)> = Vec::new();
        let mut queue: VecDeque<Word<S>> = states.iter().cloned().collect();
        while let Some(state) = queue.pop_front() {
            for sym in &symbols {
                let leaf = self.sift(&state.appended(*sym));
                let target = self.tree.rep(leaf).clone();
                if states.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
                transitions.push((state.clone(), *sym, target));
            }
        }

        let mut builder = DfaBuilder::new(self.alphabet.clone());
        let mut ids: math::OrderedMap<Word<S>, StateId> = math::OrderedMap::default();
        for state in &states {
            let accepting = self.mq(state);
            ids.insert(state.clone(), builder.add_state(state.clone(), accepting));
        }
        for (source, sym, target) in transitions {
            builder.add_transition(ids[&source], sym, ids[&target]);
        }
        builder.into_dfa(ids[&Word::epsilon()])
    }

    /// Absorbs a counter-example. The first pass looks for a one-step
    /// discriminator: a prefix of `ce` and its leaf representative that
    /// some single symbol separates. If none exists, the second pass tries
    /// the full remaining suffix of `ce` as discriminator. Returns whether
    /// a leaf was split.
    fn refine(&mut self, ce: &Word<S>) -> bool {
        let symbols: Vec<S> = self.alphabet.universe().collect();

        for i in 0..=ce.len() {
            let prefix = ce.prefix(i);
            let leaf = self.sift(&prefix);
            let rep = self.tree.rep(leaf).clone();
            for sym in &symbols {
                if self.mq(&prefix.appended(*sym)) != self.mq(&rep.appended(*sym)) {
                    return self.split(leaf, prefix, rep, Word::singleton(*sym));
                }
            }
        }

        for i in 0..=ce.len() {
            let suffix = ce.suffix_from(i);
            if suffix.is_empty() {
                continue;
            }
            let prefix = ce.prefix(i);
            let leaf = self.sift(&prefix);
            let rep = self.tree.rep(leaf).clone();
            if self.mq(&prefix.concat(&suffix)) != self.mq(&rep.concat(&suffix)) {
                return self.split(leaf, prefix, rep, suffix);
            }
        }

        false
    }

    /// Splits `leaf` on `discriminator`, separating the two access words.
    /// Requires that the discriminator actually distinguishes them; if it
    /// does not, the tree is left untouched and `false` is returned.
    fn split(
        &mut self,
        leaf: NodeId,
        rep1: Word<S>,
        rep2: Word<S>,
        discriminator: Word<S>,
    ) -> bool {
        let verdict1 = self.mq(&rep1.concat(&discriminator));
        let verdict2 = self.mq(&rep2.concat(&discriminator));
        if verdict1 == verdict2 {
            return false;
        }
        debug!(
            "splitting leaf of {} against {} on discriminator {}",
            rep2.show(),
            rep1.show(),
            discriminator.show()
        );
        let (rep_true, rep_false) = if verdict1 { (rep1, rep2) } else { (rep2, rep1) };
        self.tree.split_leaf(leaf, discriminator, rep_true, rep_false);
        true
    }

    /// Runs the learning loop: emit a hypothesis, ask for a counter-example
    /// and refine, until the equivalence oracle agrees or one of the hard
    /// caps is hit, in which case the current hypothesis is returned as
    /// best effort.
    pub fn infer<E: EquivalenceOracle<S>>(&mut self, eq: &E) -> Dfa<S> {
        self.initialize();

        let mut refinements = 0;
        for round in 1..=MAX_ROUNDS {
            let hypothesis = self.build_hypothesis();
            match eq.equivalence(&hypothesis) {
                Ok(()) => {
                    info!("no counterexample found, {} states", hypothesis.size());
                    return hypothesis;
                }
                Err(ce) => {
                    debug!("round {round}: counterexample {}", ce.show());
                    if !self.refine(&ce) {
                        warn!(
                            "no separating split for counterexample {}, returning current hypothesis",
                            ce.show()
                        );
                        return self.build_hypothesis();
                    }
                    refinements += 1;
                    if refinements >= MAX_REFINEMENTS {
                        warn!("refinement limit {MAX_REFINEMENTS} reached");
                        return self.build_hypothesis();
                    }
                }
            }
        }

        warn!("round limit {MAX_ROUNDS} reached");
        self.build_hypothesis()
    }
}

/// Convenience entry point mirroring [`crate::lstar::learn`].
pub fn learn<S, O, E>(alphabet: Alphabet<S>, oracle: &O, eq: &E) -> Dfa<S>
where
    S: Symbol,
    O: MembershipOracle<S>,
    E: EquivalenceOracle<S>,
{
    TttLearner::new(alphabet, oracle).infer(eq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::BoundedExhaustiveSearch;
    use crate::geth;
    use crate::lstar;
    use crate::oracle::{ComplexOracle, SimpleOracle};
    use crate::rpc::testing::StaticTransport;
    use crate::rpc::RpcProbe;

    fn complex() -> ComplexOracle<char, StaticTransport> {
        ComplexOracle::new(
            geth::alphabet(),
            RpcProbe::new(geth::bindings(), StaticTransport::reachable()),
        )
    }

    #[test_log::test]
    fn learns_the_four_phase_language() {
        let oracle = complex();
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let mut learner = TttLearner::new(geth::alphabet(), &oracle);
        let dfa = learner.infer(&eq);

        assert!(dfa.is_total());
        for (word, verdict) in [
            ("ATB", true),
            ("AATB", true),
            ("ACATB", true),
            ("", false),
            ("ATBA", false),
            ("ATBM", false),
            ("TAB", false),
            ("M", false),
        ] {
            assert_eq!(dfa.accepts(&Word::from(word)), verdict, "accepts({word})");
        }
        // the equivalence oracle keeps agreeing with the result
        assert_eq!(eq.equivalence(&dfa), Ok(()));
    }

    #[test]
    fn both_learners_accept_the_same_language() {
        let oracle = complex();
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let from_ttt = learn(geth::alphabet(), &oracle, &eq);
        let from_lstar = lstar::learn(geth::alphabet(), &oracle, &eq);

        assert!(from_ttt.accepts(&Word::from("ATB")));
        assert!(from_lstar.accepts(&Word::from("ATB")));
        // agreement on every word up to the equivalence bound
        let mut queue = vec![Word::epsilon()];
        while let Some(word) = queue.pop() {
            assert_eq!(
                from_ttt.accepts(&word),
                from_lstar.accepts(&word),
                "disagreement on {}",
                word.show()
            );
            if word.len() < 5 {
                queue.extend(geth::alphabet().universe().map(|sym| word.appended(sym)));
            }
        }
    }

    #[test]
    fn discrimination_tree_stays_sound() {
        let oracle = complex();
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let mut learner = TttLearner::new(geth::alphabet(), &oracle);
        let _ = learner.infer(&eq);

        // every leaf must answer its whole path of discriminators the way
        // the branches claim
        let tree = learner.tree();
        let mut stack = vec![(tree.root(), Vec::<(Word<char>, bool)>::new())];
        while let Some((node, path)) = stack.pop() {
            if tree.is_leaf(node) {
                for (discriminator, verdict) in &path {
                    assert_eq!(
                        oracle.mq(&tree.rep(node).concat(discriminator)),
                        *verdict,
                        "leaf {} violates discriminator {}",
                        tree.rep(node).show(),
                        discriminator.show()
                    );
                }
                continue;
            }
            for verdict in [false, true] {
                if let Some(child) = tree.child(node, verdict) {
                    let mut path = path.clone();
                    path.push((tree.discriminator(node).clone(), verdict));
                    stack.push((child, path));
                }
            }
        }
    }

    #[test]
    fn degenerate_start_without_accepting_symbol() {
        let transport = StaticTransport::reachable()
            .with_unreachable("eth_getBalance")
            .with_unreachable("eth_getTransactionCount")
            .with_unreachable("eth_getCode")
            .with_unreachable("eth_call")
            .with_unreachable("eth_feeHistory");
        let oracle = SimpleOracle::new(
            geth::alphabet(),
            RpcProbe::new(geth::bindings(), transport),
        );
        let eq = BoundedExhaustiveSearch::new(&oracle, 4);
        let dfa = learn(geth::alphabet(), &oracle, &eq);

        // the placeholder true-leaf collapses into the single ε state
        assert_eq!(dfa.size(), 1);
        assert_eq!(dfa.accepting_count(), 0);
        assert!(dfa.is_total());
    }

    #[test]
    fn unusable_counterexample_returns_best_effort() {
        struct Bogus;
        impl EquivalenceOracle<char> for Bogus {
            fn equivalence(&self, _hypothesis: &Dfa<char>) -> Result<(), Word<char>> {
                // the oracle rejects AT and so does every hypothesis here,
                // so refinement runs out of separating splits
                Err(Word::from("AT"))
            }
        }

        let oracle = complex();
        let dfa = learn(geth::alphabet(), &oracle, &Bogus);
        assert!(dfa.is_total());
        assert!(!dfa.accepts(&Word::from("AT")));
    }
}
