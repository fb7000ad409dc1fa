mod table;

pub use table::{ObservationTable, Row};

use tracing::{debug, info, trace};

use rpcgram_core::{Alphabet, Dfa, Show, Symbol};

use crate::equivalence::EquivalenceOracle;
use crate::oracle::MembershipOracle;

/// The table-based L* learner. Each outer round makes the observation
/// table closed and consistent, emits the induced hypothesis and asks the
/// equivalence oracle for a counter-example; absorbing one strictly
/// increases the number of distinct rows, so the loop terminates once the
/// oracle stops disagreeing.
pub struct LStar<'a, S: Symbol, O: MembershipOracle<S>> {
    alphabet: Alphabet<S>,
    oracle: &'a O,
    table: ObservationTable<S>,
}

impl<'a, S: Symbol, O: MembershipOracle<S>> LStar<'a, S, O> {
    /// Creates a learner for the language answered by `oracle`.
    pub fn new(alphabet: Alphabet<S>, oracle: &'a O) -> Self {
        let table = ObservationTable::new(alphabet.clone());
        Self {
            alphabet,
            oracle,
            table,
        }
    }

    /// The observation table in its current state.
    pub fn table(&self) -> &ObservationTable<S> {
        &self.table
    }

    /// Runs the learning loop to completion and returns the final
    /// hypothesis.
    pub fn infer<E: EquivalenceOracle<S>>(&mut self, eq: &E) -> Dfa<S> {
        self.table.refill(self.oracle);

        loop {
            loop {
                let unclosed = self.table.closedness_defect();
                let inconsistent = self.table.consistency_defect();
                if unclosed.is_none() && inconsistent.is_none() {
                    break;
                }
                if let Some(extension) = unclosed {
                    trace!("table not closed, adding prefix {}", extension.show());
                    self.table.add_prefix(extension, self.oracle);
                }
                if let Some(suffix) = inconsistent {
                    trace!("table not consistent, adding suffix {}", suffix.show());
                    self.table.add_suffix(suffix, self.oracle);
                }
            }

            let hypothesis = self.table.hypothesis();
            debug!(
                "hypothesis over {} has {} states",
                self.alphabet.show(),
                hypothesis.size()
            );

            match eq.equivalence(&hypothesis) {
                Ok(()) => {
                    info!("no counterexample found, {} states", hypothesis.size());
                    return hypothesis;
                }
                Err(ce) => {
                    debug!("absorbing counterexample {}", ce.show());
                    self.table.absorb_counterexample(&ce, self.oracle);
                }
            }
        }
    }
}

/// Convenience entry point: learn the language of `oracle` over `alphabet`,
/// drawing counter-examples from `eq`.
pub fn learn<S, O, E>(alphabet: Alphabet<S>, oracle: &O, eq: &E) -> Dfa<S>
where
    S: Symbol,
    O: MembershipOracle<S>,
    E: EquivalenceOracle<S>,
{
    LStar::new(alphabet, oracle).infer(eq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::BoundedExhaustiveSearch;
    use crate::geth;
    use crate::oracle::{ComplexOracle, MediumOracle, SimpleOracle};
    use crate::rpc::testing::StaticTransport;
    use crate::rpc::RpcProbe;
    use rpcgram_core::Word;

    fn probe(transport: StaticTransport) -> RpcProbe<char, StaticTransport> {
        RpcProbe::new(geth::bindings(), transport)
    }

    #[test_log::test]
    fn learns_the_four_phase_language() {
        let oracle = ComplexOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let mut learner = LStar::new(geth::alphabet(), &oracle);
        let dfa = learner.infer(&eq);

        // phases 0..3 plus the dead state
        assert_eq!(dfa.size(), 5);
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
    }

    #[test]
    fn learned_dfa_matches_the_reference_automaton() {
        let oracle = ComplexOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let dfa = learn(geth::alphabet(), &oracle, &eq);

        let reference = crate::equivalence::tests::phase_dfa(geth::alphabet());
        let mut queue = vec![Word::epsilon()];
        while let Some(word) = queue.pop() {
            assert_eq!(
                dfa.accepts(&word),
                reference.accepts(&word),
                "disagreement on {word}"
            );
            if word.len() < 5 {
                queue.extend(geth::alphabet().universe().map(|sym| word.appended(sym)));
            }
        }
    }

    #[test]
    fn final_table_is_closed_and_consistent() {
        let oracle = ComplexOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let mut learner = LStar::new(geth::alphabet(), &oracle);
        let _ = learner.infer(&eq);
        assert!(learner.table().closedness_defect().is_none());
        assert!(learner.table().consistency_defect().is_none());
    }

    #[test]
    fn learned_dfa_agrees_with_the_oracle_afterwards() {
        let oracle = ComplexOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let dfa = learn(geth::alphabet(), &oracle, &eq);
        // every word the equivalence oracle probes after learning agrees
        assert_eq!(eq.equivalence(&dfa), Ok(()));
    }

    #[test]
    fn learns_the_simple_language_as_two_states() {
        let oracle = SimpleOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 5);
        let dfa = learn(geth::alphabet(), &oracle, &eq);
        // ε rejects, everything else accepts
        assert_eq!(dfa.size(), 2);
        assert!(!dfa.accepts(&Word::epsilon()));
        assert!(dfa.accepts(&Word::from("AM")));
    }

    #[test]
    fn learns_the_subsequence_language() {
        let oracle = MediumOracle::new(geth::alphabet(), probe(StaticTransport::reachable()));
        let eq = BoundedExhaustiveSearch::new(&oracle, 6);
        let dfa = learn(geth::alphabet(), &oracle, &eq);
        assert_eq!(dfa.size(), 5);
        assert!(dfa.accepts(&Word::from("ATB")));
        assert!(dfa.accepts(&Word::from("ACTCBC")));
        assert!(!dfa.accepts(&Word::from("BTA")));
        assert!(!dfa.accepts(&Word::from("ATBM")));
    }

    #[test]
    fn unreachable_endpoint_yields_the_empty_language() {
        let transport = StaticTransport::reachable()
            .with_unreachable("eth_getBalance")
            .with_unreachable("eth_getTransactionCount")
            .with_unreachable("eth_getCode")
            .with_unreachable("eth_call")
            .with_unreachable("eth_feeHistory");
        let oracle = SimpleOracle::new(geth::alphabet(), probe(transport));
        let eq = BoundedExhaustiveSearch::new(&oracle, 4);
        let dfa = learn(geth::alphabet(), &oracle, &eq);
        assert_eq!(dfa.size(), 1);
        assert_eq!(dfa.accepting_count(), 0);
    }
}
