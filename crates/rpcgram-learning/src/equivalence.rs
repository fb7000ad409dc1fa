use std::cell::RefCell;
use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use rpcgram_core::{Dfa, Show, Symbol, Word};

use crate::oracle::MembershipOracle;

/// Seed used when none is configured, so two runs in the same process see
/// identical template and random streams given equal oracles.
pub const DEFAULT_SEED: u64 = 0;

/// Number of random words drawn after the templates are exhausted.
pub const DEFAULT_SAMPLES: usize = 400;

/// Upper bound (inclusive) on the length of a random word.
pub const DEFAULT_MAX_LEN: usize = 10;

/// Searches for a word on which a hypothesis and the membership oracle
/// disagree. `Err` carries the counter-example; `Ok(())` means the search
/// found no disagreement, which for sampling implementations is evidence,
/// not proof, of equivalence.
pub trait EquivalenceOracle<S: Symbol> {
    /// Looks for a counter-example to `hypothesis`.
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<(), Word<S>>;
}

/// The two-phase reference search: first an ordered list of template words
/// crafted around likely corner cases, then up to [`DEFAULT_SAMPLES`] random
/// words with lengths uniform in 1..=[`DEFAULT_MAX_LEN`]. The generator is
/// seeded once at construction; rerunning the search over the same oracle
/// replays the same stream, so experiments are reproducible.
///
/// This is an under-approximation of true equivalence: a disagreement found
/// is always real, but `Ok(())` only says no disagreement was sampled.
pub struct RandomWordSearch<'a, S: Symbol, O: MembershipOracle<S>> {
    oracle: &'a O,
    templates: Vec<Word<S>>,
    rng: RefCell<StdRng>,
    samples: usize,
    max_len: usize,
}

impl<'a, S: Symbol, O: MembershipOracle<S>> RandomWordSearch<'a, S, O> {
    /// Creates the search over `oracle` with the given template words and
    /// the default seed, sample count and length bound.
    pub fn new(oracle: &'a O, templates: Vec<Word<S>>) -> Self {
        Self {
            oracle,
            templates,
            rng: RefCell::new(StdRng::seed_from_u64(DEFAULT_SEED)),
            samples: DEFAULT_SAMPLES,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Reseeds the random phase.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Overrides the number of random words drawn per query.
    pub fn with_samples(self, samples: usize) -> Self {
        Self { samples, ..self }
    }
}

impl<S: Symbol, O: MembershipOracle<S>> EquivalenceOracle<S> for RandomWordSearch<'_, S, O> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<(), Word<S>> {
        for template in &self.templates {
            if hypothesis.accepts(template) != self.oracle.mq(template) {
                debug!("template {} distinguishes hypothesis", template.show());
                return Err(template.clone());
            }
        }

        let symbols: Vec<S> = self.oracle.alphabet().universe().collect();
        let mut rng = self.rng.borrow_mut();
        for _ in 0..self.samples {
            let len = rng.gen_range(1..=self.max_len);
            let word: Word<S> = (0..len)
                .map(|_| *symbols.choose(&mut *rng).expect("alphabet is non-empty"))
                .collect();
            if hypothesis.accepts(&word) != self.oracle.mq(&word) {
                trace!("sampled word {} distinguishes hypothesis", word.show());
                return Err(word);
            }
        }
        Ok(())
    }
}

/// Breadth-first check of every word up to a length bound. Deterministic
/// and complete up to the bound, at exponential cost in it; meant for tests
/// and for callers that need certainty rather than sampling.
pub struct BoundedExhaustiveSearch<'a, S: Symbol, O: MembershipOracle<S>> {
    oracle: &'a O,
    max_len: usize,
    _symbol: std::marker::PhantomData<S>,
}

impl<'a, S: Symbol, O: MembershipOracle<S>> BoundedExhaustiveSearch<'a, S, O> {
    /// Creates the search checking all words of length ≤ `max_len`.
    pub fn new(oracle: &'a O, max_len: usize) -> Self {
        Self { oracle, max_len, _symbol: std::marker::PhantomData }
    }
}

impl<S: Symbol, O: MembershipOracle<S>> EquivalenceOracle<S> for BoundedExhaustiveSearch<'_, S, O> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<(), Word<S>> {
        let mut queue = VecDeque::from([Word::epsilon()]);
        while let Some(word) = queue.pop_front() {
            if hypothesis.accepts(&word) != self.oracle.mq(&word) {
                return Err(word);
            }
            if word.len() < self.max_len {
                queue.extend(self.oracle.alphabet().universe().map(|sym| word.appended(sym)));
            }
        }
        Ok(())
    }
}
