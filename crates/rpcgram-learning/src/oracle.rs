use std::cell::{Cell, RefCell};

use tracing::trace;

use rpcgram_core::{Alphabet, Show, Symbol, Word, math};

use crate::rpc::{CallClass, RpcProbe, Transport};

/// A minimally adequate teacher for membership: answers whether a word is
/// in the reference language. Implementations must be deterministic within
/// a run; repeated queries for equal words return equal results and, past
/// the first, come from the cache without side effects.
///
/// The counters expose query cost: `mq_count` counts cache misses,
/// `rpc_count` the underlying RPC calls. Both are zeroed by [`reset`],
/// which also clears the cache.
///
/// [`reset`]: MembershipOracle::reset
pub trait MembershipOracle<S: Symbol> {
    /// The alphabet over which queries are posed.
    fn alphabet(&self) -> &Alphabet<S>;

    /// Whether `word` is in the reference language. Never panics for words
    /// over the alphabet; probe failures reject the word instead.
    fn mq(&self, word: &Word<S>) -> bool;

    /// Clears the query cache and zeroes both counters.
    fn reset(&self);

    /// Number of membership queries that missed the cache.
    fn mq_count(&self) -> u64;

    /// Number of RPC calls issued.
    fn rpc_count(&self) -> u64;
}

impl<S: Symbol, O: MembershipOracle<S>> MembershipOracle<S> for &O {
    fn alphabet(&self) -> &Alphabet<S> {
        O::alphabet(self)
    }
    fn mq(&self, word: &Word<S>) -> bool {
        O::mq(self, word)
    }
    fn reset(&self) {
        O::reset(self)
    }
    fn mq_count(&self) -> u64 {
        O::mq_count(self)
    }
    fn rpc_count(&self) -> u64 {
        O::rpc_count(self)
    }
}

/// Word → verdict cache with a miss counter. Interior-mutable so that
/// oracles can stay shareable by reference while learning mutates nothing
/// but their bookkeeping.
#[derive(Debug)]
struct QueryCache<S: Symbol> {
    entries: RefCell<math::OrderedMap<Word<S>, bool>>,
    misses: Cell<u64>,
}

impl<S: Symbol> Default for QueryCache<S> {
    fn default() -> Self {
        Self {
            entries: RefCell::default(),
            misses: Cell::new(0),
        }
    }
}

impl<S: Symbol> QueryCache<S> {
    fn lookup(&self, word: &Word<S>) -> Option<bool> {
        self.entries.borrow().get(word).copied()
    }

    /// Counts the miss and stores the freshly evaluated verdict.
    fn store(&self, word: Word<S>, verdict: bool) {
        self.misses.set(self.misses.get() + 1);
        self.entries.borrow_mut().insert(word, verdict);
    }

    fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.misses.set(0);
    }

    fn misses(&self) -> u64 {
        self.misses.get()
    }
}

/// Accepts every non-empty word all of whose probes succeed. One probe per
/// symbol, in order, stopping at the first failure.
#[derive(Debug)]
pub struct SimpleOracle<S: Symbol, T: Transport> {
    alphabet: Alphabet<S>,
    probe: RpcProbe<S, T>,
    cache: QueryCache<S>,
}

impl<S: Symbol, T: Transport> SimpleOracle<S, T> {
    /// Creates the oracle over the given alphabet and probe issuer.
    pub fn new(alphabet: Alphabet<S>, probe: RpcProbe<S, T>) -> Self {
        Self {
            alphabet,
            probe,
            cache: QueryCache::default(),
        }
    }

    fn evaluate(&self, word: &Word<S>) -> bool {
        !word.is_empty() && word.symbols().all(|sym| self.probe.probe(sym))
    }
}

impl<S: Symbol, T: Transport> MembershipOracle<S> for SimpleOracle<S, T> {
    fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    fn mq(&self, word: &Word<S>) -> bool {
        if let Some(hit) = self.cache.lookup(word) {
            return hit;
        }
        let verdict = self.evaluate(word);
        self.cache.store(word.clone(), verdict);
        verdict
    }

    fn reset(&self) {
        self.cache.clear();
        self.probe.reset_count();
    }

    fn mq_count(&self) -> u64 {
        self.cache.misses()
    }

    fn rpc_count(&self) -> u64 {
        self.probe.count()
    }
}

/// Like [`SimpleOracle`] on the probe side, but the language additionally
/// rejects any word containing a meta symbol and accepts only words that
/// contain the account → tx-query → bytecode subsequence in order, with
/// arbitrary interleavings. The meta check happens before the symbol's
/// probe would go out.
#[derive(Debug)]
pub struct MediumOracle<S: Symbol, T: Transport> {
    alphabet: Alphabet<S>,
    probe: RpcProbe<S, T>,
    cache: QueryCache<S>,
}

impl<S: Symbol, T: Transport> MediumOracle<S, T> {
    /// Creates the oracle over the given alphabet and probe issuer.
    pub fn new(alphabet: Alphabet<S>, probe: RpcProbe<S, T>) -> Self {
        Self {
            alphabet,
            probe,
            cache: QueryCache::default(),
        }
    }

    fn evaluate(&self, word: &Word<S>) -> bool {
        // 0: nothing, 1: saw account, 2: account then tx, 3: full subsequence
        let mut progress = 0u8;
        for sym in word.symbols() {
            let class = self.probe.bindings().class_of(sym);
            if class == CallClass::Meta {
                return false;
            }
            if !self.probe.probe(sym) {
                return false;
            }
            progress = match (progress, class) {
                (0, CallClass::Account) => 1,
                (1, CallClass::TxQuery) => 2,
                (2, CallClass::Bytecode) => 3,
                _ => progress,
            };
        }
        progress == 3
    }
}

impl<S: Symbol, T: Transport> MembershipOracle<S> for MediumOracle<S, T> {
    fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    fn mq(&self, word: &Word<S>) -> bool {
        if let Some(hit) = self.cache.lookup(word) {
            return hit;
        }
        let verdict = self.evaluate(word);
        self.cache.store(word.clone(), verdict);
        verdict
    }

    fn reset(&self) {
        self.cache.clear();
        self.probe.reset_count();
    }

    fn mq_count(&self) -> u64 {
        self.cache.misses()
    }

    fn rpc_count(&self) -> u64 {
        self.probe.count()
    }
}

/// The four-phase reference language. A word walks phases 0→1→2→3:
/// account symbols are legal below phase 2 and lift to phase 1, tx-query
/// symbols are legal from phase 1 and lift to phase 2, bytecode symbols are
/// legal from phase 2 and set phase 3, call symbols are legal in phases 1
/// and 2 and leave the phase alone. Meta symbols and any symbol whose guard
/// does not match reject; in phase 3 no guard matches, so an accepting word
/// admits no extension. A symbol is probed only once its guard passed, and
/// a failed probe rejects. Accept iff the final phase is 3.
#[derive(Debug)]
pub struct ComplexOracle<S: Symbol, T: Transport> {
    alphabet: Alphabet<S>,
    probe: RpcProbe<S, T>,
    cache: QueryCache<S>,
}

impl<S: Symbol, T: Transport> ComplexOracle<S, T> {
    /// Creates the oracle over the given alphabet and probe issuer.
    pub fn new(alphabet: Alphabet<S>, probe: RpcProbe<S, T>) -> Self {
        Self {
            alphabet,
            probe,
            cache: QueryCache::default(),
        }
    }

    fn evaluate(&self, word: &Word<S>) -> bool {
        let mut phase = 0u8;
        for sym in word.symbols() {
            match self.probe.bindings().class_of(sym) {
                CallClass::Meta => return false,
                CallClass::Account => {
                    if phase >= 2 {
                        return false;
                    }
                    phase = phase.max(1);
                }
                CallClass::TxQuery => {
                    if phase < 1 {
                        return false;
                    }
                    phase = phase.max(2);
                }
                CallClass::Bytecode => {
                    if phase < 2 {
                        return false;
                    }
                    phase = 3;
                }
                CallClass::Call => {
                    if !(1..=2).contains(&phase) {
                        return false;
                    }
                }
            }
            if !self.probe.probe(sym) {
                return false;
            }
        }
        phase == 3
    }
}

impl<S: Symbol, T: Transport> MembershipOracle<S> for ComplexOracle<S, T> {
    fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    fn mq(&self, word: &Word<S>) -> bool {
        if let Some(hit) = self.cache.lookup(word) {
            return hit;
        }
        let verdict = self.evaluate(word);
        self.cache.store(word.clone(), verdict);
        trace!("MQ({}) = {verdict}", word.show());
        verdict
    }

    fn reset(&self) {
        self.cache.clear();
        self.probe.reset_count();
    }

    fn mq_count(&self) -> u64 {
        self.cache.misses()
    }

    fn rpc_count(&self) -> u64 {
        self.probe.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geth;
    use crate::rpc::testing::StaticTransport;

    fn complex() -> ComplexOracle<char, StaticTransport> {
        ComplexOracle::new(
            geth::alphabet(),
            RpcProbe::new(geth::bindings(), StaticTransport::reachable()),
        )
    }

    fn medium(transport: StaticTransport) -> MediumOracle<char, StaticTransport> {
        MediumOracle::new(geth::alphabet(), RpcProbe::new(geth::bindings(), transport))
    }

    fn simple(transport: StaticTransport) -> SimpleOracle<char, StaticTransport> {
        SimpleOracle::new(geth::alphabet(), RpcProbe::new(geth::bindings(), transport))
    }

    #[test]
    fn complex_phase_progression() {
        let oracle = complex();
        for (word, verdict) in [
            ("", false),
            ("A", false),
            ("AT", false),
            ("ATB", true),
            ("ATBM", false),
            ("ATBA", false),
            ("AATB", true),
            ("ACATB", true),
            ("M", false),
            ("TAB", false),
        ] {
            assert_eq!(oracle.mq(&Word::from(word)), verdict, "MQ({word})");
        }
    }

    #[test]
    fn complex_probe_accounting() {
        let oracle = complex();
        assert!(!oracle.mq(&Word::from("M")));
        // the meta symbol rejects before its probe goes out
        assert_eq!(oracle.rpc_count(), 0);
        assert!(oracle.mq(&Word::from("ATB")));
        assert_eq!(oracle.rpc_count(), 3);
        assert_eq!(oracle.mq_count(), 2);
    }

    #[test]
    fn cache_hits_have_no_side_effects() {
        let oracle = complex();
        assert!(oracle.mq(&Word::from("ATB")));
        let (mq, rpc) = (oracle.mq_count(), oracle.rpc_count());
        assert!(oracle.mq(&Word::from("ATB")));
        assert_eq!(oracle.mq_count(), mq);
        assert_eq!(oracle.rpc_count(), rpc);
    }

    #[test]
    fn reset_clears_cache_and_counters() {
        let oracle = complex();
        oracle.mq(&Word::from("ATB"));
        oracle.reset();
        assert_eq!(oracle.mq_count(), 0);
        assert_eq!(oracle.rpc_count(), 0);
        oracle.mq(&Word::from("ATB"));
        // the cache was cleared, so the query misses again
        assert_eq!(oracle.mq_count(), 1);
        assert_eq!(oracle.rpc_count(), 3);
    }

    #[test]
    fn simple_accepts_any_nonempty_word_on_a_reachable_endpoint() {
        let oracle = simple(StaticTransport::reachable());
        assert!(!oracle.mq(&Word::epsilon()));
        assert!(oracle.mq(&Word::from("A")));
        assert!(oracle.mq(&Word::from("AM")));
    }

    #[test]
    fn simple_rejects_on_first_failing_probe() {
        let oracle = simple(StaticTransport::reachable().with_unreachable("eth_getCode"));
        assert!(oracle.mq(&Word::from("AT")));
        assert!(!oracle.mq(&Word::from("ABT")));
        // the failing probe for B short-circuits before T is probed
        assert_eq!(oracle.rpc_count(), 4);
    }

    #[test]
    fn medium_requires_the_ordered_subsequence() {
        let oracle = medium(StaticTransport::reachable());
        assert!(oracle.mq(&Word::from("ATB")));
        assert!(!oracle.mq(&Word::from("BTA")));
        assert!(oracle.mq(&Word::from("ACTCBC")));
        assert!(!oracle.mq(&Word::from("ATBM")));
        assert!(!oracle.mq(&Word::from("MATB")));
    }

    #[test]
    fn medium_rejects_on_protocol_error() {
        let oracle = medium(StaticTransport::reachable().with_rpc_error("eth_getTransactionCount"));
        assert!(!oracle.mq(&Word::from("ATB")));
    }
}
