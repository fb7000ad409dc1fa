//! Active learning of the accepted call-sequence language of a stateful
//! JSON-RPC service.
//!
//! A [`oracle::MembershipOracle`] answers whether a word of abstract probe
//! symbols is in the reference language, translating symbols to concrete
//! JSON-RPC requests through a [`rpc::SymbolBindings`] table and counting
//! both membership queries and underlying RPC calls. Two learners infer a
//! [`rpcgram_core::Dfa`] for that language from queries alone:
//!
//! * [`lstar::LStar`] maintains an observation table and grows it on
//!   closedness and consistency defects;
//! * [`ttt::TttLearner`] maintains a binary discrimination tree and refines
//!   it by splitting leaves on counter-example analysis.
//!
//! Counter-examples come from an [`equivalence::EquivalenceOracle`], which
//! searches for a word on which the current hypothesis and the membership
//! oracle disagree. Everything is synchronous and single-threaded; the only
//! suspension points are the RPC probes themselves.

/// Equivalence oracles searching for counter-examples to a hypothesis.
pub mod equivalence;
/// The concrete geth symbol table: alphabet, request bindings, templates.
pub mod geth;
/// The L* learner and its observation table.
pub mod lstar;
/// Membership oracles over a probe transport: the three reference languages.
pub mod oracle;
/// JSON-RPC transport, symbol bindings and probe accounting.
pub mod rpc;
/// The TTT learner and its discrimination tree.
pub mod ttt;

pub use equivalence::{BoundedExhaustiveSearch, EquivalenceOracle, RandomWordSearch};
pub use lstar::LStar;
pub use oracle::{ComplexOracle, MediumOracle, MembershipOracle, SimpleOracle};
pub use ttt::TttLearner;
