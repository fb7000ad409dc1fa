//! Core value types for learning the call-sequence language of a stateful
//! RPC service: abstract [`alphabet::Alphabet`]s of probe symbols, finite
//! [`word::Word`]s over them, and the immutable [`dfa::Dfa`] hypotheses that
//! learners emit.
//!
//! Everything in this crate is a plain value. The query machinery (oracles,
//! learners, transports) lives in `rpcgram-learning` and only ever hands
//! words in and takes automata out.

/// Ordered symbol sets and the [`alphabet::Symbol`] trait.
pub mod alphabet;
/// The deterministic finite automaton value object and its builder.
pub mod dfa;
/// Insertion-ordered collection aliases used throughout the workspace.
pub mod math;
/// The [`show::Show`] helper trait for compact display of symbols and words.
pub mod show;
/// Finite words over an alphabet.
pub mod word;

pub use alphabet::{Alphabet, Symbol};
pub use dfa::{Dfa, DfaBuilder, StateId};
pub use show::Show;
pub use word::Word;
