//! Thin aliases over [`indexmap`] so that every set and map in the workspace
//! iterates in insertion order. Witness selection during learning (which
//! prefix is unclosed, which pair is inconsistent) must be stable across
//! runs, so plain hash collections are not used anywhere.

/// A set that remembers insertion order.
pub type OrderedSet<T> = indexmap::IndexSet<T>;

/// A map that remembers insertion order of its keys.
pub type OrderedMap<K, V> = indexmap::IndexMap<K, V>;
