//! The concrete single-character alphabet used against a geth endpoint and
//! its binding to JSON-RPC request templates. All of this is data; the
//! learners and oracles are parametric in the alphabet and only see the
//! semantic class of each symbol.

use serde_json::json;

use rpcgram_core::{Alphabet, Word};

use crate::rpc::{CallClass, SymbolBinding, SymbolBindings};

/// Endpoint probed when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8545";

/// Address used in every request template.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Block tag used in every request template.
pub const BLOCK_TAG: &str = "latest";

/// Σ = {A, T, B, C, M}: account, tx-query, bytecode, call, meta.
pub fn alphabet() -> Alphabet<char> {
    Alphabet::from_chars("ATBCM")
}

/// The symbol → request table.
pub fn bindings() -> SymbolBindings<char> {
    SymbolBindings::from_entries([
        ('A', SymbolBinding {
            class: CallClass::Account,
            method: "eth_getBalance".to_string(),
            params: json!([ZERO_ADDRESS, BLOCK_TAG]),
        }),
        ('T', SymbolBinding {
            class: CallClass::TxQuery,
            method: "eth_getTransactionCount".to_string(),
            params: json!([ZERO_ADDRESS, BLOCK_TAG]),
        }),
        ('B', SymbolBinding {
            class: CallClass::Bytecode,
            method: "eth_getCode".to_string(),
            params: json!([ZERO_ADDRESS, BLOCK_TAG]),
        }),
        ('C', SymbolBinding {
            class: CallClass::Call,
            method: "eth_call".to_string(),
            params: json!([{ "to": ZERO_ADDRESS, "data": "0x" }, BLOCK_TAG]),
        }),
        ('M', SymbolBinding {
            class: CallClass::Meta,
            method: "eth_feeHistory".to_string(),
            params: json!(["0x1", BLOCK_TAG, []]),
        }),
    ])
}

/// Template words for the first phase of the equivalence search: short
/// prefixes, the canonical accepting word, near-accepting variants and
/// words with injected meta/call symbols.
pub fn call_templates() -> Vec<Word<char>> {
    [
        "ATB", "AATB", "ACATB", "A", "AT", "AB", "TAB", "ACB", "ATBC", "M", "BAT", "TBA", "BTA",
        "TATB", "ATBM", "ATBB", "AC", "CA", "CB", "TC", "BC",
    ]
    .into_iter()
    .map(Word::from)
    .collect()
}
