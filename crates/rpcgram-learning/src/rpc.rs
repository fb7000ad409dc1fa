use std::cell::Cell;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use rpcgram_core::{Symbol, math};

/// Default timeout for a single probe. A probe that does not answer within
/// this window counts as failed, which the oracles turn into a rejection of
/// the queried word.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A JSON-RPC 2.0 request as it goes over the wire. The id is constant;
/// probes are strictly sequential so responses never need correlating.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RpcRequest {
    /// Builds the request for one symbol binding.
    pub fn from_binding(binding: &SymbolBinding) -> Self {
        Self {
            jsonrpc: "2.0",
            method: binding.method.clone(),
            params: binding.params.clone(),
            id: 1,
        }
    }
}

/// Why a probe did not produce a usable response body.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("transport failure: {0}")]
    Transport(#[from] Box<ureq::Error>),
    #[error("response body is not JSON: {0}")]
    Body(#[from] std::io::Error),
}

/// The seam between oracles and the network. Implementations deliver one
/// request and hand back the parsed response body; whether that body
/// signals protocol-level failure is judged by the caller.
pub trait Transport {
    /// Sends `request` and returns the parsed JSON response body.
    fn send(&self, request: &RpcRequest) -> Result<Value, ProbeError>;
}

/// Blocking HTTP POST transport to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport for `endpoint` with the default probe timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_PROBE_TIMEOUT)
    }

    /// Creates a transport with an explicit per-probe timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint URL this transport posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &RpcRequest) -> Result<Value, ProbeError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(request)
            .map_err(Box::new)?;
        Ok(response.into_json::<Value>()?)
    }
}

/// Semantic class of a probe symbol. The reference languages are defined
/// over classes, not over concrete symbols, which keeps them meaningful for
/// any alphabet whose bindings cover these roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    /// Account state query.
    Account,
    /// Transaction / nonce query.
    TxQuery,
    /// Bytecode snapshot query.
    Bytecode,
    /// Read-only contract call.
    Call,
    /// Fee / log / meta query.
    Meta,
}

/// The request template and semantic class bound to one symbol.
#[derive(Debug, Clone)]
pub struct SymbolBinding {
    pub class: CallClass,
    pub method: String,
    pub params: Value,
}

/// The constant symbol → request mapping for a run. Binding lookup for a
/// symbol outside the table is a programmer error and panics; the learner
/// only ever queries words over the alphabet it was given.
#[derive(Debug, Clone)]
pub struct SymbolBindings<S: Symbol> {
    entries: math::OrderedMap<S, SymbolBinding>,
}

impl<S: Symbol> SymbolBindings<S> {
    /// Creates the table from `(symbol, binding)` entries.
    pub fn from_entries<I: IntoIterator<Item = (S, SymbolBinding)>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The binding for `sym`.
    ///
    /// # Panics
    /// Panics if `sym` has no binding.
    pub fn binding(&self, sym: S) -> &SymbolBinding {
        self.entries
            .get(&sym)
            .unwrap_or_else(|| panic!("unknown symbol {}: no request binding", sym.show()))
    }

    /// The semantic class of `sym`. Panics like [`Self::binding`].
    pub fn class_of(&self, sym: S) -> CallClass {
        self.binding(sym).class
    }

    /// Iterates over the bound symbols in table order.
    pub fn symbols(&self) -> impl Iterator<Item = S> + '_ {
        self.entries.keys().copied()
    }
}

/// Issues probes for symbols and counts every RPC call that actually goes
/// out. Owned by a membership oracle; the counter is interior-mutable so
/// probing can happen behind a shared oracle reference.
#[derive(Debug)]
pub struct RpcProbe<S: Symbol, T: Transport> {
    bindings: SymbolBindings<S>,
    transport: T,
    calls: Cell<u64>,
}

impl<S: Symbol, T: Transport> RpcProbe<S, T> {
    /// Creates a probe issuer over the given bindings and transport.
    pub fn new(bindings: SymbolBindings<S>, transport: T) -> Self {
        Self {
            bindings,
            transport,
            calls: Cell::new(0),
        }
    }

    /// The bindings table.
    pub fn bindings(&self) -> &SymbolBindings<S> {
        &self.bindings
    }

    /// Issues the probe for `sym` and reports success: the call answered in
    /// time, the body parsed as JSON and carries no `error` member. Exactly
    /// one RPC call is counted per invocation.
    pub fn probe(&self, sym: S) -> bool {
        let request = RpcRequest::from_binding(self.bindings.binding(sym));
        self.calls.set(self.calls.get() + 1);
        match self.transport.send(&request) {
            Ok(body) => {
                let ok = body.get("error").is_none();
                if !ok {
                    trace!("probe {} answered with error object", sym.show());
                }
                ok
            }
            Err(err) => {
                trace!("probe {} failed: {err}", sym.show());
                false
            }
        }
    }

    /// Number of RPC calls issued since construction or the last reset.
    pub fn count(&self) -> u64 {
        self.calls.get()
    }

    /// Zeroes the RPC call counter.
    pub fn reset_count(&self) {
        self.calls.set(0);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory transport for tests: every method succeeds unless listed
    /// as unreachable (transport error) or as answering with a JSON-RPC
    /// error object.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct StaticTransport {
        unreachable_methods: Vec<String>,
        error_methods: Vec<String>,
    }

    impl StaticTransport {
        /// A transport on which every probe succeeds.
        pub(crate) fn reachable() -> Self {
            Self::default()
        }

        /// Marks `method` as failing at the transport level.
        pub(crate) fn with_unreachable(mut self, method: &str) -> Self {
            self.unreachable_methods.push(method.to_string());
            self
        }

        /// Marks `method` as answering with a protocol error object.
        pub(crate) fn with_rpc_error(mut self, method: &str) -> Self {
            self.error_methods.push(method.to_string());
            self
        }
    }

    impl Transport for StaticTransport {
        fn send(&self, request: &RpcRequest) -> Result<Value, ProbeError> {
            if self.unreachable_methods.iter().any(|m| *m == request.method) {
                return Err(ProbeError::Body(std::io::Error::other("unreachable")));
            }
            if self.error_methods.iter().any(|m| *m == request.method) {
                return Ok(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32601, "message": "method not found" },
                }));
            }
            Ok(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": "0x0" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticTransport;
    use super::*;
    use crate::geth;

    #[test]
    fn request_serialises_to_json_rpc_2() {
        let bindings = geth::bindings();
        let request = RpcRequest::from_binding(bindings.binding('A'));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "eth_getBalance");
        assert_eq!(value["id"], 1);
        assert_eq!(value["params"][1], "latest");
    }

    #[test]
    fn probe_counts_every_call() {
        let probe = RpcProbe::new(geth::bindings(), StaticTransport::reachable());
        assert!(probe.probe('A'));
        assert!(probe.probe('A'));
        assert_eq!(probe.count(), 2);
        probe.reset_count();
        assert_eq!(probe.count(), 0);
    }

    #[test]
    fn error_object_and_unreachable_both_fail() {
        let probe = RpcProbe::new(
            geth::bindings(),
            StaticTransport::reachable()
                .with_rpc_error("eth_call")
                .with_unreachable("eth_getCode"),
        );
        assert!(probe.probe('A'));
        assert!(!probe.probe('C'));
        assert!(!probe.probe('B'));
        assert_eq!(probe.count(), 3);
    }

    #[test]
    #[should_panic(expected = "unknown symbol")]
    fn unbound_symbol_is_a_programmer_error() {
        let probe = RpcProbe::new(geth::bindings(), StaticTransport::reachable());
        probe.probe('X');
    }
}
