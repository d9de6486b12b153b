//! Per-client parsers that lower raw output into a [`CanonicalTrace`].
//!
//! Every client gets it slightly wrong in its own way. The variants below
//! undo those quirks, while [`TraceBuilder`] enforces the rules that hold no
//! matter who produced the trace:
//! - `STOP` and `INVALID` are never kept, since clients disagree on whether
//!   they emit them at all.
//! - a state root is only kept once at least one instruction was kept.
//!
//! Malformed lines and unknown opcodes are logged and skipped. A trace that
//! recovers nothing is empty, never an error.

mod cpp;
mod geth;
mod hera;
mod js;
mod parity;
mod py;

use evmlab_common::opcodes::{INVALID, STOP};
use evmlab_common::OpcodeTable;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::quantity::{normalize_root, Quantity};
use crate::{
    CanonicalTrace, FinalStep, OpStep, RawOutput, StateRootStep, Stream, TraceConfig, TraceStep,
};

/// Only this much of a problematic line is logged.
const MAX_LOGGED_LINE: usize = 500;

/// The client implementations we know how to read.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClientKind {
    /// ethereumjs: `# `-prefixed JSON lines, with a closing summary.
    Js,
    /// Hera (ewasm): stack printed top-first and zero-padded.
    Hera,
    /// aleth / testeth: either one JSON array or one record per line.
    Cpp,
    /// pyethereum: structured log events.
    Py,
    /// go-ethereum `evm`: 1-based depth, roots after the instructions.
    Geth,
    /// parity-evm: 1-based depth, roots sometimes only inside an error.
    Parity,
}

impl ClientKind {
    /// The stream the client writes its trace to.
    pub const fn default_stream(self) -> Stream {
        match self {
            ClientKind::Geth => Stream::Stderr,
            _ => Stream::Stdout,
        }
    }
}

/// Turns one client's [`RawOutput`] into a [`CanonicalTrace`].
#[derive(Clone, Copy, Debug)]
pub struct Canonicalizer {
    kind: ClientKind,
    config: TraceConfig,
    table: OpcodeTable,
}

impl Canonicalizer {
    pub const fn new(kind: ClientKind, config: TraceConfig) -> Self {
        Self {
            kind,
            config,
            table: OpcodeTable::standard(),
        }
    }

    pub const fn with_table(self, table: OpcodeTable) -> Self {
        Self { table, ..self }
    }

    pub const fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Pure: the same output always yields the same trace.
    pub fn canonicalize(&self, output: &RawOutput) -> CanonicalTrace {
        let mut trace = TraceBuilder::new(self.kind, &self.table, self.config);
        let lines = output.lines();
        match self.kind {
            ClientKind::Js => js::canonicalize(lines, &mut trace),
            ClientKind::Hera => hera::canonicalize(lines, &mut trace),
            ClientKind::Cpp => cpp::canonicalize(lines, &mut trace),
            ClientKind::Py => py::canonicalize(lines, &mut trace),
            ClientKind::Geth => geth::canonicalize(lines, &mut trace),
            ClientKind::Parity => parity::canonicalize(lines, &mut trace),
        }
        trace.finish()
    }
}

/// An opcode as a client names it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum RawOp {
    Code(u64),
    Name(String),
}

/// The union of the fields the JSON-line clients emit. Which ones are present
/// decides what a record is.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    pc: Option<u64>,
    op: Option<RawOp>,
    op_name: Option<String>,
    gas: Option<Quantity>,
    depth: Option<u64>,
    stack: Option<Vec<Quantity>>,
    state_root: Option<String>,
    output: Option<String>,
    gas_used: Option<Quantity>,
    /// A string for most clients, an object for some.
    error: Option<serde_json::Value>,
    time: Option<u64>,
    test: Option<serde_json::Value>,
}

impl RawRecord {
    fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| match error {
            serde_json::Value::String(message) => message.clone(),
            other => other.to_string(),
        })
    }
}

fn truncated(line: &str) -> &str {
    line.get(..MAX_LOGGED_LINE).unwrap_or(line)
}

/// Decode one record, logging and swallowing failures.
fn parse_line<T: DeserializeOwned>(kind: ClientKind, line: &str) -> Option<T> {
    match serde_json::from_str(line) {
        Ok(it) => Some(it),
        Err(e) => {
            warn!(
                "couldn't parse {kind} output: {e}; problematic line: {}",
                truncated(line)
            );
            None
        }
    }
}

/// Accumulates canonical steps for one trace.
struct TraceBuilder<'a> {
    kind: ClientKind,
    table: &'a OpcodeTable,
    config: TraceConfig,
    steps: Vec<TraceStep>,
    ops: usize,
    /// Roots reported before we know whether any instruction ran.
    addendum: Vec<StateRootStep>,
}

impl<'a> TraceBuilder<'a> {
    fn new(kind: ClientKind, table: &'a OpcodeTable, config: TraceConfig) -> Self {
        Self {
            kind,
            table,
            config,
            steps: Vec::new(),
            ops: 0,
            addendum: Vec::new(),
        }
    }

    fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    const fn op_count(&self) -> usize {
        self.ops
    }

    /// Resolve a client opcode to its byte and canonical mnemonic.
    fn resolve(&self, op: &RawOp) -> Option<(u8, &'static str)> {
        let code = match op {
            RawOp::Code(code) => u8::try_from(*code).ok()?,
            RawOp::Name(name) => self.table.opcode(name)?,
        };
        Some((code, self.table.mnemonic(code)?))
    }

    /// Build an instruction step, with `depth_base` subtracted from the
    /// client's depth.
    fn op_step(&self, record: &RawRecord, depth_base: u64) -> Option<OpStep> {
        let kind = self.kind;
        let (Some(pc), Some(op), Some(gas), Some(depth)) =
            (record.pc, &record.op, &record.gas, record.depth)
        else {
            warn!("{kind} record is missing one of pc/op/gas/depth: {record:?}");
            return None;
        };
        let Some((op, op_name)) = self.resolve(op) else {
            warn!("got {kind} step for an unknown opcode: {record:?}");
            return None;
        };
        let Some(depth) = depth.checked_sub(depth_base) else {
            warn!("{kind} reported depth {depth}, below its base of {depth_base}");
            return None;
        };
        let Some(gas) = gas.to_hex() else {
            warn!("{kind} step at pc {pc} has non-numeric gas: {gas:?}");
            return None;
        };
        let stack = record
            .stack
            .iter()
            .flatten()
            .map(Quantity::to_hex)
            .collect::<Option<Vec<_>>>()
            .or_else(|| {
                warn!("{kind} step at pc {pc} has a non-numeric stack entry");
                None
            })?;
        Some(OpStep {
            pc,
            op,
            op_name: op_name.to_owned(),
            gas,
            depth,
            stack,
        })
    }

    /// Returns whether the step was kept.
    fn push_op(&mut self, step: OpStep) -> bool {
        if step.op == STOP || step.op == INVALID {
            return false;
        }
        self.steps.push(step.into());
        self.ops += 1;
        true
    }

    /// Keep a root inline, if anything executed before it.
    fn push_state_root(&mut self, root: &str) {
        if !self.config.include_state_root {
            return;
        }
        if self.ops == 0 {
            debug!("dropping {} state root reported before any step", self.kind);
            return;
        }
        self.steps.push(
            StateRootStep {
                state_root: normalize_root(root),
            }
            .into(),
        );
    }

    /// Hold a root back until the end of the trace.
    fn defer_state_root(&mut self, root: &str) {
        if self.config.include_state_root {
            self.addendum.push(StateRootStep {
                state_root: normalize_root(root),
            });
        }
    }

    fn push_final(&mut self, step: FinalStep) {
        self.steps.push(step.into());
    }

    fn finish(mut self) -> CanonicalTrace {
        if self.ops > 0 {
            self.steps.extend(self.addendum.into_iter().map(TraceStep::from));
        } else if !self.addendum.is_empty() {
            debug!(
                "dropping {} deferred {} state root(s), nothing executed",
                self.addendum.len(),
                self.kind
            );
        }
        self.steps.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator as _;

    use super::*;

    #[test]
    fn every_kind_accepts_empty_output() {
        for kind in ClientKind::iter() {
            let trace = Canonicalizer::new(kind, TraceConfig::default())
                .canonicalize(&RawOutput::default());
            assert!(trace.is_empty(), "{kind}");
        }
    }

    #[test]
    fn kinds_parse_from_lowercase() {
        assert_eq!("parity".parse::<ClientKind>().unwrap(), ClientKind::Parity);
        assert_eq!(ClientKind::Cpp.to_string(), "cpp");
        assert!("besu".parse::<ClientKind>().is_err());
    }

    #[test]
    fn builder_drops_stop_and_invalid() {
        let table = OpcodeTable::standard();
        let mut builder = TraceBuilder::new(ClientKind::Geth, &table, TraceConfig::default());
        let step = |op: u8| OpStep {
            pc: 0,
            op,
            op_name: table.mnemonic(op).unwrap().into(),
            gas: "0x0".into(),
            depth: 0,
            stack: vec![],
        };
        assert!(!builder.push_op(step(STOP)));
        assert!(!builder.push_op(step(INVALID)));
        builder.push_state_root("0x01");
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn resolves_names_and_codes_to_the_same_mnemonic() {
        let table = OpcodeTable::standard();
        let builder = TraceBuilder::new(ClientKind::Cpp, &table, TraceConfig::default());
        assert_eq!(
            builder.resolve(&RawOp::Name("KECCAK256".into())),
            builder.resolve(&RawOp::Code(0x20))
        );
        assert_eq!(builder.resolve(&RawOp::Code(0x0c)), None);
        assert_eq!(builder.resolve(&RawOp::Code(0x160)), None);
    }
}
