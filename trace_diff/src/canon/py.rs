//! pyethereum logs structured events, one per line, after a free-form prefix.
//! Numbers may be printed as Python byte strings (`b'12'`).

use serde::Deserialize;

use super::{parse_line, RawOp, RawRecord, TraceBuilder};
use crate::quantity::Quantity;

const OP_EVENT: &str = "eth.vm.op.vm";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PyRecord {
    event: Option<String>,
    /// The mnemonic.
    op: Option<String>,
    /// The opcode byte.
    inst: Option<u64>,
    pc: Option<Quantity>,
    gas: Option<Quantity>,
    depth: Option<u64>,
    #[serde(default)]
    stack: Vec<Quantity>,
    state_root: Option<String>,
}

impl PyRecord {
    fn into_raw(self) -> RawRecord {
        let op = match (self.inst, self.op) {
            (Some(code), _) => Some(RawOp::Code(code)),
            (None, name) => name.map(RawOp::Name),
        };
        RawRecord {
            pc: self.pc.and_then(|pc| pc.unwrap_py_bytes().to_u64()),
            op,
            gas: self.gas.map(Quantity::unwrap_py_bytes),
            depth: self.depth,
            stack: Some(
                self.stack
                    .into_iter()
                    .map(Quantity::unwrap_py_bytes)
                    .collect(),
            ),
            ..RawRecord::default()
        }
    }
}

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    for line in lines {
        if line.starts_with("tx:") || line.starts_with("tx_decoded:") {
            continue;
        }
        let Some(start) = line.find('{') else {
            continue;
        };
        let Some(record) = parse_line::<PyRecord>(trace.kind, &line[start..]) else {
            continue;
        };
        if let Some(root) = &record.state_root {
            trace.push_state_root(root);
            continue;
        }
        if record.event.as_deref() != Some(OP_EVENT) {
            continue;
        }
        if let Some(step) = trace.op_step(&record.into_raw(), 0) {
            trace.push_op(step);
        }
    }
}
