//! `evm --json` from go-ethereum. Depth starts at 1 and the post-state root
//! is printed after the summary, so roots are held back until the end.

use super::{parse_line, RawRecord, TraceBuilder};

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    for line in lines.filter(|line| line.starts_with('{')) {
        let Some(record) = parse_line::<RawRecord>(trace.kind, line) else {
            continue;
        };
        if let Some(root) = &record.state_root {
            trace.defer_state_root(root);
            continue;
        }
        // Summaries: `{"output":"","gasUsed":"0x34a48","time":4787059}` and
        // friends.
        if (record.error.is_some() && record.output.is_some()) || record.time.is_some() {
            continue;
        }
        if record.op.is_none() {
            if record.output.is_none() {
                log::warn!("geth record without an op: {record:?}");
            }
            continue;
        }
        if record.op_name.as_deref() == Some("") {
            continue;
        }
        if let Some(step) = trace.op_step(&record, 1) {
            trace.push_op(step);
        }
    }
}
