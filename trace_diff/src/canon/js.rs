//! ethereumjs prints its trace interleaved with other chatter; trace records
//! are the lines starting with `# {`.

use super::{parse_line, RawRecord, TraceBuilder};
use crate::FinalStep;

const PREFIX: &str = "# ";

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    for line in lines {
        let Some(json) = line.strip_prefix(PREFIX).filter(|it| it.starts_with('{')) else {
            continue;
        };
        let Some(record) = parse_line::<RawRecord>(trace.kind, json) else {
            continue;
        };
        if let Some(root) = &record.state_root {
            trace.push_state_root(root);
        } else if let Some(gas_used) = &record.gas_used {
            let Some(gas_used) = gas_used.to_hex() else {
                log::warn!("js summary has a non-numeric gasUsed: {record:?}");
                continue;
            };
            trace.push_final(FinalStep {
                output: record.output.clone().unwrap_or_default(),
                gas_used,
                error: record.error_message(),
            });
        } else if let Some(step) = trace.op_step(&record, 0) {
            trace.push_op(step);
        }
    }
}
