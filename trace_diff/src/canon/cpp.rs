//! testeth either dumps the whole trace as one JSON array, or streams one
//! record per line. Opcodes are given by mnemonic.

use super::{parse_line, RawRecord, TraceBuilder};
use crate::TraceStep;

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    let mut records = Vec::new();
    for line in lines {
        if line.starts_with("[{") {
            records.extend(parse_line::<Vec<RawRecord>>(trace.kind, line).into_iter().flatten());
        } else if line.starts_with("{\"") {
            // testeth sometimes terminates a record with a full stop.
            let line = line.trim_end();
            let line = line.strip_suffix('.').unwrap_or(line);
            records.extend(parse_line::<RawRecord>(trace.kind, line));
        }
    }

    for record in &records {
        if let Some(root) = &record.state_root {
            trace.push_state_root(root);
            continue;
        }
        let Some(step) = trace.op_step(record, 0) else {
            continue;
        };
        // The last instruction is occasionally reported twice.
        if let Some(TraceStep::Op(last)) = trace.last() {
            if last.pc == step.pc && last.depth == step.depth {
                log::debug!("collapsing duplicate cpp step at pc {}", step.pc);
                continue;
            }
        }
        trace.push_op(step);
    }
}
