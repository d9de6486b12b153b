use super::{parse_line, RawRecord, TraceBuilder};

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    for line in lines.filter(|line| line.starts_with('{')) {
        let Some(mut record) = parse_line::<RawRecord>(trace.kind, line) else {
            continue;
        };
        if let Some(root) = &record.state_root {
            trace.push_state_root(root);
            continue;
        }
        // Hera prints the top of the stack first.
        if let Some(stack) = &mut record.stack {
            stack.reverse();
        }
        if let Some(step) = trace.op_step(&record, 0) {
            trace.push_op(step);
        }
    }
}
