//! parity-evm. Depth starts at 1. When a state test has no usable post state
//! the root is only reported inside a mismatch error.

use lazy_regex::regex_captures;

use super::{parse_line, RawRecord, TraceBuilder};

pub(super) fn canonicalize<'a>(lines: impl Iterator<Item = &'a str>, trace: &mut TraceBuilder) {
    for line in lines.filter(|line| line.starts_with('{')) {
        let Some(record) = parse_line::<RawRecord>(trace.kind, line) else {
            continue;
        };
        // The first record names the test.
        if record.test.is_some() {
            continue;
        }
        if let Some(root) = &record.state_root {
            if trace.op_count() > 0 {
                trace.defer_state_root(root);
            }
            continue;
        }
        if record.error.is_some() || record.output.is_some() {
            if let Some(root) = record.error_message().as_deref().and_then(mismatched_root) {
                trace.defer_state_root(root);
            }
            continue;
        }
        if record.op.is_none() {
            log::warn!("parity record without an op: {record:?}");
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

/// The actual root, out of the error parity raises when the expected one is
/// the `deadc0de` placeholder.
fn mismatched_root(error: &str) -> Option<&str> {
    let (_, root) = regex_captures!(
        r"State root mismatch \(got: 0x([0-9a-f]{64}), expected: 0x0{56}deadc0de\)",
        error
    )?;
    Some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_root_from_a_mismatch() {
        let root = "ab".repeat(32);
        let error = format!(
            "State root mismatch (got: 0x{root}, expected: 0x{}deadc0de)",
            "0".repeat(56)
        );
        assert_eq!(mismatched_root(&error), Some(root.as_str()));
    }

    #[test]
    fn ignores_other_mismatches() {
        let error = format!(
            "State root mismatch (got: 0x{}, expected: 0x{})",
            "ab".repeat(32),
            "cd".repeat(32)
        );
        assert_eq!(mismatched_root(&error), None);
    }
}
