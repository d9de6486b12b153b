use assert2::{check, let_assert};
use serde_json::json;
use trace_diff::{
    Canonicalizer, CanonicalTrace, ClientKind, FinalStep, OpStep, RawOutput, StateRootStep,
    Stream, TraceConfig, TraceStep,
};

fn canonicalize_with(kind: ClientKind, config: TraceConfig, lines: &[String]) -> CanonicalTrace {
    Canonicalizer::new(kind, config).canonicalize(&RawOutput::new(kind.default_stream(), lines))
}

fn canonicalize(kind: ClientKind, lines: &[String]) -> CanonicalTrace {
    canonicalize_with(kind, TraceConfig::default(), lines)
}

fn op(pc: u64, op: u8, name: &str, gas: &str, depth: u64, stack: &[&str]) -> TraceStep {
    OpStep {
        pc,
        op,
        op_name: name.into(),
        gas: gas.into(),
        depth,
        stack: stack.iter().map(|it| it.to_string()).collect(),
    }
    .into()
}

fn root(root: &str) -> TraceStep {
    StateRootStep {
        state_root: root.into(),
    }
    .into()
}

/// A `evm --json` style record, depth 1-based.
fn numbered(pc: u64, op: u8, name: &str, gas: &str, depth: u64, stack: &[&str]) -> String {
    json!({"pc": pc, "op": op, "gas": gas, "depth": depth, "stack": stack, "opName": name})
        .to_string()
}

#[test]
fn geth_rebases_depth_and_appends_roots() {
    let lines = [
        json!({"stateRoot": "0xABCD"}).to_string(),
        numbered(0, 0x60, "PUSH1", "0x2540be400", 1, &[]),
        numbered(2, 0x60, "PUSH1", "0x2540be3fd", 2, &["0x0000000000000001"]),
        json!({"output": "", "gasUsed": "0x6", "time": 4787059}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Geth, &lines);
    check!(
        trace.steps()
            == [
                op(0, 0x60, "PUSH1", "0x2540be400", 0, &[]),
                op(2, 0x60, "PUSH1", "0x2540be3fd", 1, &["0x1"]),
                root("0xabcd"),
            ]
    );
}

#[test]
fn roots_need_an_executed_step() {
    let lines = [
        numbered(0, 0x00, "STOP", "0x0", 1, &[]),
        json!({"stateRoot": "0xabcd"}).to_string(),
    ];
    for kind in [ClientKind::Geth, ClientKind::Parity] {
        check!(canonicalize(kind, &lines).is_empty(), "{kind}");
    }
    check!(canonicalize(ClientKind::Cpp, &[json!({"stateRoot": "0xabcd"}).to_string()]).is_empty());
}

#[test]
fn stop_and_invalid_are_dropped() {
    let lines = [
        numbered(0, 0x01, "ADD", "0x10", 1, &["0x1", "0x2"]),
        numbered(1, 0xfe, "INVALID", "0xd", 1, &["0x3"]),
        numbered(2, 0x00, "STOP", "0xd", 1, &["0x3"]),
    ];
    let trace = canonicalize(ClientKind::Geth, &lines);
    check!(trace.steps() == [op(0, 0x01, "ADD", "0x10", 0, &["0x1", "0x2"])]);
}

#[test]
fn unknown_and_unnamed_opcodes_are_dropped() {
    let lines = [
        numbered(0, 0x0c, "opcode 0xc not defined", "0x10", 1, &[]),
        numbered(1, 0x60, "", "0x10", 1, &[]),
        numbered(2, 0x60, "PUSH1", "0x10", 1, &[]),
    ];
    for kind in [ClientKind::Geth, ClientKind::Parity] {
        let trace = canonicalize(kind, &lines);
        check!(trace.steps() == [op(2, 0x60, "PUSH1", "0x10", 0, &[])], "{kind}");
    }
}

#[test]
fn malformed_lines_are_skipped() {
    let lines = [
        r#"{"pc": 0, "op": "#.to_owned(),
        numbered(0, 0x60, "PUSH1", "0x10", 1, &[]),
        "INFO [01-01|00:00:00] not json at all".to_owned(),
        json!({"pc": 2, "op": 1, "depth": 1}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Geth, &lines);
    check!(trace.op_count() == 1);
}

#[test]
fn state_roots_can_be_excluded() {
    let lines = [
        numbered(0, 0x60, "PUSH1", "0x10", 1, &[]),
        json!({"stateRoot": "0xabcd"}).to_string(),
    ];
    let trace = canonicalize_with(ClientKind::Geth, TraceConfig::without_state_root(), &lines);
    check!(trace.steps() == [op(0, 0x60, "PUSH1", "0x10", 0, &[])]);
}

#[test]
fn canonicalizing_is_deterministic() {
    let lines = [
        numbered(0, 0x60, "PUSH1", "0x10", 1, &[]),
        json!({"stateRoot": "0xabcd"}).to_string(),
    ];
    for kind in [ClientKind::Geth, ClientKind::Parity] {
        check!(canonicalize(kind, &lines) == canonicalize(kind, &lines));
    }
}

#[test]
fn parity_recovers_root_from_mismatch_error() {
    let got = "5c".repeat(32);
    let lines = [
        json!({"test": "randomStatetest"}).to_string(),
        numbered(0, 0x60, "PUSH1", "0x10", 1, &[]),
        json!({
            "error": format!(
                "State root mismatch (got: 0x{got}, expected: 0x{}deadc0de)",
                "0".repeat(56)
            ),
            "gasUsed": "0x3",
            "time": 141,
        })
        .to_string(),
    ];
    let trace = canonicalize(ClientKind::Parity, &lines);
    check!(trace.steps() == [op(0, 0x60, "PUSH1", "0x10", 0, &[]), root(&format!("0x{got}"))]);
}

#[test]
fn parity_ignores_roots_before_any_step() {
    let lines = [
        json!({"stateRoot": "0xabcd"}).to_string(),
        numbered(0, 0x60, "PUSH1", "0x10", 1, &[]),
        json!({"output": "0x", "gasUsed": "0x3", "time": 141}).to_string(),
        json!({"stateRoot": "0x1234"}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Parity, &lines);
    check!(trace.steps() == [op(0, 0x60, "PUSH1", "0x10", 0, &[]), root("0x1234")]);
}

#[test]
fn cpp_reads_arrays_and_repairs_trailing_dots() {
    let array = json!([
        {"pc": 0, "op": "PUSH1", "gas": "100", "depth": 0, "stack": []},
        {"pc": 2, "op": "SHA3", "gas": "97", "depth": 0, "stack": ["1", "0x02"]},
    ]);
    let lines = [
        "some banner".to_owned(),
        array.to_string(),
        format!(
            "{}.",
            json!({"pc": 3, "op": "KECCAK256", "gas": "67", "depth": 0, "stack": ["0x0000dead"]})
        ),
        json!({"stateRoot": "abcd"}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Cpp, &lines);
    check!(
        trace.steps()
            == [
                op(0, 0x60, "PUSH1", "0x64", 0, &[]),
                op(2, 0x20, "SHA3", "0x61", 0, &["0x1", "0x2"]),
                op(3, 0x20, "SHA3", "0x43", 0, &["0xdead"]),
                root("0xabcd"),
            ]
    );
}

#[test]
fn cpp_collapses_duplicated_steps() {
    let add = json!({"pc": 1, "op": "ADD", "gas": "9999999997", "depth": 0, "stack": ["1", "2"]});
    let lines = [add.to_string(), add.to_string()];
    let trace = canonicalize(ClientKind::Cpp, &lines);
    check!(trace.steps() == [op(1, 0x01, "ADD", "0x2540be3fd", 0, &["0x1", "0x2"])]);
}

#[test]
fn hera_reverses_and_strips_the_stack() {
    let lines = [
        json!({"stateRoot": "0xabcd"}).to_string(),
        json!({"pc": 0, "op": 1, "gas": 100, "depth": 0, "stack": ["0x0000000000000002", "0x01"]})
            .to_string(),
        json!({"stateRoot": "0xABCD"}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Hera, &lines);
    check!(trace.steps() == [op(0, 0x01, "ADD", "0x64", 0, &["0x1", "0x2"]), root("0xabcd")]);
}

#[test]
fn py_unwraps_byte_strings() {
    let lines = [
        "tx: {\"nonce\": 0}".to_owned(),
        "tx_decoded: {\"nonce\": 0}".to_owned(),
        format!(
            "eth.vm.op.vm {}",
            json!({
                "event": "eth.vm.op.vm",
                "op": "PUSH1",
                "inst": 96,
                "pc": "b'0'",
                "gas": "b'100'",
                "depth": 0,
                "stack": [],
            })
        ),
        format!(
            "eth.vm.op.vm {}",
            json!({
                "event": "eth.vm.op.vm",
                "op": "ADD",
                "inst": 1,
                "pc": "b'2'",
                "gas": "b'97'",
                "depth": 0,
                "stack": ["b'5'", "b'255'"],
            })
        ),
        format!("eth.vm.exit {}", json!({"event": "eth.vm.exit", "depth": 0})),
        json!({"stateRoot": "0xabcd"}).to_string(),
    ];
    let trace = canonicalize(ClientKind::Py, &lines);
    check!(
        trace.steps()
            == [
                op(0, 0x60, "PUSH1", "0x64", 0, &[]),
                op(2, 0x01, "ADD", "0x61", 0, &["0x5", "0xff"]),
                root("0xabcd"),
            ]
    );
}

#[test]
fn js_reads_prefixed_lines_and_summary() {
    let lines = [
        "Running test".to_owned(),
        format!(
            "# {}",
            json!({"pc": 0, "op": 96, "gas": "0x10", "depth": 0, "stack": [], "opName": "PUSH1"})
        ),
        format!(
            "# {}",
            json!({"output": "0x", "gasUsed": "0x5208", "error": "out of gas"})
        ),
    ];
    let trace = canonicalize(ClientKind::Js, &lines);
    let_assert!([first, TraceStep::Final(summary)] = trace.steps());
    check!(*first == op(0, 0x60, "PUSH1", "0x10", 0, &[]));
    check!(
        *summary
            == FinalStep {
                output: "0x".into(),
                gas_used: "0x5208".into(),
                error: Some("out of gas".into()),
            }
    );
    check!(summary.to_string() == "output  gasUsed 0x5208 err: OOG");
}

#[test]
fn js_summaries_may_omit_output() {
    let lines = [
        format!("# {}", json!({"gasUsed": "0x5208", "time": 120})),
        format!(
            "# {}",
            json!({"pc": 0, "op": 96, "gas": "0x10", "depth": 0, "stack": [], "opName": "PUSH1"})
        ),
    ];
    let trace = canonicalize(ClientKind::Js, &lines);
    let_assert!([TraceStep::Final(summary), _] = trace.steps());
    check!(
        *summary
            == FinalStep {
                output: String::new(),
                gas_used: "0x5208".into(),
                error: None,
            }
    );
}

#[test]
fn steps_with_non_numeric_gas_are_dropped() {
    let lines = [
        numbered(0, 0x60, "PUSH1", "lots", 1, &[]),
        numbered(2, 0x01, "ADD", "0x10", 1, &[]),
    ];
    for kind in [ClientKind::Geth, ClientKind::Parity] {
        let trace = canonicalize(kind, &lines);
        check!(trace.steps() == [op(2, 0x01, "ADD", "0x10", 0, &[])], "{kind}");
    }
}

#[test]
fn geth_traces_on_stderr() {
    check!(ClientKind::Geth.default_stream() == Stream::Stderr);
    check!(ClientKind::Parity.default_stream() == Stream::Stdout);
}
