//! The canonical step representation every client trace is lowered to.

use std::fmt::{self, Display};
use std::ops::Deref;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

/// Stacks longer than this are abbreviated when rendered.
const MAX_RENDERED_STACK: usize = 6;
/// How many of the topmost entries survive the abbreviation.
const ABBREVIATED_STACK: usize = 4;

/// One executed instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStep {
    pub pc: u64,
    pub op: u8,
    pub op_name: String,
    /// Gas remaining before the instruction, as minimal `0x` hex.
    pub gas: String,
    /// Call depth, always 0-based.
    pub depth: u64,
    /// Bottom of the stack first. Entries are minimal `0x` hex.
    pub stack: Vec<String>,
}

/// The post-state root a client reports after executing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRootStep {
    pub state_root: String,
}

/// The closing summary of an execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalStep {
    pub output: String,
    pub gas_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceStep {
    Op(OpStep),
    StateRoot(StateRootStep),
    Final(FinalStep),
}

impl TraceStep {
    pub const fn as_op(&self) -> Option<&OpStep> {
        match self {
            TraceStep::Op(op) => Some(op),
            _ => None,
        }
    }

    pub const fn is_state_root(&self) -> bool {
        matches!(self, TraceStep::StateRoot(_))
    }
}

impl From<OpStep> for TraceStep {
    fn from(value: OpStep) -> Self {
        TraceStep::Op(value)
    }
}

impl From<StateRootStep> for TraceStep {
    fn from(value: StateRootStep) -> Self {
        TraceStep::StateRoot(value)
    }
}

impl From<FinalStep> for TraceStep {
    fn from(value: FinalStep) -> Self {
        TraceStep::Final(value)
    }
}

impl Display for OpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc {:>5} op {:>10}({:>3}) gas {:>8} depth {:>2} stack ",
            self.pc, self.op_name, self.op, self.gas, self.depth
        )?;
        match self.stack.len() {
            len if len > MAX_RENDERED_STACK => write!(
                f,
                "... [{}]",
                self.stack[len - ABBREVIATED_STACK..].iter().join(", ")
            ),
            _ => write!(f, "[{}]", self.stack.iter().join(", ")),
        }
    }
}

impl Display for StateRootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stateRoot {}", self.state_root)
    }
}

impl Display for FinalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = self.output.strip_prefix("0x").unwrap_or(&self.output);
        write!(f, "output {output} gasUsed {}", self.gas_used)?;
        match &self.error {
            Some(error) if error.to_lowercase().contains("out of gas") => write!(f, " err: OOG"),
            Some(error) => write!(f, " err: {error}"),
            None => Ok(()),
        }
    }
}

impl Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceStep::Op(it) => it.fmt(f),
            TraceStep::StateRoot(it) => it.fmt(f),
            TraceStep::Final(it) => it.fmt(f),
        }
    }
}

/// An ordered, frozen sequence of [`TraceStep`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalTrace(Vec<TraceStep>);

impl CanonicalTrace {
    pub fn steps(&self) -> &[TraceStep] {
        &self.0
    }

    /// Number of instruction steps, ignoring roots and summaries.
    pub fn op_count(&self) -> usize {
        self.0.iter().filter(|step| step.as_op().is_some()).count()
    }
}

impl Deref for CanonicalTrace {
    type Target = [TraceStep];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<TraceStep> for CanonicalTrace {
    fn from_iter<T: IntoIterator<Item = TraceStep>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CanonicalTrace {
    type Item = TraceStep;
    type IntoIter = std::vec::IntoIter<TraceStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CanonicalTrace {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Which of a process's output streams carries the trace.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

/// The text a client produced, split into lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stream: Stream,
    pub lines: Vec<String>,
}

impl RawOutput {
    pub fn new<I, S>(stream: Stream, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Split captured text into lines. Surrounding whitespace is dropped, so
    /// there is never a trailing blank line.
    pub fn from_text(stream: Stream, text: &str) -> Self {
        Self::new(stream, text.trim().lines())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push1() -> OpStep {
        OpStep {
            pc: 0,
            op: 0x60,
            op_name: "PUSH1".into(),
            gas: "0x2540be400".into(),
            depth: 0,
            stack: vec![],
        }
    }

    #[test]
    fn renders_op() {
        assert_eq!(
            push1().to_string(),
            "pc     0 op      PUSH1( 96) gas 0x2540be400 depth  0 stack []"
        );
    }

    #[test]
    fn long_stacks_keep_the_top_four() {
        let step = OpStep {
            stack: (0..8).map(|i| format!("0x{i}")).collect(),
            ..push1()
        };
        assert!(step
            .to_string()
            .ends_with("stack ... [0x4, 0x5, 0x6, 0x7]"));
    }

    #[test]
    fn renders_final_step() {
        let step = FinalStep {
            output: "0xc0ffee".into(),
            gas_used: "0x5208".into(),
            error: Some("Out of gas".into()),
        };
        assert_eq!(step.to_string(), "output c0ffee gasUsed 0x5208 err: OOG");
    }

    #[test]
    fn raw_output_has_no_trailing_blank_line() {
        let raw = RawOutput::from_text(Stream::Stdout, "a\nb\n\n");
        assert_eq!(raw.lines, ["a", "b"]);
        assert!(RawOutput::from_text(Stream::Stderr, "\n").is_empty());
    }

    #[test]
    fn untagged_steps_deserialize_by_shape() {
        let root: TraceStep = serde_json::from_str(r#"{"stateRoot":"0x01"}"#).unwrap();
        assert!(root.is_state_root());
        let op: TraceStep = serde_json::from_value(serde_json::to_value(push1()).unwrap()).unwrap();
        assert_eq!(op.as_op(), Some(&push1()));
    }
}
