//! Lockstep comparison of N canonical traces.
//!
//! Client 0 is the pivot: every other client is checked against it at each
//! position. When every other client disagrees with the pivot, nobody can be
//! presumed correct and all clients are flagged.

use std::fmt::{self, Display};

use itertools::Itertools as _;
use serde::Serialize;

use crate::{CanonicalTrace, TraceConfig, TraceStep};

/// Rendered in place of a step once a trace has ended.
const ABSENT: &str = "END";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompareError {
    #[error("comparing traces needs at least two clients, got {0}")]
    TooFewClients(usize),
}

/// A client's canonical trace, labelled for the report.
#[derive(Clone, Copy, Debug)]
pub struct NamedTrace<'a> {
    pub name: &'a str,
    pub trace: &'a CanonicalTrace,
}

impl<'a> NamedTrace<'a> {
    pub const fn new(name: &'a str, trace: &'a CanonicalTrace) -> Self {
        Self { name, trace }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// No aligned position disagreed.
    pub equivalent: bool,
    /// One line per agreed position, one per client for each disagreed one.
    pub annotated_log: Vec<String>,
    /// Index of the first disagreed position, if any.
    pub first_divergence: Option<usize>,
}

impl Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.annotated_log.iter().join("\n"))
    }
}

fn render(step: Option<&TraceStep>) -> String {
    step.map_or_else(|| ABSENT.to_owned(), ToString::to_string)
}

/// Compare `traces` position by position.
///
/// Shorter traces are padded with an absent marker, so a client that stops
/// early disagrees with those that carry on. With state roots excluded in
/// `config`, root steps are removed before aligning.
pub fn compare(
    traces: &[NamedTrace<'_>],
    config: &TraceConfig,
) -> Result<ComparisonResult, CompareError> {
    if traces.len() < 2 {
        return Err(CompareError::TooFewClients(traces.len()));
    }

    let aligned = traces
        .iter()
        .map(|named| {
            named
                .trace
                .iter()
                .filter(|step| config.include_state_root || !step.is_state_root())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let len = aligned.iter().map(Vec::len).max().unwrap_or_default();

    let mut result = ComparisonResult {
        equivalent: true,
        ..Default::default()
    };
    for position in 0..len {
        let row = aligned
            .iter()
            .map(|steps| steps.get(position).copied())
            .collect::<Vec<_>>();
        let pivot = row[0];
        let wrong = (1..row.len())
            .filter(|&client| row[client] != pivot)
            .collect::<Vec<_>>();

        if wrong.is_empty() {
            result
                .annotated_log
                .push(format!("[*] {:>8} {}", "", render(pivot)));
            continue;
        }

        result.equivalent = false;
        result.first_divergence.get_or_insert(position);
        let flag_all = wrong.len() == row.len() - 1;
        for (client, step) in row.iter().enumerate() {
            let name = traces[client].name;
            let line = if flag_all || wrong.contains(&client) {
                format!("[!!] {:>7} {}", name, render(*step))
            } else {
                format!("[*] {:>8} {}", name, render(*step))
            };
            result.annotated_log.push(line);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_two_clients() {
        let trace = CanonicalTrace::default();
        assert_eq!(
            compare(&[NamedTrace::new("solo", &trace)], &TraceConfig::default()),
            Err(CompareError::TooFewClients(1))
        );
        assert_eq!(
            compare(&[], &TraceConfig::default()),
            Err(CompareError::TooFewClients(0))
        );
    }

    #[test]
    fn empty_traces_agree() {
        let trace = CanonicalTrace::default();
        let result = compare(
            &[NamedTrace::new("a", &trace), NamedTrace::new("b", &trace)],
            &TraceConfig::default(),
        )
        .unwrap();
        assert!(result.equivalent);
        assert!(result.annotated_log.is_empty());
        assert_eq!(result.first_divergence, None);
    }
}
