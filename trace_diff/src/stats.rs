//! Pass-through statistics over a trace.

use std::borrow::Borrow;

use evmlab_common::CONSTANTINOPLE_OPCODES;
use serde::{Deserialize, Serialize};

use crate::TraceStep;

/// What [`Annotated`] has seen so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub max_depth: u64,
    /// Steps executing an opcode introduced in Constantinople.
    pub constantinople_ops: usize,
}

impl TraceStats {
    fn observe(&mut self, step: &TraceStep) {
        let Some(op) = step.as_op() else {
            return;
        };
        self.max_depth = self.max_depth.max(op.depth);
        if CONSTANTINOPLE_OPCODES.contains(&op.op) {
            self.constantinople_ops += 1;
        }
    }
}

/// Wrap `trace` so that iterating it also gathers [`TraceStats`].
///
/// Steps are forwarded untouched. Works over owned steps as well as
/// references, so a [`CanonicalTrace`](crate::CanonicalTrace) can be
/// annotated without cloning it:
///
/// ```
/// # use trace_diff::{annotate, CanonicalTrace};
/// let trace = CanonicalTrace::default();
/// let mut annotated = annotate(&trace);
/// assert_eq!(annotated.by_ref().count(), 0);
/// assert_eq!(annotated.stats().max_depth, 0);
/// ```
pub fn annotate<I>(trace: I) -> Annotated<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<TraceStep>,
{
    Annotated {
        inner: trace.into_iter(),
        stats: TraceStats::default(),
        stopped: false,
    }
}

#[derive(Clone, Debug)]
pub struct Annotated<I> {
    inner: I,
    stats: TraceStats,
    stopped: bool,
}

impl<I> Annotated<I> {
    /// Freeze the counters. Steps keep flowing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub const fn stats(&self) -> TraceStats {
        self.stats
    }
}

impl<I> Iterator for Annotated<I>
where
    I: Iterator,
    I::Item: Borrow<TraceStep>,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.inner.next()?;
        if !self.stopped {
            self.stats.observe(step.borrow());
        }
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
