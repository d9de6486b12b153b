//! Canonicalize and compare EVM execution traces from different clients.
//!
//! Each client prints its per-instruction trace in its own dialect. A
//! [`Canonicalizer`] lowers one client's [`RawOutput`] into a
//! [`CanonicalTrace`], a sequence of [`TraceStep`]s in a single shared shape,
//! so that two clients agree on a step exactly when their canonical steps are
//! equal. [`compare`] then walks N such traces in lockstep and reports where
//! they part ways.
//!
//! ```
//! use trace_diff::{compare, Canonicalizer, ClientKind, NamedTrace, RawOutput, Stream, TraceConfig};
//!
//! let config = TraceConfig::default();
//! let geth = RawOutput::from_text(
//!     Stream::Stderr,
//!     r#"{"pc":0,"op":96,"gas":"0x2540be400","depth":1,"stack":[],"opName":"PUSH1"}"#,
//! );
//! let parity = RawOutput::from_text(
//!     Stream::Stdout,
//!     r#"{"pc":0,"op":96,"gas":"0x2540be400","depth":1,"stack":[],"opName":"PUSH1"}"#,
//! );
//! let geth = Canonicalizer::new(ClientKind::Geth, config).canonicalize(&geth);
//! let parity = Canonicalizer::new(ClientKind::Parity, config).canonicalize(&parity);
//!
//! let result = compare(
//!     &[NamedTrace::new("geth", &geth), NamedTrace::new("parity", &parity)],
//!     &config,
//! )
//! .unwrap();
//! assert!(result.equivalent);
//! ```

mod canon;
mod compare;
mod config;
mod quantity;
mod stats;
mod step;

pub use canon::{Canonicalizer, ClientKind};
pub use compare::{compare, CompareError, ComparisonResult, NamedTrace};
pub use config::TraceConfig;
pub use stats::{annotate, Annotated, TraceStats};
pub use step::{CanonicalTrace, FinalStep, OpStep, RawOutput, StateRootStep, Stream, TraceStep};
