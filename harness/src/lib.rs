//! Run several EVM implementations against the same input and report where
//! their execution traces diverge.
//!
//! The trace handling itself lives in [`trace_diff`]; this crate launches
//! the clients ([`runner`]), fetches chain state to build inputs from
//! ([`chain`]), and wires both into the `evmdiff` binary.

pub mod chain;
pub mod env;
pub mod runner;
pub mod tracing;

/// Common information for the `--version` CLI flags.
pub fn version() -> String {
    let pkg_name = env!("CARGO_PKG_NAME");
    let pkg_version = env!("CARGO_PKG_VERSION");
    format!("{pkg_name} {pkg_version} (trace_diff)")
}
