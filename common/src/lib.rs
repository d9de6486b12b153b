//! Tables shared between the trace canonicalizers and the harness.

pub mod opcodes;

pub use opcodes::{OpcodeTable, CONSTANTINOPLE_OPCODES};
