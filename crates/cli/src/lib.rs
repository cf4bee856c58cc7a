//! Command implementations and output helpers for the `contract-check` binary.
pub mod commands;
pub mod output;
