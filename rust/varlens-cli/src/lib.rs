//! Varlens command-line library: configuration loading and the DAP server.

pub mod config;
pub mod dap;
