//! Maintenance commands for the Labitory authentication store.
//!
//! [`commands`] parses the command line, [`ops`] runs each command against
//! an [`AuthManager`](labitory::AuthManager) and [`render`] formats the
//! results for the terminal.

pub mod commands;
pub mod ops;
pub mod render;
