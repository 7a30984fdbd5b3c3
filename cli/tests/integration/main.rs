//! Integration tests for flotilla CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! None of them reach the machines API.

mod cli_tests;
mod config_command;
