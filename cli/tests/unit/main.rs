//! Unit tests for the flotilla CLI
//!
//! Source-level checks that run fast without building or spawning the binary.

mod architecture;
