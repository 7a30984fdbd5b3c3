//! Command implementations

pub mod config;
pub mod machine;
pub mod run;
pub mod version;
