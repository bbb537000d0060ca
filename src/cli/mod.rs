//! Command-line interface for fieldsync.

pub mod args;
pub mod commands;
