//! CLI module for devloop - command-line interface and subcommands.
//!
//! Provides the main entry point with the `dev` session command and a
//! `tools` listing command.

pub mod commands;

pub use commands::Cli;
