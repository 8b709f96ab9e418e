//! # kestrel-cli
//!
//! The `kestrel` command line: argument parsing, subcommands and error reporting.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod args;
pub mod cmd;
pub mod handler;
pub mod opts;
pub mod utils;
