//! Subcommands of the `kestrel` binary.

pub mod import;
pub mod prepare;
pub mod send;
