use crate::cmd::{import::ImportArgs, prepare::PrepareArgs, send::SendArgs};
use clap::{Parser, Subcommand};

/// Prepare, confirm and sign dApp transaction requests.
#[derive(Debug, Parser)]
#[command(name = "kestrel", version, next_display_order = None)]
pub struct Kestrel {
    #[command(subcommand)]
    pub cmd: KestrelSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum KestrelSubcommand {
    /// Estimate gas, simulate and forecast fees for a request without signing it.
    #[command(visible_alias = "p")]
    Prepare(PrepareArgs),

    /// Confirm, sign and send a request with a local key store.
    #[command(visible_alias = "s")]
    Send(SendArgs),

    /// Encrypt a private key or secret phrase into a key store file.
    #[command(visible_alias = "i")]
    Import(ImportArgs),
}
