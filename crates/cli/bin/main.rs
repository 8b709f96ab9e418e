use clap::Parser;
use eyre::Result;
use kestrel_cli::{
    args::{Kestrel, KestrelSubcommand},
    handler, utils,
};

fn main() -> Result<()> {
    handler::install();
    utils::subscriber();
    let args = Kestrel::parse();
    main_args(args)
}

#[tokio::main]
async fn main_args(args: Kestrel) -> Result<()> {
    match args.cmd {
        KestrelSubcommand::Prepare(cmd) => cmd.run().await,
        KestrelSubcommand::Send(cmd) => cmd.run().await,
        KestrelSubcommand::Import(cmd) => cmd.run(),
    }
}
