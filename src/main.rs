use anyhow::Result;
use clap::Parser;

mod api;
mod approval;
mod chain;
mod cli;
mod config;
mod context;
mod monitoring;
mod safe;
mod server;
mod transport;
mod wallet;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run(cli::args::Cli::parse()).await
}
