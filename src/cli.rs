use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bundlebox")]
#[command(about = "Bounded-memory media archive service", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $BUNDLEBOX_CONFIG or config/bundlebox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP front door
    Server(ServerArgs),
    /// Build one archive synchronously and print its result as JSON
    Assemble(AssembleArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct AssembleArgs {
    /// Job submission JSON (same shape as `POST /jobs`)
    #[arg(long)]
    pub job: PathBuf,
}
