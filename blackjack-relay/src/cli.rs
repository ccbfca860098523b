use std::net::{IpAddr, SocketAddr};

use clap::{Args, Parser, Subcommand};

use crate::room::DEFAULT_HISTORY_LIMIT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server, dealing cards to every connected player.
    Server(ServerArgs),
    /// Connect to a relay server and play from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Ports to listen on. Every port shares the same table and deck; use 0 for an ephemeral port.
    #[arg(required = true, num_args = 1..)]
    pub ports: Vec<u16>,

    /// Address the listeners bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Number of recent frames replayed to players when they join.
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history: usize,

    /// Seed for the deck shuffle, for reproducible games.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the relay server to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}
