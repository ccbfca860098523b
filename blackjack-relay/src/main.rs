use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use blackjack_relay::{
    cli::{Cli, Command, ServerArgs},
    client,
    deck::SharedDeck,
    room::Room,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn run_server(args: ServerArgs) -> Result<()> {
    // The deck is built and shuffled before any player can hit.
    let deck = SharedDeck::shuffled(args.seed);
    let room = Arc::new(Room::with_history_limit(args.history));

    let server = Server::bind(args.host, &args.ports, room, deck).await?;
    for addr in server.local_addrs()? {
        info!("server listening on {}", addr);
    }

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await?,
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
