use clap::Parser;
use log::{error, info};
use server::auth::AccountStore;
use server::handoff::PortAllocator;
use server::lobby::Lobby;
use server::network::LobbyServer;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, loads the account store, then runs
/// the lobby server until it fails or Ctrl+C arrives.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "15000")]
        port: u16,
        /// Path of the persisted account file
        #[clap(short, long, default_value = "users.json")]
        users_file: String,
        /// Lowest port handed out for peer-to-peer games
        #[clap(long, default_value = "20000")]
        p2p_port_min: u16,
        /// Highest port handed out for peer-to-peer games
        #[clap(long, default_value = "21000")]
        p2p_port_max: u16,
    }

    env_logger::init();
    let args = Args::parse();

    let accounts = AccountStore::load(&args.users_file).await?;
    info!(
        "Loaded {} account(s) from {}",
        accounts.len(),
        args.users_file
    );

    let lobby = Arc::new(Lobby::new(
        accounts,
        PortAllocator::new(args.p2p_port_min, args.p2p_port_max),
    ));

    let address = format!("{}:{}", args.host, args.port);
    let server = LobbyServer::bind(&address, lobby).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
