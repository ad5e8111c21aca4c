use clap::Parser;
use server::network::PartyServer;
use shared::DEFAULT_MAX_PARTIES;
use std::time::Duration;

/// Parses command-line arguments, then runs the authoritative party server.
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
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "10")]
        tick_rate: u32,
        /// Maximum number of concurrent parties
        #[clap(short, long, default_value_t = DEFAULT_MAX_PARTIES)]
        max_parties: usize,
    }

    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    let mut server = PartyServer::new(&address, tick_duration, args.max_parties).await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
