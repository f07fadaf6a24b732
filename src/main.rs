//! CLI for PopSub TCP
//!
//! Subcommands:
//! - `server`: run the broker
//! - `pub`: publish one message and exit
//! - `sub`: subscribe and copy payloads to stdout until the broker closes the connection

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use popsub_tcp::broker::Broker;
use popsub_tcp::client::Client;
use popsub_tcp::config::load_config;
use popsub_tcp::transport::Server;
use tracing::{error, info};

const DEFAULT_CLIENT_ADDR: &str = "localhost:8080";

#[derive(Parser)]
#[command(name = "popsub-tcp", version, about = "In-memory pub/sub broker over TCP")]
enum Command {
    /// Start the broker
    Server {
        /// Address to listen on; overrides server.host and server.port from config
        #[arg(long, env = "PUBSUB_ADDR")]
        addr: Option<String>,
    },
    /// Publish a message to a topic
    Pub {
        #[arg(long, env = "PUBSUB_ADDR", default_value = DEFAULT_CLIENT_ADDR)]
        addr: String,
        topic: String,
        /// Message body; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        data: Vec<String>,
    },
    /// Subscribe to one or more topics and copy payloads to stdout as they
    /// arrive. The output is unframed: payloads are not separated.
    Sub {
        #[arg(long, env = "PUBSUB_ADDR", default_value = DEFAULT_CLIENT_ADDR)]
        addr: String,
        #[arg(required = true, num_args = 1..)]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server { addr } => run_server(addr).await,
        Command::Pub { addr, topic, data } => {
            run_publish(&addr, &topic, data.join(" ")).await
        }
        Command::Sub { addr, topics } => run_subscribe(&addr, &topics).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // no-op when a subcommand already installed a subscriber
            popsub_tcp::utils::logging::init("info");
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(addr: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    popsub_tcp::utils::logging::init(&config.log.level);

    let addr = addr.unwrap_or_else(|| config.server.addr());
    let broker = Arc::new(Broker::new(config.broker.clone()));
    let server = Server::bind(&addr, broker).await?;

    tokio::select! {
        _ = server.run() => {
            error!("Server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_publish(
    addr: &str,
    topic: &str,
    data: String,
) -> Result<(), Box<dyn std::error::Error>> {
    popsub_tcp::utils::logging::init("warn");
    Client::connect(addr).await?.publish(topic, data).await?;
    Ok(())
}

async fn run_subscribe(addr: &str, topics: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    popsub_tcp::utils::logging::init("warn");
    let mut subscriber = Client::connect(addr).await?.subscribe(topics).await?;
    eprintln!("subscribed to {}", topics.join(", "));

    subscriber.forward(&mut tokio::io::stdout()).await?;
    Ok(())
}
