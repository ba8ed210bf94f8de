use clap::Parser;
use client::network::TestClient;
use log::{error, info};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted session server clients", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9999")]
    server: String,

    /// Number of clients to run
    #[arg(short = 'c', long, default_value = "3")]
    clients: usize,

    /// Player names are this prefix followed by 1, 2, ...
    #[arg(short = 'n', long, default_value = "TestPlayer")]
    name_prefix: String,

    /// Pause between connects, in milliseconds
    #[arg(short = 'd', long, default_value = "500")]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let delay = Duration::from_millis(args.delay_ms);

    info!("Starting {} test clients against {}", args.clients, args.server);

    let mut clients = Vec::with_capacity(args.clients);
    for i in 1..=args.clients {
        let name = format!("{}{}", args.name_prefix, i);
        clients.push(TestClient::new(&args.server, &name).await?);
    }

    if let Err(e) = run_scenario(&mut clients, delay).await {
        error!("Test run failed: {}", e);
        return Err(e.into());
    }

    info!("Test run complete");
    Ok(())
}

/// Connects every client, echoes PING from each, then disconnects them all
async fn run_scenario(
    clients: &mut [TestClient],
    delay: Duration,
) -> Result<(), client::network::ClientError> {
    for client in clients.iter_mut() {
        client.connect().await?;
        sleep(delay).await;
    }

    for client in clients.iter_mut() {
        client.echo("PING").await?;
        sleep(delay).await;
    }

    for client in clients.iter_mut() {
        client.disconnect("Test complete").await?;
    }

    Ok(())
}
