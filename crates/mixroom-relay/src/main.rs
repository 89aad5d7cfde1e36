//! mixroom-relay: WebSocket relay that lets participants in a shared room
//! see each other's volume level and mute state in real time.

use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "mixroom-relay", about = "Room status relay for mixroom clients")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 10000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixroom_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("mixroom-relay listening on {}", addr);

    mixroom_relay::run(listener).await;
}
