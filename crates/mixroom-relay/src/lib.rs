//! mixroom relay: tracks each connection's reported volume/mute status,
//! groups connections into rooms, and fans out a consolidated room snapshot
//! whenever any member's state changes.

pub mod connection;
pub mod error;
pub mod registry;
pub mod room;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::room::RoomBroadcaster;

/// Accept loop: one task per connection, all sharing one broadcaster.
pub async fn run(listener: TcpListener) {
    let hub = RoomBroadcaster::new();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::info!(peer = %addr, "New connection");
                let hub = hub.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, hub).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
