use std::sync::Arc;

use arcade_net::config::Config;
use arcade_net::server::Server;
use arcade_net::{ConnectionHandle, ConnectionId, Hook};
use async_trait::async_trait;
use log::info;

/// Frames every payload straight back to its sender.
struct EchoHook;

#[async_trait]
impl Hook for EchoHook {
    async fn connected(&self, conn: ConnectionHandle) {
        info!("client {} connected from {}", conn.id(), conn.peer_addr());
    }

    async fn packet(&self, conn: &ConnectionHandle, payload: &[u8]) {
        conn.send_packet(payload).ok();
    }

    async fn disconnected(&self, id: ConnectionId) {
        info!("client {} disconnected", id);
    }
}

#[tokio::main]
async fn main() {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .unwrap()
        .start()
        .unwrap();

    let cfg = Config::from_path("./standalone.toml").await;

    Server::new(cfg.server)
        .start_with_hook(Arc::new(EchoHook))
        .await
        .unwrap()
}
