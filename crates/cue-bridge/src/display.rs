use std::net::SocketAddr;

use cue_core::DisplayUpdate;
use cue_proto::config::DisplayConfig;
use rosc::OscMessage;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::link::encode_message;

/// Fan-out of display updates to every configured consumer.
pub struct DisplayOut {
    socket: UdpSocket,
    consumers: Vec<SocketAddr>,
    config: DisplayConfig,
}

impl DisplayOut {
    pub async fn bind(config: DisplayConfig) -> anyhow::Result<Self> {
        let consumers = config
            .consumers
            .iter()
            .map(|c| c.parse::<SocketAddr>())
            .collect::<Result<Vec<_>, _>>()?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            consumers,
            config,
        })
    }

    pub async fn show(&self, update: &DisplayUpdate) {
        debug!("display: {:?}", update);
        for message in update.to_osc(&self.config) {
            self.send(&message).await;
        }
    }

    /// Relay a message the bridge did not interpret.
    pub async fn forward(&self, message: &OscMessage) {
        self.send(message).await;
    }

    async fn send(&self, message: &OscMessage) {
        let payload = match encode_message(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };
        for consumer in &self.consumers {
            if let Err(e) = self.socket.send_to(&payload, consumer).await {
                warn!("display send to {} failed: {}", consumer, e);
            }
        }
    }
}
