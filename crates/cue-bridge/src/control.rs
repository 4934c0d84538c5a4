use cue_proto::protocol::Command;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::BridgeEvent;
use crate::link::decode_packet;

/// Listen for control-surface OSC (refresh, changeover, transport buttons).
pub fn start_listener(
    bind_address: String,
    port: u16,
    event_tx: mpsc::Sender<BridgeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let socket = match UdpSocket::bind(&addr).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to bind control OSC socket {}: {}", addr, e);
                return;
            }
        };
        info!("Control OSC listening at {}", addr);

        let mut buf = vec![0u8; rosc::decoder::MTU];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("control receive error: {}", e);
                    continue;
                }
            };
            let messages = match decode_packet(&buf[..len]) {
                Ok(messages) => messages,
                Err(e) => {
                    debug!("control: dropping datagram from {}: {}", from, e);
                    continue;
                }
            };
            for message in messages {
                match Command::from_osc(&message.addr, &message.args) {
                    Some(cmd) => {
                        info!("control {} from {}", message.addr, from);
                        if event_tx.send(BridgeEvent::Control(cmd)).await.is_err() {
                            return;
                        }
                    }
                    None => debug!("control: ignoring {} {:?}", message.addr, message.args),
                }
            }
        }
    })
}
