//! JSON control socket: length-prefixed `Command`s in, `Broadcast`s out.

use std::sync::Arc;

use cue_proto::protocol::{Broadcast, Command, FrameBuffer, Message, PROTOCOL_VERSION};
use cue_proto::state::StateManager;
use cue_proto::ProtoError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::core::BridgeEvent;
use crate::BroadcastMessage;

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<BridgeEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind control socket {}: {}", addr, e);
                return;
            }
        };
        info!("Control socket listening at {}", addr);

        for id in 1usize.. {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("control accept failed: {}", e);
                    continue;
                }
            };
            info!("control client {} connected from {}", id, peer);

            let (reader, writer) = stream.into_split();
            let session = ControlSession {
                id,
                writer,
                frames: FrameBuffer::default(),
                state_manager: Arc::clone(&state_manager),
                event_tx: event_tx.clone(),
            };
            tokio::spawn(session.run(reader, broadcast_tx.subscribe()));
        }
    })
}

enum Flow {
    Continue,
    Close,
}

/// One connected control client.
struct ControlSession {
    id: usize,
    writer: OwnedWriteHalf,
    frames: FrameBuffer,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<BridgeEvent>,
}

impl ControlSession {
    async fn run(
        mut self,
        mut reader: OwnedReadHalf,
        mut updates: broadcast::Receiver<BroadcastMessage>,
    ) {
        let state = self.state_manager.get_state().await;
        let hello = Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            bridge_rev: state.rev,
            state,
        };
        if self.send(hello).await.is_err() {
            return;
        }

        let mut chunk = [0u8; 4096];
        loop {
            let flow = tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => Flow::Close,
                    Ok(n) => {
                        self.frames.extend(&chunk[..n]);
                        self.take_commands().await
                    }
                    Err(e) => {
                        debug!("control client {}: read error: {}", self.id, e);
                        Flow::Close
                    }
                },
                update = updates.recv() => self.relay(update).await,
            };
            if matches!(flow, Flow::Close) {
                break;
            }
        }
        info!("control client {} disconnected", self.id);
    }

    /// Handle every complete frame buffered so far.
    async fn take_commands(&mut self) -> Flow {
        while let Some(frame) = self.frames.next_message() {
            match frame {
                Ok(Message::Command(Command::GetState)) => {
                    let data = self.state_manager.get_state().await;
                    if self.send(Broadcast::State { data }).await.is_err() {
                        return Flow::Close;
                    }
                }
                Ok(Message::Command(cmd)) => {
                    info!("control client {}: {:?}", self.id, cmd);
                    if self.event_tx.send(BridgeEvent::Control(cmd)).await.is_err() {
                        return Flow::Close;
                    }
                }
                Ok(Message::Broadcast(_)) => {
                    debug!("control client {}: ignoring broadcast", self.id);
                }
                Err(e @ ProtoError::InvalidFrame { .. }) => {
                    debug!("control client {}: {}", self.id, e);
                    let message = e.to_string();
                    if self.send(Broadcast::Error { message }).await.is_err() {
                        return Flow::Close;
                    }
                }
                Err(e) => {
                    debug!("control client {}: {}, closing", self.id, e);
                    let _ = self.send(Broadcast::Error { message: e.to_string() }).await;
                    return Flow::Close;
                }
            }
        }
        Flow::Continue
    }

    async fn relay(&mut self, update: Result<BroadcastMessage, RecvError>) -> Flow {
        let broadcast = match update {
            Ok(BroadcastMessage::StateUpdated) => Broadcast::State {
                data: self.state_manager.get_state().await,
            },
            // Missed updates are covered by a fresh snapshot
            Err(RecvError::Lagged(_)) => Broadcast::State {
                data: self.state_manager.get_state().await,
            },
            Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
            Ok(BroadcastMessage::Error(message)) => Broadcast::Error { message },
            Err(RecvError::Closed) => return Flow::Close,
        };
        match self.send(broadcast).await {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Close,
        }
    }

    async fn send(&mut self, broadcast: Broadcast) -> anyhow::Result<()> {
        let frame = Message::Broadcast(broadcast).encode()?;
        self.writer.write_all(&frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cue_proto::SourceRole;
    use tokio::net::TcpStream;

    async fn read_broadcast(stream: &mut TcpStream, frames: &mut FrameBuffer) -> Broadcast {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = frames.next_message() {
                match frame.unwrap() {
                    Message::Broadcast(b) => return b,
                    other => panic!("unexpected {:?}", other),
                }
            }
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "socket closed");
            frames.extend(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn bad_frame_does_not_block_later_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (broadcast_tx, _) = broadcast::channel(8);
        let state_manager = Arc::new(StateManager::new(SourceRole::Main, Vec::new()));

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        let (reader, writer) = server_side.into_split();
        let session = ControlSession {
            id: 1,
            writer,
            frames: FrameBuffer::default(),
            state_manager,
            event_tx,
        };
        tokio::spawn(session.run(reader, broadcast_tx.subscribe()));

        let mut frames = FrameBuffer::default();
        assert!(matches!(
            read_broadcast(&mut client, &mut frames).await,
            Broadcast::Hello { .. }
        ));

        let mut bytes = 5u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"{nope");
        bytes.extend(Message::Command(Command::Refresh).encode().unwrap());
        client.write_all(&bytes).await.unwrap();

        assert!(matches!(
            read_broadcast(&mut client, &mut frames).await,
            Broadcast::Error { .. }
        ));
        assert!(matches!(
            event_rx.recv().await,
            Some(BridgeEvent::Control(Command::Refresh))
        ));
    }
}
