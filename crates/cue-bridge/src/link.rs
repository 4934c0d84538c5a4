/// Engine links: OSC over a shared UDP socket, or one SLIP-framed TCP
/// connection per engine.
///
/// Architecture:
///
/// ```text
///   UDP  udp_reader ── recv_from ── Router::route ──> BridgeEvent::Inbound
///        EngineSender::Udp ── send_to(engine)
///
///   TCP  connect_tcp(role)
///          ├── writer task  ← Vec<u8> via mpsc, SLIP-framed → socket
///          └── reader task  ← SlipDecoder → BridgeEvent::Inbound
///                             on EOF/error → BridgeEvent::LinkClosed
/// ```
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use cue_proto::SourceRole;
use rosc::{OscMessage, OscPacket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::BridgeEvent;

// ── OSC codec ────────────────────────────────────────────────────────────────

const SLIP_END: u8 = 0xC0;
const SLIP_ESC: u8 = 0xDB;
const SLIP_ESC_END: u8 = 0xDC;
const SLIP_ESC_ESC: u8 = 0xDD;

pub fn encode_message(message: &OscMessage) -> anyhow::Result<Vec<u8>> {
    rosc::encoder::encode(&OscPacket::Message(message.clone()))
        .map_err(|e| anyhow::anyhow!("OSC encode {}: {:?}", message.addr, e))
}

/// Decode one datagram (or SLIP frame), flattening bundles into messages.
pub fn decode_packet(data: &[u8]) -> anyhow::Result<Vec<OscMessage>> {
    let (_, packet) =
        rosc::decoder::decode_udp(data).map_err(|e| anyhow::anyhow!("OSC decode: {:?}", e))?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

/// Double-END SLIP framing (OSC 1.1 over streams).
pub fn slip_encode(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.push(SLIP_END);
    for &byte in payload {
        match byte {
            SLIP_END => framed.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
            SLIP_ESC => framed.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
            b => framed.push(b),
        }
    }
    framed.push(SLIP_END);
    framed
}

/// Incremental SLIP decoder for a byte stream.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    frame: Vec<u8>,
    escaped: bool,
}

impl SlipDecoder {
    /// Feed bytes, returning every frame they complete. Empty frames (the
    /// back-to-back END bytes of double-END framing) are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.escaped {
                self.escaped = false;
                match byte {
                    SLIP_ESC_END => self.frame.push(SLIP_END),
                    SLIP_ESC_ESC => self.frame.push(SLIP_ESC),
                    // Protocol violation; keep the byte
                    other => self.frame.push(other),
                }
                continue;
            }
            match byte {
                SLIP_END => {
                    if !self.frame.is_empty() {
                        frames.push(std::mem::take(&mut self.frame));
                    }
                }
                SLIP_ESC => self.escaped = true,
                b => self.frame.push(b),
            }
        }
        frames
    }
}

// ── outbound ─────────────────────────────────────────────────────────────────

/// Cloneable send side of one engine link.
#[derive(Clone, Debug)]
pub enum EngineSender {
    Udp {
        socket: Arc<UdpSocket>,
        target: SocketAddr,
    },
    Tcp(mpsc::Sender<Vec<u8>>),
}

impl EngineSender {
    pub async fn send(&self, message: &OscMessage) -> anyhow::Result<()> {
        let payload = encode_message(message)?;
        match self {
            EngineSender::Udp { socket, target } => {
                socket
                    .send_to(&payload, target)
                    .await
                    .with_context(|| format!("send {} to {}", message.addr, target))?;
            }
            EngineSender::Tcp(tx) => {
                tx.send(slip_encode(&payload))
                    .await
                    .map_err(|_| anyhow::anyhow!("TCP writer task gone"))?;
            }
        }
        Ok(())
    }
}

pub async fn resolve(endpoint: &str) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host(endpoint)
        .await
        .with_context(|| format!("resolve {}", endpoint))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address for {}", endpoint))
}

// ── UDP routing ──────────────────────────────────────────────────────────────

/// Decides which engine a datagram on the shared socket came from.
///
/// The source address decides: exact match first, then IP alone. A redundant
/// pair usually runs the same show file, so the workspace id in the address
/// only separates engines that share an IP.
#[derive(Debug, Default)]
pub struct Router {
    engines: Vec<Route>,
}

#[derive(Debug)]
struct Route {
    role: SourceRole,
    workspace: String,
    endpoint: SocketAddr,
}

impl Router {
    pub fn add(&mut self, role: SourceRole, workspace: &str, endpoint: SocketAddr) {
        self.engines.push(Route {
            role,
            workspace: workspace.to_string(),
            endpoint,
        });
    }

    pub fn route(&self, from: SocketAddr, address: &str) -> Option<SourceRole> {
        if let Some(route) = self.engines.iter().find(|r| r.endpoint == from) {
            return Some(route.role);
        }

        let same_host: Vec<&Route> = self
            .engines
            .iter()
            .filter(|r| r.endpoint.ip() == from.ip())
            .collect();
        match same_host.as_slice() {
            [] => None,
            [only] => Some(only.role),
            shared => {
                let workspace = workspace_in(address)?;
                let mut matching = shared.iter().filter(|r| r.workspace == workspace);
                match (matching.next(), matching.next()) {
                    (Some(route), None) => Some(route.role),
                    _ => None,
                }
            }
        }
    }
}

fn workspace_in(address: &str) -> Option<&str> {
    let mut segments = address.split('/');
    segments.find(|s| *s == "workspace")?;
    segments.next().filter(|ws| !ws.is_empty())
}

/// Read the shared UDP socket forever, routing each message to its engine.
/// Messages from unknown hosts are passed on as `Stray` for forwarding.
pub async fn udp_reader(
    socket: Arc<UdpSocket>,
    router: Router,
    event_tx: mpsc::Sender<BridgeEvent>,
) {
    let mut buf = vec![0u8; rosc::decoder::MTU];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP receive error: {}", e);
                continue;
            }
        };

        let messages = match decode_packet(&buf[..len]) {
            Ok(messages) => messages,
            Err(e) => {
                debug!("dropping datagram from {}: {}", from, e);
                continue;
            }
        };

        for message in messages {
            let event = match router.route(from, &message.addr) {
                Some(role) => BridgeEvent::Inbound { role, message },
                None => BridgeEvent::Stray(message),
            };
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

// ── TCP ──────────────────────────────────────────────────────────────────────

/// Connect to one engine over TCP and spawn its reader and writer tasks.
///
/// Reports `LinkUp` with a sender on success and `LinkClosed` once the
/// connection fails or ends; the core decides when to try again.
pub fn connect_tcp(role: SourceRole, endpoint: String, event_tx: mpsc::Sender<BridgeEvent>) {
    tokio::spawn(async move {
        let stream = match TcpStream::connect(&endpoint).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{}: connect {} failed: {}", role, endpoint, e);
                let _ = event_tx.send(BridgeEvent::LinkClosed(role)).await;
                return;
            }
        };
        info!("{}: connected to {}", role, endpoint);
        let _ = stream.set_nodelay(true);

        let (mut read_half, mut write_half) = stream.into_split();
        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(64);

        let writer = tokio::spawn(async move {
            while let Some(frame) = write_rx.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    warn!("{}: write failed: {}", role, e);
                    break;
                }
            }
        });

        if event_tx
            .send(BridgeEvent::LinkUp {
                role,
                sender: EngineSender::Tcp(write_tx),
            })
            .await
            .is_err()
        {
            writer.abort();
            return;
        }

        let mut decoder = SlipDecoder::default();
        let mut tmp = [0u8; 4096];
        loop {
            let n = match read_half.read(&mut tmp).await {
                Ok(0) => {
                    info!("{}: connection closed by engine", role);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("{}: read error: {}", role, e);
                    break;
                }
            };

            for frame in decoder.push(&tmp[..n]) {
                let messages = match decode_packet(&frame) {
                    Ok(messages) => messages,
                    Err(e) => {
                        debug!("{}: {}", role, e);
                        continue;
                    }
                };
                for message in messages {
                    if event_tx
                        .send(BridgeEvent::Inbound { role, message })
                        .await
                        .is_err()
                    {
                        writer.abort();
                        return;
                    }
                }
            }
        }

        writer.abort();
        let _ = event_tx.send(BridgeEvent::LinkClosed(role)).await;
    });
}
