/// BridgeCore: single-owner event loop for all mutable state.
///
/// Link readers, the control listener, the control socket and every timer
/// only send `BridgeEvent`s here. BridgeCore owns the `Bridge` state machine,
/// the engine senders and the scheduler; it executes the effects each event
/// produces, then publishes the resulting snapshot to control clients.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cue_core::{Bridge, Effect};
use cue_proto::config::{Config, LinkTransport};
use cue_proto::protocol::{Command, LinkHealth};
use cue_proto::state::StateManager;
use cue_proto::SourceRole;
use rosc::OscMessage;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::display::DisplayOut;
use crate::link::{self, EngineSender, Router};
use crate::scheduler::{Scheduler, TimerKind};
use crate::BroadcastMessage;

/// Cap on the reconnect backoff multiplier (reconnect_secs * 2^n).
const MAX_BACKOFF_SHIFT: u32 = 3;

// ── BridgeEvent ───────────────────────────────────────────────────────────────

/// All inputs into the BridgeCore loop.
#[derive(Debug)]
pub enum BridgeEvent {
    /// OSC message from a configured engine.
    Inbound { role: SourceRole, message: OscMessage },
    /// OSC message on the engine socket from an unknown host.
    Stray(OscMessage),
    /// Control surface or control socket command.
    Control(Command),
    PollTick(SourceRole),
    HeartbeatTick(SourceRole),
    SettleElapsed(SourceRole),
    /// TCP link established.
    LinkUp { role: SourceRole, sender: EngineSender },
    /// TCP link failed or closed.
    LinkClosed(SourceRole),
    Reconnect(SourceRole),
    Shutdown,
}

// ── BridgeCore ────────────────────────────────────────────────────────────────

pub struct BridgeCore {
    config: Config,
    bridge: Bridge,
    scheduler: Scheduler,
    senders: HashMap<SourceRole, EngineSender>,
    display: DisplayOut,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<BridgeEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Consecutive failed TCP connects per engine.
    reconnect_attempts: HashMap<SourceRole, u32>,
}

impl BridgeCore {
    pub async fn new(
        config: Config,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> anyhow::Result<Self> {
        let bridge = Bridge::from_config(&config);
        let display = DisplayOut::bind(config.display.clone()).await?;
        let state_manager = Arc::new(StateManager::new(bridge.selected(), bridge.statuses()));

        Ok(Self {
            config,
            bridge,
            scheduler: Scheduler::new(event_tx.clone()),
            senders: HashMap::new(),
            display,
            state_manager,
            event_tx,
            broadcast_tx,
            reconnect_attempts: HashMap::new(),
        })
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    /// Run the core event loop. Returns on `Shutdown` or when every sender
    /// is gone, after unsubscribing from the engines.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<BridgeEvent>) -> anyhow::Result<()> {
        info!("BridgeCore: starting event loop");
        self.open_links().await?;

        loop {
            let evt = event_rx.recv().await;
            match evt {
                None => {
                    info!("BridgeCore: event channel closed, shutting down");
                    break;
                }
                Some(BridgeEvent::Shutdown) => {
                    info!("BridgeCore: shutdown requested");
                    break;
                }
                Some(evt) => self.handle_event(evt).await,
            }
            self.publish().await;
        }

        self.cleanup().await;
        Ok(())
    }

    async fn open_links(&mut self) -> anyhow::Result<()> {
        let engines = self.config.bound_engines();

        match self.config.bridge.transport {
            LinkTransport::Udp => {
                let bind = format!(
                    "{}:{}",
                    self.config.bridge.listen_address, self.config.bridge.listen_port
                );
                let socket = Arc::new(UdpSocket::bind(&bind).await?);
                info!("Engine OSC socket bound at {}", bind);

                let mut router = Router::default();
                for (role, engine) in &engines {
                    let target = link::resolve(&engine.endpoint()).await?;
                    router.add(*role, &engine.workspace_id, target);
                    self.senders.insert(
                        *role,
                        EngineSender::Udp {
                            socket: Arc::clone(&socket),
                            target,
                        },
                    );
                    self.set_link_health(*role, LinkHealth::Connecting).await;
                    info!("{}: {} at {}", role, engine.name, target);
                }
                tokio::spawn(link::udp_reader(socket, router, self.event_tx.clone()));

                let effects = self.bridge.start();
                self.execute(effects).await;
            }
            LinkTransport::Tcp => {
                for (role, engine) in &engines {
                    self.set_link_health(*role, LinkHealth::Connecting).await;
                    link::connect_tcp(*role, engine.endpoint(), self.event_tx.clone());
                }
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, evt: BridgeEvent) {
        match evt {
            BridgeEvent::Inbound { role, message } => {
                debug!("{} <- {} {:?}", role, message.addr, message.args);
                if self.config.bridge.transport == LinkTransport::Udp {
                    // First datagram proves the engine is reachable
                    self.set_link_health(role, LinkHealth::Up).await;
                }
                let effects = self.bridge.handle_message(role, &message);
                self.execute(effects).await;
            }

            BridgeEvent::Stray(message) => {
                debug!("stray {} {:?}", message.addr, message.args);
                let effects = self.bridge.forward(&message);
                self.execute(effects).await;
            }

            BridgeEvent::Control(cmd) => {
                info!("BridgeCore: command {:?}", cmd);
                match self.bridge.handle_command(cmd) {
                    Ok(effects) => self.execute(effects).await,
                    Err(e) => {
                        warn!("BridgeCore: command rejected: {}", e);
                        let _ = self.broadcast_tx.send(BroadcastMessage::Error(e.to_string()));
                    }
                }
            }

            BridgeEvent::PollTick(role) => {
                let effects = self.bridge.poll_tick(role);
                self.execute(effects).await;
            }

            BridgeEvent::HeartbeatTick(role) => {
                let effects = self.bridge.heartbeat_tick(role);
                self.execute(effects).await;
            }

            BridgeEvent::SettleElapsed(role) => {
                let effects = self.bridge.settle_elapsed(role);
                self.execute(effects).await;
            }

            BridgeEvent::LinkUp { role, sender } => {
                self.senders.insert(role, sender);
                self.reconnect_attempts.remove(&role);
                self.set_link_health(role, LinkHealth::Up).await;
                let effects = self.bridge.start_engine(role);
                self.execute(effects).await;
            }

            BridgeEvent::LinkClosed(role) => {
                self.senders.remove(&role);
                self.set_link_health(role, LinkHealth::Down).await;

                let attempts = self.reconnect_attempts.entry(role).or_insert(0);
                let delay = backoff(self.config.bridge.reconnect_delay(), *attempts);
                *attempts += 1;
                info!("{}: reconnecting in {:?}", role, delay);
                self.scheduler
                    .after(role, TimerKind::Reconnect, delay, BridgeEvent::Reconnect(role));
            }

            BridgeEvent::Reconnect(role) => {
                let endpoint = self
                    .config
                    .bound_engines()
                    .into_iter()
                    .find(|(r, _)| *r == role)
                    .map(|(_, engine)| engine.endpoint());
                if let Some(endpoint) = endpoint {
                    self.set_link_health(role, LinkHealth::Connecting).await;
                    link::connect_tcp(role, endpoint, self.event_tx.clone());
                }
            }

            // Handled by the run loop
            BridgeEvent::Shutdown => {}
        }
    }

    async fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { role, message } => match self.senders.get(&role) {
                    Some(sender) => {
                        debug!("{} -> {} {:?}", role, message.addr, message.args);
                        if let Err(e) = sender.send(&message).await {
                            warn!("{}: {}", role, e);
                        }
                    }
                    None => debug!("{}: no link, dropping {}", role, message.addr),
                },
                Effect::Display(update) => self.display.show(&update).await,
                Effect::Forward(message) => self.display.forward(&message).await,
                Effect::StartLivenessPoll { role } => {
                    let period = self.config.bridge.liveness_poll_interval();
                    self.scheduler
                        .every(role, TimerKind::LivenessPoll, period, move || {
                            BridgeEvent::PollTick(role)
                        });
                }
                Effect::CancelLivenessPoll { role } => {
                    self.scheduler.cancel(role, TimerKind::LivenessPoll);
                }
                Effect::StartHeartbeat { role } => {
                    let period = self.config.bridge.heartbeat_interval();
                    self.scheduler
                        .every(role, TimerKind::Heartbeat, period, move || {
                            BridgeEvent::HeartbeatTick(role)
                        });
                }
                Effect::ScheduleSettle { role } => {
                    let delay = self.config.bridge.settle_delay();
                    self.scheduler.after(
                        role,
                        TimerKind::Settle,
                        delay,
                        BridgeEvent::SettleElapsed(role),
                    );
                }
            }
        }
    }

    async fn set_link_health(&self, role: SourceRole, health: LinkHealth) {
        let label = health.badge_label().unwrap_or("OK");
        if self.state_manager.set_link_health(role, health).await {
            debug!("{}: link {}", role, label);
            let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
        }
    }

    async fn publish(&self) {
        if self
            .state_manager
            .publish(self.bridge.selected(), self.bridge.statuses())
            .await
        {
            let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
        }
    }

    async fn cleanup(&mut self) {
        self.scheduler.cancel_all();
        let effects = self.bridge.shutdown();
        self.execute(effects).await;
        info!("BridgeCore: unsubscribed from engines");
    }
}

fn backoff(base: Duration, attempts: u32) -> Duration {
    base * 2u32.pow(attempts.min(MAX_BACKOFF_SHIFT))
}
