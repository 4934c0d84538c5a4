use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::platform;
use crate::role::SourceRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// One entry for a single engine, two for a MAIN/BACKUP pair.
    #[serde(default = "default_engines", rename = "engine")]
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

/// How the bridge talks to the engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkTransport {
    /// Connectionless; needs the periodic thump to keep the session alive.
    #[default]
    Udp,
    /// One SLIP-framed stream per engine; the connection is its own keep-alive.
    Tcp,
}

impl LinkTransport {
    pub fn needs_heartbeat(&self) -> bool {
        matches!(self, LinkTransport::Udp)
    }
}

/// Which engines receive next/previous/go/panic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportTarget {
    /// Every configured engine, keeping redundant machines in lockstep.
    #[default]
    All,
    /// Only the engine currently feeding the display.
    Selected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transport: LinkTransport,
    /// Local address the UDP reply socket binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_liveness_poll_ms")]
    pub liveness_poll_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    #[serde(default)]
    pub transport_target: TransportTarget,
    /// Relay engine messages the bridge does not interpret to the displays.
    #[serde(default = "default_true")]
    pub forward_unrecognized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_engine_name")]
    pub name: String,
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    pub workspace_id: String,
    /// Cue list whose playhead is shown.
    pub cue_list_id: String,
    /// Cue list whose running cues are shown; defaults to `cue_list_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing_list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}

impl EngineConfig {
    pub fn playing_list(&self) -> &str {
        self.playing_list_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.cue_list_id)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// OSC display consumers and the addresses the bridge writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// `host:port` of every display consumer.
    #[serde(default = "default_consumers")]
    pub consumers: Vec<String>,
    #[serde(default = "default_name_address")]
    pub name_address: String,
    #[serde(default = "default_number_address")]
    pub number_address: String,
    #[serde(default = "default_active_name_address")]
    pub active_name_address: String,
    #[serde(default = "default_active_number_address")]
    pub active_number_address: String,
    #[serde(default = "default_notify_address")]
    pub notify_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_control_bind")]
    pub bind_address: String,
    /// OSC/UDP port for panel buttons.
    #[serde(default = "default_control_osc_port")]
    pub osc_port: u16,
    /// TCP port for the JSON control socket.
    #[serde(default = "default_control_socket_port")]
    pub socket_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: LinkTransport::default(),
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            heartbeat_secs: default_heartbeat_secs(),
            liveness_poll_ms: default_liveness_poll_ms(),
            settle_ms: default_settle_ms(),
            reconnect_secs: default_reconnect_secs(),
            transport_target: TransportTarget::default(),
            forward_unrecognized: true,
        }
    }
}

impl BridgeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn liveness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms.max(50))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs.max(1))
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            consumers: default_consumers(),
            name_address: default_name_address(),
            number_address: default_number_address(),
            active_name_address: default_active_name_address(),
            active_number_address: default_active_number_address(),
            notify_address: default_notify_address(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_control_bind(),
            osc_port: default_control_osc_port(),
            socket_port: default_control_socket_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    platform::REPLY_OSC_PORT
}

fn default_heartbeat_secs() -> u64 {
    20
}

fn default_liveness_poll_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    75
}

fn default_reconnect_secs() -> u64 {
    5
}

fn default_engine_name() -> String {
    "QLab".to_string()
}

fn default_engine_port() -> u16 {
    platform::ENGINE_OSC_PORT
}

fn default_engines() -> Vec<EngineConfig> {
    vec![EngineConfig {
        name: default_engine_name(),
        host: "127.0.0.1".to_string(),
        port: default_engine_port(),
        workspace_id: String::new(),
        cue_list_id: String::new(),
        playing_list_id: None,
        passcode: None,
    }]
}

fn default_consumers() -> Vec<String> {
    vec!["127.0.0.1:7000".to_string()]
}

fn default_name_address() -> String {
    "/next/name".to_string()
}

fn default_number_address() -> String {
    "/next/number".to_string()
}

fn default_active_name_address() -> String {
    "/running/name".to_string()
}

fn default_active_number_address() -> String {
    "/running/number".to_string()
}

fn default_notify_address() -> String {
    "/NOTIFY".to_string()
}

fn default_control_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_control_osc_port() -> u16 {
    platform::CONTROL_OSC_PORT
}

fn default_control_socket_port() -> u16 {
    platform::CONTROL_SOCKET_PORT
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing a default file there first if none exists.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            info!("wrote default config to {:?}", path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.engines.len() {
            1 | 2 => {}
            0 => anyhow::bail!("no [[engine]] configured"),
            n => anyhow::bail!("{} engines configured, at most 2 (MAIN and BACKUP) are supported", n),
        }
        for engine in &self.engines {
            if engine.host.trim().is_empty() {
                anyhow::bail!("engine '{}' has no host", engine.name);
            }
            if engine.workspace_id.trim().is_empty() {
                anyhow::bail!("engine '{}' has no workspace_id", engine.name);
            }
            if engine.cue_list_id.trim().is_empty() {
                anyhow::bail!("engine '{}' has no cue_list_id", engine.name);
            }
        }
        if let [main, backup] = self.engines.as_slice() {
            if main.host.trim() == backup.host.trim() && main.port == backup.port {
                anyhow::bail!(
                    "engines '{}' and '{}' share the endpoint {}; replies could not be told apart",
                    main.name,
                    backup.name,
                    main.endpoint()
                );
            }
        }
        for consumer in &self.display.consumers {
            if consumer.parse::<std::net::SocketAddr>().is_err() {
                anyhow::bail!("display consumer '{}' is not a host:port address", consumer);
            }
        }
        Ok(())
    }

    /// Engines paired with the role each one is bound to.
    pub fn bound_engines(&self) -> Vec<(SourceRole, EngineConfig)> {
        match self.engines.as_slice() {
            [only] => vec![(SourceRole::Only, only.clone())],
            [main, backup, ..] => vec![
                (SourceRole::Main, main.clone()),
                (SourceRole::Backup, backup.clone()),
            ],
            [] => Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            engines: default_engines(),
            display: DisplayConfig::default(),
            control: ControlConfig::default(),
        }
    }
}
