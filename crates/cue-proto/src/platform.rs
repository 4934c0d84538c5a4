use std::path::PathBuf;

/// Port QLab listens on for OSC, both UDP and TCP.
pub const ENGINE_OSC_PORT: u16 = 53000;

/// Port QLab sends UDP replies and updates back to.
pub const REPLY_OSC_PORT: u16 = 53001;

/// Default OSC/UDP port for the control surface (refresh, changeover, transport).
pub const CONTROL_OSC_PORT: u16 = 53002;

/// Default TCP port for the JSON control socket.
pub const CONTROL_SOCKET_PORT: u16 = 53010;

const APP_DIR: &str = "cue-bridge";

pub fn data_dir() -> PathBuf {
    // ~/.local/share/cue-bridge on macOS and Linux alike
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let portable_data = exe_dir.join("data");
                if portable_data.exists() {
                    return portable_data;
                }
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    // A config.toml beside the executable wins on Windows (portable installs)
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn log_path() -> PathBuf {
    data_dir().join("bridge.log")
}
