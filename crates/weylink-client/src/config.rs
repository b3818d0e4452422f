//! Client configuration loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use weylink_protocol::ClientConfig;
use weylink_types::CaptureConfig;

use crate::error::SessionError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the Weylus server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait for a command's reply.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// The websocket URL of the server.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("ws://[{}]:{}", self.host, self.port)
        } else {
            format!("ws://{}:{}", self.host, self.port)
        }
    }
}

/// Frame rate and snapshot location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Capture settings sent to the server after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_true")]
    pub uinput_support: bool,
    #[serde(default = "default_true")]
    pub capture_cursor: bool,
    #[serde(default)]
    pub capturable_id: u32,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            uinput_support: true,
            capture_cursor: true,
            capturable_id: 0,
            max_width: default_max_width(),
            max_height: default_max_height(),
            client_name: default_client_name(),
        }
    }
}

impl CaptureSettings {
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            uinput_support: self.uinput_support,
            capture_cursor: self.capture_cursor,
            capturable_id: self.capturable_id,
            max_width: self.max_width,
            max_height: self.max_height,
            client_name: self.client_name.clone(),
        }
    }
}

/// The external process that turns the server's video stream into BMP
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell command; `{snapshot}` is replaced by the quoted snapshot path.
    /// The video stream arrives on stdin.
    #[serde(default = "default_encoder_command")]
    pub command: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_encoder_command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location. A missing file at
    /// the default location yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SessionError> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };

        if !explicit && !config_path.exists() {
            info!("no config file found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            SessionError::Config(format!(
                "failed to read {}: {e}",
                config_path.display()
            ))
        })?;
        let config = Self::from_toml(&content)?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, SessionError> {
        toml::from_str(content)
            .map_err(|e| SessionError::Config(format!("failed to parse config: {e}")))
    }

    /// Protocol client settings derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            command_timeout: Duration::from_secs(self.server.command_timeout_secs),
            fps: self.video.fps,
            ..ClientConfig::default()
        }
    }
}

/// `<config dir>/weylink/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weylink")
        .join("config.toml")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9001
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_fps() -> u32 {
    30
}

fn default_snapshot_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("weylink")
        .join("screen.bmp")
}

fn default_true() -> bool {
    true
}

fn default_max_width() -> u32 {
    2560
}

fn default_max_height() -> u32 {
    1440
}

fn default_client_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "weylink".to_string())
}

// `-pix_fmt rgba` makes ffmpeg's BMP encoder emit BGRA rows. Atomic writing
// renames each finished frame over the snapshot.
fn default_encoder_command() -> String {
    "ffmpeg -y -hide_banner -loglevel error -f mp4 -re -i - \
     -c:v bmp -pix_fmt rgba -update 1 -atomic_writing 1 {snapshot}"
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 9001"));
        assert!(toml_str.contains("fps = 30"));
        assert_eq!(Config::from_toml(&toml_str).unwrap(), config);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.capture.max_width, 2560);
        assert!(config.encoder.enabled);
        assert!(config.encoder.command.contains("{snapshot}"));
        assert!(config
            .video
            .snapshot_path
            .ends_with(Path::new("weylink/screen.bmp")));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[server]
host = "tablet.local"
port = 1701

[video]
fps = 60
snapshot_path = "/tmp/weylink-test/screen.bmp"

[capture]
capturable_id = 2
capture_cursor = false
client_name = "studio"

[encoder]
enabled = false

[logging]
level = "debug"
"#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.server.url(), "ws://tablet.local:1701");
        assert_eq!(config.video.fps, 60);
        assert_eq!(
            config.video.snapshot_path,
            PathBuf::from("/tmp/weylink-test/screen.bmp")
        );
        assert_eq!(config.capture.capturable_id, 2);
        assert!(!config.capture.capture_cursor);
        assert!(config.capture.uinput_support);
        assert!(!config.encoder.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = Config::from_toml("[server]\nport = \"not a number\"").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let server = ServerConfig {
            host: "::1".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(server.url(), "ws://[::1]:9001");
    }

    #[test]
    fn capture_settings_map_to_wire_config() {
        let settings = CaptureSettings {
            capturable_id: 4,
            client_name: "desk".to_string(),
            ..CaptureSettings::default()
        };
        let wire = settings.to_capture_config();
        assert_eq!(wire.capturable_id, 4);
        assert_eq!(wire.client_name, "desk");
        assert!(wire.uinput_support);
        assert_eq!((wire.max_width, wire.max_height), (2560, 1440));
    }

    #[test]
    fn client_config_carries_timeout_and_fps() {
        let mut config = Config::default();
        config.server.command_timeout_secs = 3;
        config.video.fps = 24;
        let client = config.client_config();
        assert_eq!(client.command_timeout, Duration::from_secs(3));
        assert_eq!(client.fps, 24);
    }
}
