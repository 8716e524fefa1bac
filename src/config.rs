use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, sync::OnceLock, time::Duration};

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Display geometry and font
    pub display: DisplayConfig,

    /// Render throttle and poll period in seconds
    pub refresh: f64,

    /// Push cadence of the display transport in seconds
    pub display_refresh: f64,

    /// Control loop period in milliseconds
    pub tick_ms: u64,

    /// Selected output transport
    pub output: OutputMode,

    /// Integer upscale factor of served images
    pub output_scale: u32,

    /// Border width in pixels around served images
    pub output_border: u32,

    /// Image server bind address
    pub web: WebConfig,

    /// ZeroMQ address of the display, `tcp://host:port` or `ipc:///path`
    pub display_server: String,

    /// Upper bound for a single display acknowledgement
    pub ack_timeout_ms: u64,

    /// Local key codes
    pub keys: KeyConfig,

    /// Remote button event source
    pub buttons_server: Option<ButtonsServerConfig>,

    /// Restrict the interface table to these names
    pub interfaces: Option<Vec<String>>,

    /// Hostname resolved to decide whether DNS works
    pub check_dns: String,

    /// Endpoint answering with the public IP
    pub wan_ip_url: String,

    /// Endpoint probed when DNS does not work
    pub wan_fallback_url: String,

    /// Setuid helper bringing up a saved connection
    pub wifi_connect_helper: PathBuf,

    /// Command line issued by the reboot action
    pub reboot_command: Vec<String>,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Web,
    Display,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum Font {
    #[serde(rename = "4x6")]
    Font4x6,
    #[serde(rename = "5x7")]
    Font5x7,
    #[default]
    #[serde(rename = "5x8")]
    Font5x8,
    #[serde(rename = "6x10")]
    Font6x10,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub size: [u32; 2],
    pub font: Font,
    /// Row spacing in pixels, the font's character height when unset
    pub line_height: Option<u32>,
    pub page_size: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub primary: u16,
    pub secondary: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ButtonsServerConfig {
    pub address: String,
    #[serde(default = "ButtonsServerConfig::default_direction")]
    pub direction: i32,
    pub button_a: i32,
    pub button_b: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            refresh: 1.0,
            display_refresh: 5.0,
            tick_ms: 10,
            output: OutputMode::default(),
            output_scale: 1,
            output_border: 0,
            web: WebConfig::default(),
            display_server: "127.0.0.1:5555".to_string(),
            ack_timeout_ms: 5000,
            keys: KeyConfig::default(),
            buttons_server: None,
            interfaces: None,
            check_dns: "google.com".to_string(),
            wan_ip_url: "https://share.us.davidrios.dev/myip".to_string(),
            wan_fallback_url: "http://1.1.1.1".to_string(),
            wifi_connect_helper: PathBuf::from("/usr/local/bin/wificonnect"),
            reboot_command: vec!["systemctl".to_string(), "reboot".to_string()],
            log_level: "info".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            size: [128, 32],
            font: Font::default(),
            line_height: None,
            page_size: None,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        // KEY_A / KEY_S
        Self {
            primary: 30,
            secondary: 31,
        }
    }
}

impl Font {
    /// Character cell height in pixels
    pub fn height(self) -> u32 {
        match self {
            Font::Font4x6 => 6,
            Font::Font5x7 => 7,
            Font::Font5x8 => 8,
            Font::Font6x10 => 10,
        }
    }
}

impl ButtonsServerConfig {
    fn default_direction() -> i32 {
        1
    }
}

impl DisplayConfig {
    pub fn width(&self) -> u32 {
        self.size[0]
    }

    pub fn height(&self) -> u32 {
        self.size[1]
    }

    pub fn line_height(&self) -> u32 {
        self.line_height.unwrap_or(self.font.height())
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Menu rows per page, by default as many text lines as fit on screen
    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or((self.height() / self.line_height().max(1)) as usize)
            .max(1)
    }
}

impl AppConfig {
    /// Loads the configuration named by `CONFIG_FILE` and caches it
    pub fn init() -> Result<&'static Self> {
        let path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_env_overrides()?;

        Ok(APP_CONFIG.get_or_init(|| config))
    }

    /// Reads and validates a configuration file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path
            .try_exists()
            .context(format!("failed to check config file {path:?}"))?
        {
            let content = std::fs::read_to_string(path)
                .context(format!("failed to read config file {path:?}"))?;
            serde_json::from_str::<Self>(&content)
                .context(format!("failed to parse config file {path:?}"))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var("HOST_NAME") {
            self.web.host = host;
        }

        if let Ok(port) = env::var("SERVER_PORT") {
            self.web.port = port
                .parse::<u16>()
                .context("failed to parse SERVER_PORT: invalid format")?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.display.width() > 0 && self.display.height() > 0,
            "display size must not be zero"
        );
        ensure!(
            self.display.line_height() > 0,
            "line height must not be zero"
        );
        ensure!(
            self.refresh.is_finite() && self.refresh > 0.0,
            "refresh must be a positive number of seconds"
        );
        ensure!(
            self.display_refresh.is_finite() && self.display_refresh > 0.0,
            "display_refresh must be a positive number of seconds"
        );
        ensure!(self.tick_ms > 0, "tick_ms must not be zero");
        ensure!(self.output_scale >= 1, "output_scale must be at least 1");
        ensure!(
            !self.reboot_command.is_empty(),
            "reboot_command must not be empty"
        );

        if let Some(buttons) = &self.buttons_server {
            ensure!(
                buttons.direction == 1 || buttons.direction == -1,
                "buttons_server.direction must be 1 or -1"
            );
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs_f64(self.display_refresh)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}
