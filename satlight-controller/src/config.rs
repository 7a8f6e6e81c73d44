use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use smart_leds::RGB8;
use std::path::Path;
use std::time::Duration;

use crate::led::{ColorOrder, DriverKind};
use crate::model::{Palette, scale};
use crate::render::StripLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Expected `X-Webhook-Secret` header; unchecked when absent
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub satellites: SatelliteConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub colors: ColorConfig,

    #[serde(default)]
    pub brightness: BrightnessConfig,

    #[serde(default)]
    pub led: LedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteConfig {
    #[serde(default = "default_satellite_count")]
    pub count: usize,

    #[serde(default = "default_leds_per_satellite")]
    pub leds_per_satellite: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_blink_half_period_ms")]
    pub blink_half_period_ms: u64,
}

/// RGB triples, e.g. `unsolved = [255, 0, 0]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_unsolved_color")]
    pub unsolved: [u8; 3],

    #[serde(default = "default_solved_color")]
    pub solved: [u8; 3],

    #[serde(default = "default_transmitting_color")]
    pub transmitting: [u8; 3],
}

/// Per-state brightness, 0-255
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrightnessConfig {
    #[serde(default = "default_brightness")]
    pub unsolved: u8,

    #[serde(default = "default_brightness")]
    pub solved: u8,

    #[serde(default = "default_brightness")]
    pub transmitting: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    #[serde(default)]
    pub driver: DriverKind,

    #[serde(default = "default_spi_device")]
    pub spi_device: String,

    #[serde(default)]
    pub color_order: ColorOrder,

    /// Global strip brightness, applied by the driver
    #[serde(default = "default_brightness")]
    pub brightness: u8,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_satellite_count() -> usize {
    10
}

fn default_leds_per_satellite() -> usize {
    3
}

fn default_state_path() -> String {
    "satellite_state.json".to_string()
}

fn default_tick_ms() -> u64 {
    100
}

fn default_blink_half_period_ms() -> u64 {
    500
}

fn default_unsolved_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_solved_color() -> [u8; 3] {
    [0, 255, 0]
}

fn default_transmitting_color() -> [u8; 3] {
    [0, 0, 255]
}

fn default_brightness() -> u8 {
    255
}

fn default_spi_device() -> String {
    "/dev/spidev0.0".to_string()
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            count: default_satellite_count(),
            leds_per_satellite: default_leds_per_satellite(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            blink_half_period_ms: default_blink_half_period_ms(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            unsolved: default_unsolved_color(),
            solved: default_solved_color(),
            transmitting: default_transmitting_color(),
        }
    }
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            unsolved: default_brightness(),
            solved: default_brightness(),
            transmitting: default_brightness(),
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            spi_device: default_spi_device(),
            color_order: ColorOrder::default(),
            brightness: default_brightness(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            webhook_secret: None,
            satellites: SatelliteConfig::default(),
            state: StateConfig::default(),
            render: RenderConfig::default(),
            colors: ColorConfig::default(),
            brightness: BrightnessConfig::default(),
            led: LedConfig::default(),
        }
    }
}

fn rgb([r, g, b]: [u8; 3]) -> RGB8 {
    RGB8::new(r, g, b)
}

impl ControllerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {:?}", path))?;
        Self::parse(&content).context(format!("Failed to parse config file {:?}", path))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ControllerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to defaults. Environment
    /// overrides and validation are applied either way.
    ///
    /// Returns the config and whether the file was found, so the caller can
    /// log it once logging is up.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<(Self, bool)> {
        let path = path.as_ref();
        let found = path.exists();
        let mut config = if found {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, found))
    }

    /// `PORT` and `WEBHOOK_SECRET` win over the file. An empty secret disables the check.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .context(format!("PORT is not a valid port number: {}", port))?;
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.webhook_secret = Some(secret);
        }
        if self.webhook_secret.as_deref().is_some_and(str::is_empty) {
            self.webhook_secret = None;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.satellites.count == 0 {
            bail!("satellites.count must be at least 1");
        }
        if self.satellites.leds_per_satellite == 0 {
            bail!("satellites.leds_per_satellite must be at least 1");
        }
        if self.render.tick_ms == 0 {
            bail!("render.tick_ms must be at least 1");
        }
        if self.render.blink_half_period_ms == 0 {
            bail!("render.blink_half_period_ms must be at least 1");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn layout(&self) -> StripLayout {
        StripLayout {
            satellite_count: self.satellites.count,
            leds_per_satellite: self.satellites.leds_per_satellite,
        }
    }

    pub fn palette(&self) -> Palette {
        Palette {
            unsolved: scale(rgb(self.colors.unsolved), self.brightness.unsolved),
            solved: scale(rgb(self.colors.solved), self.brightness.solved),
            transmitting: scale(rgb(self.colors.transmitting), self.brightness.transmitting),
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.render.tick_ms)
    }

    pub fn blink_half_period(&self) -> Duration {
        Duration::from_millis(self.render.blink_half_period_ms)
    }
}
