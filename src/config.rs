//! YAML configuration loading and validation. Generalizes the teacher's
//! `AppConfig::from_env()` env-var loader into a file-driven loader with
//! the same "parse, validate, default, continue" shape.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::SessionConfig;

const DEFAULT_INSTANCE_NAME: &str = "gnmi_exporter";
const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
const DEFAULT_LISTEN_PORT: u16 = 9456;
const DEFAULT_METRIC_PREFIX: &str = "gnmi";
const DEFAULT_SCRAPE_INTERVAL: u64 = 60;
const DEFAULT_OVERSAMPLING: u64 = 2;
const DEFAULT_WD_MULTIPLIER: u64 = 3;

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub instance_name: String,
    pub listen_address: String,
    pub listen_port: u16,
    pub metric_prefix: String,
    pub scrape_interval: u64,
    pub oversampling: u64,
    pub wd_multiplier: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            scrape_interval: DEFAULT_SCRAPE_INTERVAL,
            oversampling: DEFAULT_OVERSAMPLING,
            wd_multiplier: DEFAULT_WD_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub global: GlobalConfig,
    pub devices: Vec<SessionConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
struct RawGlobal {
    instance_name: Option<String>,
    listen_address: Option<String>,
    listen_port: Option<u16>,
    metric_prefix: Option<String>,
    scrape_interval: Option<u64>,
    oversampling: Option<u64>,
    wd_multiplier: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
struct RawDevice {
    name: Option<String>,
    ip: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    force_encoding: Option<String>,
    bypass_msg_routing: Option<bool>,
    plugins: Option<Vec<String>>,
}

impl RawDevice {
    /// Overrides fields of `self` (the template) with any field `other`
    /// (the device entry) explicitly sets.
    fn merged_with(&self, other: &RawDevice) -> RawDevice {
        RawDevice {
            name: other.name.clone().or_else(|| self.name.clone()),
            ip: other.ip.clone().or_else(|| self.ip.clone()),
            port: other.port.or(self.port),
            user: other.user.clone().or_else(|| self.user.clone()),
            password: other.password.clone().or_else(|| self.password.clone()),
            force_encoding: other
                .force_encoding
                .clone()
                .or_else(|| self.force_encoding.clone()),
            bypass_msg_routing: other.bypass_msg_routing.or(self.bypass_msg_routing),
            plugins: other.plugins.clone().or_else(|| self.plugins.clone()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    global: Option<RawGlobal>,
    device_template: Option<RawDevice>,
    devices: Option<Vec<RawDevice>>,
}

pub fn load_from_file(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<AppConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(contents).map_err(ConfigError::Parse)?;

    let raw_global = raw.global.ok_or(ConfigError::MissingGlobal)?;
    let global = GlobalConfig {
        instance_name: raw_global
            .instance_name
            .unwrap_or_else(|| DEFAULT_INSTANCE_NAME.to_string()),
        listen_address: raw_global
            .listen_address
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
        listen_port: raw_global.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
        metric_prefix: raw_global
            .metric_prefix
            .unwrap_or_else(|| DEFAULT_METRIC_PREFIX.to_string()),
        scrape_interval: raw_global.scrape_interval.unwrap_or(DEFAULT_SCRAPE_INTERVAL),
        oversampling: raw_global.oversampling.unwrap_or(DEFAULT_OVERSAMPLING),
        wd_multiplier: raw_global.wd_multiplier.unwrap_or(DEFAULT_WD_MULTIPLIER),
    };

    let raw_devices = raw
        .devices
        .filter(|d| !d.is_empty())
        .ok_or(ConfigError::MissingDevices)?;
    let template = raw.device_template.unwrap_or_default();

    let devices = raw_devices
        .iter()
        .map(|d| {
            let merged = template.merged_with(d);
            SessionConfig {
                dev_name: merged.name.unwrap_or_default(),
                ip: merged.ip.unwrap_or_default(),
                port: merged.port.unwrap_or(57400),
                user: merged.user.unwrap_or_default(),
                password: merged.password.unwrap_or_default(),
                plugins: merged.plugins.unwrap_or_default(),
                scrape_interval_s: global.scrape_interval,
                oversampling: global.oversampling,
                wd_multiplier: global.wd_multiplier,
                force_encoding: merged.force_encoding,
                bypass_msg_routing: merged.bypass_msg_routing.unwrap_or(false),
            }
        })
        .collect();

    Ok(AppConfig { global, devices })
}
