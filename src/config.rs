use crate::prelude::*;

use serde::Deserialize;
use serde_yaml;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub device: Device,

    #[serde(default = "Config::default_ecoflow")]
    pub ecoflow: Ecoflow,

    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Device {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub serial: String,
    #[serde(default)]
    pub user_id: String,
}
impl Device {
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
} // }}}

// Ecoflow {{{
/// Upstream cloud broker the device publishes to.
#[derive(Clone, Debug, Deserialize)]
pub struct Ecoflow {
    #[serde(default = "Config::default_ecoflow_host")]
    pub host: String,
    #[serde(default = "Config::default_ecoflow_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,

    #[serde(default = "Config::default_enabled")]
    pub tls: bool,
    pub keepalive_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub request_on_connect: Option<bool>,
    pub request_interval_secs: Option<u64>,
}
impl Ecoflow {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn client_id(&self, device: &Device) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("powerocean-bridge-{}", device.serial()))
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn keepalive_secs(&self) -> u64 {
        self.keepalive_secs.unwrap_or(60)
    }

    pub fn reconnect_delay_secs(&self) -> u64 {
        self.reconnect_delay_secs.unwrap_or(30)
    }

    pub fn request_on_connect(&self) -> bool {
        self.request_on_connect != Some(false) // default on
    }

    pub fn request_interval_secs(&self) -> u64 {
        self.request_interval_secs.unwrap_or(300) // 5 minutes
    }
} // }}}

// Mqtt {{{
/// Local broker the decoded state is published to.
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    pub publish_individual: Option<bool>,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn publish_individual(&self) -> bool {
        self.publish_individual == Some(true)
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn device(&self) -> Device {
        self.lock().device.clone()
    }

    pub fn ecoflow(&self) -> Ecoflow {
        self.lock().ecoflow.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.lock().mqtt.clone()
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| file_error_with_source!(err, "error reading {}", file))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!("  Device: {}", config.device.serial);
        info!("  EcoFlow broker: {}:{} (tls: {})", config.ecoflow.host, config.ecoflow.port, config.ecoflow.tls);
        info!("  MQTT: {}", if config.mqtt.enabled { "enabled" } else { "disabled" });
        if config.mqtt.enabled {
            info!("    Host: {}", config.mqtt.host);
            info!("    Port: {}", config.mqtt.port);
            info!("    Namespace: {}", config.mqtt.namespace);
        }
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device.serial.is_empty() {
            return Err(file_error!("device serial cannot be empty"));
        }

        if self.ecoflow.port == 0 {
            bail!("ecoflow.port must be between 1 and 65535");
        }
        if self.ecoflow.host.is_empty() {
            return Err(file_error!("EcoFlow host cannot be empty"));
        }
        if self.ecoflow.request_interval_secs == Some(0) {
            bail!("ecoflow.request_interval_secs must be at least 1");
        }

        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                return Err(file_error!("MQTT host cannot be empty"));
            }
        }

        Ok(())
    }

    fn default_ecoflow() -> Ecoflow {
        Ecoflow {
            host: Self::default_ecoflow_host(),
            port: Self::default_ecoflow_port(),
            username: None,
            password: None,
            client_id: None,
            tls: Self::default_enabled(),
            keepalive_secs: None,
            reconnect_delay_secs: None,
            request_on_connect: None,
            request_interval_secs: None,
        }
    }

    fn default_ecoflow_host() -> String {
        "mqtt-e.ecoflow.com".to_string()
    }

    fn default_ecoflow_port() -> u16 {
        8883
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "powerocean".to_string()
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
