use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::telemetry::TelemetryConfig;
use crate::usecase::feed_address::DEFAULT_NOTIFICATIONS_PATH;
use crate::usecase::notification_log::DEFAULT_MAX_NOTIFICATIONS;
use crate::usecase::notifications::ClientSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_notifications_path")]
    pub appointment_notifications_path: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_metrics_listen_addr")]
    pub metrics_listen_addr: SocketAddr,
    #[serde(default)]
    pub telemetry_enabled: bool,
    #[serde(default = "default_telemetry_service_name")]
    pub telemetry_service_name: String,
    #[serde(default = "default_telemetry_service_version")]
    pub telemetry_service_version: String,
    #[serde(default = "default_telemetry_environment")]
    pub telemetry_environment: String,
    #[serde(default = "default_telemetry_otlp_endpoint")]
    pub telemetry_otlp_endpoint: String,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_notifications_path() -> String {
    DEFAULT_NOTIFICATIONS_PATH.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_max_notifications() -> usize {
    DEFAULT_MAX_NOTIFICATIONS
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_metrics_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_telemetry_service_name() -> String {
    "appointment-notifier".to_string()
}

fn default_telemetry_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_telemetry_environment() -> String {
    "production".to_string()
}

fn default_telemetry_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(Config::builder().add_source(Environment::default()).build()?)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: Some(self.api_base_url.clone()),
            notifications_path: self.appointment_notifications_path.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_notifications: self.max_notifications,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.telemetry_service_name.clone(),
            service_version: self.telemetry_service_version.clone(),
            environment: self.telemetry_environment.clone(),
            otlp_endpoint: self.telemetry_otlp_endpoint.clone(),
        }
    }
}
