use crate::model::AlarmThresholds;
use crate::session::{Credentials, SessionConfig, DEFAULT_PORT, DEFAULT_TIMEOUT};
use clap::Parser;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Command line and environment for `airq-poller`.
#[derive(Debug, Clone, Parser)]
#[command(name = "airq-poller", about = "Polls an air-Q appliance over its local encrypted API")]
pub struct Config {
    /// Appliance hostname or IP address
    #[arg(long, env = "AIRQ_ADDRESS")]
    pub address: String,

    #[arg(long, env = "AIRQ_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Empty means the factory default
    #[arg(long, env = "AIRQ_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Seconds between polls
    #[arg(long, env = "AIRQ_POLL_INTERVAL", default_value_t = 10)]
    pub poll_interval: u64,

    /// Request timeout; defaults to 95% of the poll interval
    #[arg(long, env = "AIRQ_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    #[arg(long, env = "AIRQ_NAME", default_value = "air-Q")]
    pub name: String,

    #[arg(long, env = "AIRQ_HEALTH_THRESHOLD", default_value_t = 30.0)]
    pub health_threshold: f64,

    #[arg(long, env = "AIRQ_PERF_THRESHOLD", default_value_t = 30.0)]
    pub perf_threshold: f64,

    #[arg(long, env = "AIRQ_VIRUS_THRESHOLD", default_value_t = 50.0)]
    pub virus_threshold: f64,

    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    /// Publish state and events to this broker when set
    #[arg(long, env = "MQTT_BROKER")]
    pub mqtt_broker: Option<String>,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_TOPIC_PREFIX", default_value = "airq")]
    pub mqtt_topic_prefix: String,
}

impl Config {
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            name: self.name.clone(),
            address: self.address.clone(),
            port: self.port,
            credentials: Credentials::new(self.password.clone()),
            poll_interval: Duration::from_secs(self.poll_interval),
            timeout: self.timeout_ms.map(Duration::from_millis),
            thresholds: AlarmThresholds {
                health: self.health_threshold,
                performance: self.perf_threshold,
                virus: self.virus_threshold,
            },
        }
    }
}

/// The settings bag handed in by whoever hosts the device.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    pub thresholds: AlarmThresholds,
}

impl DeviceSettings {
    pub fn new(name: impl Into<String>, address: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: DEFAULT_PORT,
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            thresholds: AlarmThresholds::default(),
        }
    }

    /// A zero interval would spin; it falls back to the default.
    pub fn poll_period(&self) -> Duration {
        if self.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.poll_interval
        }
    }

    /// Explicit timeout, else 95% of the poll interval so a hung request
    /// is torn down before the next tick.
    pub fn request_timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ if self.poll_interval.is_zero() => DEFAULT_TIMEOUT,
            _ => self.poll_interval * 19 / 20,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.address.clone(),
            port: self.port,
            timeout: self.request_timeout(),
            credentials: self.credentials.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["airq-poller"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--address", "192.168.0.2"]);
        let settings = config.device_settings();

        assert_eq!(settings.port, 80);
        assert_eq!(settings.poll_period(), Duration::from_secs(10));
        assert_eq!(settings.request_timeout(), Duration::from_millis(9500));
        assert!(settings.credentials.is_default());
        assert_eq!(settings.thresholds, AlarmThresholds::default());
    }

    #[test]
    fn test_explicit_values() {
        let config = parse(&[
            "--address",
            "airq.local",
            "--port",
            "8080",
            "--password",
            "secret",
            "--poll-interval",
            "30",
            "--timeout-ms",
            "2000",
            "--health-threshold",
            "45",
        ]);
        let settings = config.device_settings();
        let session = settings.session_config();

        assert_eq!(session.host, "airq.local");
        assert_eq!(session.port, 8080);
        assert_eq!(session.timeout, Duration::from_secs(2));
        assert!(!session.credentials.is_default());
        assert_eq!(settings.thresholds.health, 45.0);
    }

    #[test]
    fn test_address_is_required() {
        assert!(Config::try_parse_from(["airq-poller"]).is_err());
    }

    #[test]
    fn test_zero_interval_falls_back() {
        let mut settings = DeviceSettings::new("test", "192.0.2.1", Credentials::default());
        settings.poll_interval = Duration::ZERO;
        assert_eq!(settings.poll_period(), DEFAULT_POLL_INTERVAL);
        assert_eq!(settings.request_timeout(), DEFAULT_TIMEOUT);
    }
}
