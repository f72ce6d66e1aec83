//! Worker configuration

use crate::error::{LoopError, Result};
use crate::heartbeat::{HeartbeatSettings, DEFAULT_HEARTBEAT_RATE};
use crate::loops::LoopMode;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub worker_id: Option<String>,
    /// Broker heartbeat window in seconds (0 disables heartbeats)
    pub heartbeat_secs: f64,
    /// Heartbeat probes per window
    pub heartbeat_rate: f64,
    /// Bound on each blocking drain call
    pub drain_timeout_ms: u64,
    /// Initial prefetch credit (0 = unlimited)
    pub prefetch_count: u32,
    pub mode: LoopMode,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            worker_id: None,
            heartbeat_secs: 120.0,
            heartbeat_rate: DEFAULT_HEARTBEAT_RATE,
            drain_timeout_ms: 2000,
            prefetch_count: 4,
            mode: LoopMode::Auto,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from an optional file and `TQ_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let config: WorkerConfig = builder
            .add_source(Environment::with_prefix("TQ").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.heartbeat_secs.is_finite() || self.heartbeat_secs < 0.0 {
            return Err(LoopError::InvalidConfig(format!(
                "heartbeat_secs must be a non-negative number, got {}",
                self.heartbeat_secs
            )));
        }
        if !self.heartbeat_rate.is_finite() || self.heartbeat_rate <= 0.0 {
            return Err(LoopError::InvalidConfig(format!(
                "heartbeat_rate must be positive, got {}",
                self.heartbeat_rate
            )));
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> HeartbeatSettings {
        HeartbeatSettings::new(self.heartbeat_secs, self.heartbeat_rate)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let uuid = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &uuid[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.heartbeat_rate, 2.0);
        assert_eq!(config.drain_timeout(), Duration::from_secs(2));
        assert_eq!(config.heartbeat().probe_period(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "heartbeat_secs: 10\nheartbeat_rate: 4.0\nmode: blocking\nprefetch_count: 16").unwrap();

        let config = WorkerConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.mode, LoopMode::Blocking);
        assert_eq!(config.prefetch_count, 16);
        assert_eq!(config.heartbeat().probe_period(), Some(Duration::from_millis(2500)));
        assert_eq!(config.drain_timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let config = WorkerConfig {
            heartbeat_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LoopError::InvalidConfig(_))));

        let config = WorkerConfig {
            heartbeat_secs: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_worker_id() {
        let config = WorkerConfig {
            worker_id: Some("worker-1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.generate_worker_id(), "worker-1");
        assert_ne!(WorkerConfig::default().generate_worker_id(), "");
    }
}
