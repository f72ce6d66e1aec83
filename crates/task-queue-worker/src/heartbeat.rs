//! Connection heartbeat probing for the async loop.

use crate::hub::{Hub, TimerId};
use crate::transport::Connection;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_HEARTBEAT_RATE: f64 = 2.0;

/// Heartbeat window negotiated with the broker and how often to probe within it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatSettings {
    /// Seconds; 0 disables heartbeats.
    pub heartbeat: f64,
    pub rate: f64,
}

impl HeartbeatSettings {
    pub fn new(heartbeat: f64, rate: f64) -> Self {
        HeartbeatSettings { heartbeat, rate }
    }

    pub fn disabled() -> Self {
        Self::new(0.0, DEFAULT_HEARTBEAT_RATE)
    }

    /// Period between probes, `heartbeat / rate`. `None` when heartbeats are
    /// disabled or the values don't make a usable period.
    pub fn probe_period(&self) -> Option<Duration> {
        if self.heartbeat <= 0.0 || self.rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.heartbeat / self.rate)
            .ok()
            .filter(|period| !period.is_zero())
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Schedule `connection.heartbeat_check(rate)` on the hub, if the transport
/// supports heartbeats and they are enabled. Silently does nothing otherwise.
pub fn register_heartbeat(
    hub: &mut dyn Hub,
    connection: &Arc<dyn Connection>,
    settings: HeartbeatSettings,
) -> Option<TimerId> {
    if !connection.supports_heartbeats() {
        return None;
    }
    let period = settings.probe_period()?;

    let conn = connection.clone();
    let rate = settings.rate;
    let id = hub.call_repeatedly(period, Box::new(move || conn.heartbeat_check(rate)));

    debug!(?period, rate, "Heartbeat probe scheduled");
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_period() {
        let settings = HeartbeatSettings::new(10.0, 2.0);
        assert_eq!(settings.probe_period(), Some(Duration::from_secs(5)));

        let settings = HeartbeatSettings::new(60.0, 4.0);
        assert_eq!(settings.probe_period(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_disabled_heartbeat_has_no_period() {
        assert_eq!(HeartbeatSettings::disabled().probe_period(), None);
        assert_eq!(HeartbeatSettings::new(10.0, 0.0).probe_period(), None);
        assert_eq!(HeartbeatSettings::new(-1.0, 2.0).probe_period(), None);
        assert_eq!(HeartbeatSettings::new(f64::INFINITY, 2.0).probe_period(), None);
    }
}
