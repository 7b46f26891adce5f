/// Session tuning shared by the relay and its clients.
///
/// All durations are milliseconds so the struct serialises the same way the
/// browser side reads it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Number of pointer bodies in the scene. Capped by the most restrictive
    /// client platform (22 simultaneous touches).
    pub num_pointers: usize,
    pub tick_rate_hz: f64,
    /// Largest simulated-time advance a single tick may take.
    pub max_delta_ms: f64,
    pub heartbeat_interval_ms: u64,
    /// Silence after which a peer is evicted (30 minutes).
    pub idle_timeout_ms: u64,
    /// Contact events are suppressed until the simulation has run this long.
    pub settle_ms: f64,
    /// Minimum spacing between two contact events of the same body.
    pub contact_cooldown_ms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_pointers: 22,
            tick_rate_hz: 61.0,
            max_delta_ms: 150.0,
            heartbeat_interval_ms: 4_000,
            idle_timeout_ms: 30 * 60 * 1_000,
            settle_ms: 1_000.0,
            contact_cooldown_ms: 250.0,
        }
    }
}

impl SessionConfig {
    /// Fixed timestep in milliseconds (1000 / tick rate).
    pub fn timestep_ms(&self) -> f64 {
        1_000.0 / self.tick_rate_hz
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_pointers == 0 || self.num_pointers > 255 {
            return Err("num_pointers must be in 1..=255".to_string());
        }
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err("tick_rate_hz must be finite and > 0".to_string());
        }
        if !self.max_delta_ms.is_finite() || self.max_delta_ms < self.timestep_ms() {
            return Err("max_delta_ms must be finite and >= one timestep".to_string());
        }
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be > 0".to_string());
        }
        if self.idle_timeout_ms < self.heartbeat_interval_ms {
            return Err("idle_timeout_ms must be >= heartbeat_interval_ms".to_string());
        }
        if !self.settle_ms.is_finite() || self.settle_ms < 0.0 {
            return Err("settle_ms must be finite and >= 0".to_string());
        }
        if !self.contact_cooldown_ms.is_finite() || self.contact_cooldown_ms < 0.0 {
            return Err("contact_cooldown_ms must be finite and >= 0".to_string());
        }
        Ok(())
    }
}
