use crate::physics::ContactSample;
use crate::vec3::{self, Vec3};

/// Per-body impulse damping and emission threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactTuning {
    pub damping: f32,
    pub threshold: f32,
}

impl ContactTuning {
    pub const LARGE: ContactTuning = ContactTuning {
        damping: 0.4,
        threshold: 0.3,
    };

    pub const SMALL: ContactTuning = ContactTuning {
        damping: 0.6,
        threshold: 0.2,
    };
}

/// Debounced impact on a monitored body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub body: u8,
    pub force: f32,
}

#[derive(Debug, Clone)]
struct Monitor {
    block: u8,
    tuning: ContactTuning,
    force: Vec3,
    /// Simulation time (ms) before which this body stays silent.
    locked_until: f64,
}

/// Turns raw contact samples into rate-limited contact events.
pub struct ContactMonitor {
    monitors: Vec<Option<Monitor>>,
    settle_ms: f64,
    cooldown_ms: f64,
}

impl ContactMonitor {
    pub fn new(settle_ms: f64, cooldown_ms: f64) -> Self {
        Self {
            monitors: Vec::new(),
            settle_ms,
            cooldown_ms,
        }
    }

    /// Report contacts on rigid body `body` as block `block`.
    pub fn watch(&mut self, body: usize, block: u8, tuning: ContactTuning) {
        if self.monitors.len() <= body {
            self.monitors.resize(body + 1, None);
        }
        self.monitors[body] = Some(Monitor {
            block,
            tuning,
            force: Vec3::ZERO,
            locked_until: 0.0,
        });
    }

    /// Clear accumulators and lockouts. Called when the simulation clock restarts at zero.
    pub fn reset(&mut self) {
        for monitor in self.monitors.iter_mut().flatten() {
            monitor.force = Vec3::ZERO;
            monitor.locked_until = 0.0;
        }
    }

    pub fn on_contact(&mut self, sample: &ContactSample, elapsed_ms: f64) -> Option<ContactEvent> {
        let monitor = self.monitors.get_mut(sample.body)?.as_mut()?;

        if elapsed_ms < self.settle_ms || elapsed_ms < monitor.locked_until {
            return None;
        }

        monitor.force = vec3::add_scaled(monitor.force, sample.linear_velocity, sample.mass);
        monitor.force = vec3::scale(monitor.force, monitor.tuning.damping);

        let force = vec3::length(monitor.force);

        if force > monitor.tuning.threshold {
            monitor.locked_until = elapsed_ms + self.cooldown_ms;
            Some(ContactEvent {
                body: monitor.block,
                force,
            })
        } else {
            monitor.force = Vec3::ZERO;
            None
        }
    }
}
