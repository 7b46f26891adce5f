//! Fixed-rate tick clock.
//!
//! The scheduler owns no timer. The relay loop sleeps until [`TickScheduler::deadline`]
//! and feeds the current instant back in, which keeps the clock testable with
//! synthetic instants.

use blocks_shared::config::SessionConfig;
use std::time::{Duration, Instant};

/// Timing of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Wall time since the previous tick, clamped to the max delta.
    pub delta_ms: f64,
    /// Simulation time since the scheduler started.
    pub elapsed_ms: f64,
    pub started: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Stopped,
    Running {
        last_tick: Instant,
        deadline: Instant,
    },
}

pub struct TickScheduler {
    timestep: Duration,
    max_delta: Duration,
    elapsed_ms: f64,
    phase: Phase,
}

impl TickScheduler {
    pub fn new(timestep: Duration, max_delta: Duration) -> Self {
        Self {
            timestep,
            max_delta,
            elapsed_ms: 0.0,
            phase: Phase::Stopped,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.timestep_ms() / 1000.0),
            Duration::from_secs_f64(config.max_delta_ms / 1000.0),
        )
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Start ticking from `now`. A restart resets the simulation clock.
    /// Does nothing if already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_running() {
            return false;
        }
        self.elapsed_ms = 0.0;
        self.phase = Phase::Running {
            last_tick: now,
            deadline: now + self.timestep,
        };
        true
    }

    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.phase = Phase::Stopped;
        was_running
    }

    /// When the next tick is due. `None` while stopped.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Running { deadline, .. } => Some(deadline),
            Phase::Stopped => None,
        }
    }

    /// Advance the clock at `now`. Returns `None` while stopped.
    pub fn begin_tick(&mut self, now: Instant) -> Option<Tick> {
        let Phase::Running { last_tick, deadline } = &mut self.phase else {
            return None;
        };

        let delta = now.saturating_duration_since(*last_tick).min(self.max_delta);
        let delta_ms = delta.as_secs_f64() * 1000.0;
        self.elapsed_ms += delta_ms;
        *last_tick = now;
        // Re-armed by `finish_tick`; a tick that is never finished must not spin.
        *deadline = now + self.timestep;

        Some(Tick {
            delta_ms,
            elapsed_ms: self.elapsed_ms,
            started: now,
        })
    }

    /// Schedule the next tick one timestep after `tick` started, minus the
    /// time the tick took. A tick that overran is followed immediately.
    pub fn finish_tick(&mut self, tick: &Tick, now: Instant) {
        if let Phase::Running { deadline, .. } = &mut self.phase {
            *deadline = (tick.started + self.timestep).max(now);
        }
    }
}
