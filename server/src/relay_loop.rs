use crate::error::AdmitError;
use crate::physics::PhysicsEngine;
use crate::room::PeerKey;
use crate::simulation::Simulation;
use crate::state::RelayState;
use axum::body::Bytes;
use blocks_shared::config::SessionConfig;
use blocks_shared::protocol::ClientMsg;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

/// Commands from socket tasks to the relay loop
pub enum RelayCommand {
    Join {
        remote_address: String,
        /// Fired when the relay evicts this peer.
        evict: oneshot::Sender<()>,
        response: oneshot::Sender<Result<PeerKey, AdmitError>>,
    },
    Leave {
        key: PeerKey,
    },
    Frame {
        key: PeerKey,
        msg: ClientMsg,
    },
}

/// Wall-clock milliseconds, as carried by HEARTBEAT frames.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Run the relay. Owns all room and simulation state.
pub async fn run_relay_loop<E: PhysicsEngine>(
    mut cmd_rx: mpsc::Receiver<RelayCommand>,
    broadcast_tx: broadcast::Sender<Bytes>,
    config: SessionConfig,
    sim: Simulation<E>,
) {
    let mut state = RelayState::new(config, sim);
    let mut evictors: HashMap<PeerKey, oneshot::Sender<()>> = HashMap::new();

    let sweep_period = Duration::from_millis(config.heartbeat_interval_ms);
    let mut sweep = tokio::time::interval_at(Instant::now() + sweep_period, sweep_period);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let send = |frame: Vec<u8>| {
        // No receivers just means nobody is connected yet.
        let _ = broadcast_tx.send(Bytes::from(frame));
    };

    loop {
        let deadline = state.next_tick_deadline();

        tokio::select! {
            _ = tokio::time::sleep_until(deadline.map(Instant::from_std).unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                for frame in state.tick(Instant::now().into_std()) {
                    send(frame);
                }
                state.finish_tick(Instant::now().into_std());
            }

            _ = sweep.tick() => {
                for key in state.idle_sweep(Instant::now().into_std()) {
                    if let Some(evict) = evictors.remove(&key) {
                        let _ = evict.send(());
                    }
                }
                if !state.room().is_empty() {
                    send(state.users_frame());
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    RelayCommand::Join { remote_address, evict, response } => {
                        match state.join(&remote_address, Instant::now().into_std()) {
                            Ok(key) => {
                                if response.send(Ok(key)).is_err() {
                                    // Socket went away while waiting.
                                    state.leave(key);
                                } else {
                                    evictors.insert(key, evict);
                                }
                                send(state.users_frame());
                            }
                            Err(err) => {
                                tracing::debug!(address = %remote_address, "No slot for peer: {}", err);
                                let _ = response.send(Err(err));
                            }
                        }
                    }
                    RelayCommand::Leave { key } => {
                        evictors.remove(&key);
                        if state.leave(key).is_some() {
                            send(state.users_frame());
                        }
                    }
                    RelayCommand::Frame { key, msg } => {
                        if let Some(users) = state.dispatch(key, msg, unix_millis()) {
                            send(users);
                        }
                    }
                }
            }
        }
    }

    tracing::info!("Relay loop ended");
}
