use crate::error::AdmitError;
use crate::peer::Peer;
use crate::physics::PhysicsEngine;
use crate::room::{PeerKey, RoomRegistry};
use crate::scheduler::{Tick, TickScheduler};
use crate::simulation::Simulation;
use blocks_shared::config::SessionConfig;
use blocks_shared::protocol::{encode_contact, encode_physics_buffer, encode_users};
use std::time::{Duration, Instant};

/// Everything the relay task owns. Socket tasks never touch it directly.
pub struct RelayState<E> {
    pub(crate) config: SessionConfig,
    pub(crate) room: RoomRegistry,
    pub(crate) sim: Simulation<E>,
    pub(crate) scheduler: TickScheduler,
    current_tick: Option<Tick>,
}

impl<E: PhysicsEngine> RelayState<E> {
    pub fn new(config: SessionConfig, sim: Simulation<E>) -> Self {
        Self {
            room: RoomRegistry::new(sim.pointer_count()),
            scheduler: TickScheduler::from_config(&config),
            config,
            sim,
            current_tick: None,
        }
    }

    pub fn room(&self) -> &RoomRegistry {
        &self.room
    }

    pub fn sim(&self) -> &Simulation<E> {
        &self.sim
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Admit a peer. The first peer starts the tick scheduler.
    pub fn join(&mut self, remote_address: &str, now: Instant) -> Result<PeerKey, AdmitError> {
        let peer = self.room.admit(remote_address, &mut self.sim)?;
        let key = PeerKey::of(peer);
        tracing::info!(
            slot = key.slot,
            pointer = ?peer.pointer,
            address = %peer.remote_address,
            "Peer joined"
        );

        if self.scheduler.start(now) {
            self.sim.reset_clock();
            self.current_tick = None;
            tracing::info!("Tick scheduler started");
        }
        Ok(key)
    }

    /// Remove a peer. Stops the scheduler once the room is empty.
    pub fn leave(&mut self, key: PeerKey) -> Option<Peer> {
        let peer = self.room.remove(key, &mut self.sim)?;
        tracing::info!(slot = peer.slot, address = %peer.remote_address, "Peer left");

        if self.room.is_empty() && self.scheduler.stop() {
            self.current_tick = None;
            tracing::info!("Room empty, tick scheduler stopped");
        }
        Some(peer)
    }

    pub fn users_frame(&self) -> Vec<u8> {
        encode_users(&self.room.snapshot())
    }

    pub fn next_tick_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    /// Run one tick: step the engine and encode the outbound frames.
    ///
    /// CONTACT frames come first, then one PHYSICS_BUFFER frame. Returns
    /// nothing while the scheduler is stopped.
    pub fn tick(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let Some(tick) = self.scheduler.begin_tick(now) else {
            return Vec::new();
        };
        self.current_tick = Some(tick);

        let mut frames: Vec<Vec<u8>> = self
            .sim
            .step(tick.elapsed_ms)
            .into_iter()
            .map(|event| encode_contact(event.body, event.force))
            .collect();

        let motions = self
            .room
            .peers()
            .filter_map(|peer| peer.pointer.map(|pointer| (pointer, peer.motion())));
        frames.push(encode_physics_buffer(self.sim.snapshot(motions)));
        frames
    }

    /// Schedule the next tick relative to the one just run.
    pub fn finish_tick(&mut self, now: Instant) {
        if let Some(tick) = self.current_tick.take() {
            self.scheduler.finish_tick(&tick, now);
        }
    }

    /// Arm the idle clock of quiet peers and evict those idle for longer
    /// than the timeout. Evicted peers are already removed on return.
    pub fn idle_sweep(&mut self, now: Instant) -> Vec<PeerKey> {
        let timeout = Duration::from_millis(self.config.idle_timeout_ms);
        let mut expired = Vec::new();

        for peer in self.room.peers_mut() {
            match peer.idle_since {
                None => peer.idle_since = Some(now),
                Some(since) if now.saturating_duration_since(since) > timeout => {
                    expired.push(PeerKey::of(peer));
                }
                Some(_) => {}
            }
        }

        for key in &expired {
            tracing::info!(slot = key.slot, "Evicting idle peer");
            self.leave(*key);
        }
        expired
    }

    /// Any inbound frame counts as activity.
    pub fn touch(&mut self, key: PeerKey) {
        if let Some(peer) = self.room.get_mut(key) {
            peer.idle_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodySpec, BodyState, ContactSample, Entity, JointSpec};
    use crate::scene::Scene;
    use crate::vec3::{vec3, Vec3};
    use blocks_shared::protocol::{ClientMsg, ServerMsg, Tag, FLOATS_PER_BODY};
    use std::collections::HashMap;

    /// Engine that does no physics and reports a fixed impact every step.
    #[derive(Default)]
    struct ScriptedEngine {
        rigid: Vec<String>,
        records: HashMap<String, usize>,
        joints: HashMap<String, JointSpec>,
        buffer: Vec<f32>,
        impact: Option<ContactSample>,
        steps: usize,
    }

    impl PhysicsEngine for ScriptedEngine {
        fn step(&mut self) {
            self.steps += 1;
        }

        fn add(&mut self, spec: BodySpec) {
            match spec {
                BodySpec::Rigid(rigid) => {
                    if !rigid.is_static() {
                        self.records
                            .insert(rigid.name.clone(), self.buffer.len() / FLOATS_PER_BODY);
                        self.buffer.extend_from_slice(&[0.0; FLOATS_PER_BODY]);
                    }
                    self.rigid.push(rigid.name);
                }
                BodySpec::Joint(joint) => {
                    self.joints.insert(joint.name.clone(), joint);
                }
            }
        }

        fn remove(&mut self, name: &str) -> bool {
            self.joints.remove(name).is_some()
        }

        fn get(&self, name: &str) -> Option<Entity> {
            if self.joints.contains_key(name) {
                return Some(Entity::Joint);
            }
            self.rigid.iter().any(|n| n == name).then(|| {
                Entity::Body(BodyState {
                    position: Vec3::ZERO,
                    linear_velocity: Vec3::ZERO,
                    mass: 1.0,
                    joint_links: self
                        .joints
                        .values()
                        .filter(|j| j.body1 == name || j.body2 == name)
                        .count(),
                })
            })
        }

        fn set_position(&mut self, name: &str, position: Vec3) {
            if let Some(&record) = self.records.get(name) {
                let base = record * FLOATS_PER_BODY;
                self.buffer[base..base + 3].copy_from_slice(&[position.x, position.y, position.z]);
            }
        }

        fn buffer(&self) -> &[f32] {
            &self.buffer
        }

        fn drain_contacts(&mut self, out: &mut Vec<ContactSample>) {
            out.extend(self.impact);
        }
    }

    fn scripted_state() -> RelayState<ScriptedEngine> {
        let config = SessionConfig::default();
        let sim = Simulation::new(
            ScriptedEngine::default(),
            Scene::room(config.num_pointers),
            &config,
        );
        RelayState::new(config, sim)
    }

    fn tags(frames: &[Vec<u8>]) -> Vec<u8> {
        frames.iter().map(|f| f[0]).collect()
    }

    #[test]
    fn first_join_starts_and_last_leave_stops_scheduler() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        assert!(!state.scheduler().is_running());

        let a = state.join("10.0.0.1", t0).unwrap();
        let b = state.join("10.0.0.2", t0).unwrap();
        assert!(state.scheduler().is_running());

        state.leave(a);
        assert!(state.scheduler().is_running());
        state.leave(b);
        assert!(!state.scheduler().is_running());
        assert_eq!(state.next_tick_deadline(), None);
    }

    #[test]
    fn no_buffer_without_peers() {
        let mut state = scripted_state();
        assert!(state.tick(Instant::now()).is_empty());
        assert_eq!(state.sim().engine().steps, 0);
    }

    #[test]
    fn tick_broadcasts_buffer_with_pointer_flags() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        let key = state.join("10.0.0.1", t0).unwrap();
        state.dispatch(
            key,
            ClientMsg::Motion {
                slot: key.slot,
                pressed: false,
                point: [1.0, 2.0, 3.0],
            },
            0,
        );

        let frames = state.tick(t0 + Duration::from_millis(16));
        assert_eq!(tags(&frames), vec![Tag::PhysicsBuffer as u8]);
        let Ok(ServerMsg::PhysicsBuffer(floats)) = ServerMsg::decode(&frames[0]) else {
            panic!("Expected physics buffer");
        };
        assert_eq!(floats.len(), (63 + 22) * FLOATS_PER_BODY);
        let base = 63 * FLOATS_PER_BODY;
        assert_eq!(&floats[base..base + 3], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[base + 7], 1.0);
        // Unheld pointers keep the engine's value.
        assert_eq!(floats[base + FLOATS_PER_BODY + 7], 0.0);
    }

    #[test]
    fn grabbed_block_reports_one_contact_after_settling() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        let a = state.join("10.0.0.1", t0).unwrap();
        let _b = state.join("10.0.0.2", t0).unwrap();

        // Scene index 9 is block_3.
        state.dispatch(
            a,
            ClientMsg::Pick {
                slot: a.slot,
                body: 9,
                point: [0.0, 1.0, 0.0],
            },
            0,
        );
        assert!(state.sim().is_grabbing(0));

        state.sim.engine_mut().impact = Some(ContactSample {
            body: 9,
            linear_velocity: vec3(0.0, -10.0, 0.0),
            mass: 1.0,
        });

        let mut contacts = Vec::new();
        for k in 1..=80u64 {
            let now = t0 + Duration::from_millis(16 * k);
            let frames = state.tick(now);
            state.finish_tick(now);
            let elapsed = state.scheduler().elapsed_ms();
            for frame in frames.iter().filter(|f| f[0] == Tag::Contact as u8) {
                assert!(elapsed >= 1000.0, "contact during settling at {elapsed} ms");
                contacts.push(ServerMsg::decode(frame).unwrap());
            }
        }

        // 80 ticks reach 1280 ms: the first contact at 1008 ms locks the body
        // until 1258 ms, so a second one follows at 1264 ms.
        assert_eq!(contacts.len(), 2);
        match contacts[0] {
            ServerMsg::Contact { body, force } => {
                assert_eq!(body, 3);
                assert!(force > 0.3);
            }
            ref other => panic!("Expected contact, got {:?}", other),
        }
    }

    #[test]
    fn one_contact_within_cooldown_after_settling() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        state.join("10.0.0.1", t0).unwrap();
        state.sim.engine_mut().impact = Some(ContactSample {
            body: 9,
            linear_velocity: vec3(0.0, -10.0, 0.0),
            mass: 1.0,
        });

        let mut count = 0;
        for k in 1..=70u64 {
            let now = t0 + Duration::from_millis(16 * k);
            count += state
                .tick(now)
                .iter()
                .filter(|f| f[0] == Tag::Contact as u8)
                .count();
        }
        // 1120 ms elapsed: one event at 1008 ms, the next is locked out.
        assert_eq!(count, 1);
    }

    #[test]
    fn restart_resets_settling_period() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        let key = state.join("10.0.0.1", t0).unwrap();
        state.tick(t0 + Duration::from_millis(150));
        state.leave(key);

        let t1 = t0 + Duration::from_secs(10);
        state.join("10.0.0.1", t1).unwrap();
        state.sim.engine_mut().impact = Some(ContactSample {
            body: 9,
            linear_velocity: vec3(0.0, -10.0, 0.0),
            mass: 1.0,
        });
        let frames = state.tick(t1 + Duration::from_millis(16));
        assert_eq!(tags(&frames), vec![Tag::PhysicsBuffer as u8]);
        assert!(state.scheduler().elapsed_ms() < 20.0);
    }

    #[test]
    fn idle_peer_is_evicted_after_timeout() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        let quiet = state.join("10.0.0.1", t0).unwrap();
        let chatty = state.join("10.0.0.2", t0).unwrap();
        let minute = Duration::from_secs(60);

        assert!(state.idle_sweep(t0).is_empty());
        // Traffic at minute 29 resets the idle clock.
        state.touch(chatty);
        assert!(state.idle_sweep(t0 + minute * 29).is_empty());

        let evicted = state.idle_sweep(t0 + minute * 30 + Duration::from_secs(4));
        assert_eq!(evicted, vec![quiet]);
        assert!(state.room().get(quiet).is_none());
        assert!(state.room().get(chatty).is_some());
        assert_eq!(state.room().pool().free_count(), 21);

        // Removal already happened; a late leave from the socket is a no-op.
        assert!(state.leave(quiet).is_none());
    }

    #[test]
    fn exactly_thirty_minutes_is_not_evicted() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        state.join("10.0.0.1", t0).unwrap();
        state.idle_sweep(t0);
        assert!(state.idle_sweep(t0 + Duration::from_secs(30 * 60)).is_empty());
    }

    #[test]
    fn users_frame_lists_peers() {
        let mut state = scripted_state();
        let t0 = Instant::now();
        state.join("10.0.0.1", t0).unwrap();
        state.join("10.0.0.1", t0).unwrap();
        match ServerMsg::decode(&state.users_frame()).unwrap() {
            ServerMsg::Users(users) => {
                assert_eq!(users.len(), 2);
                assert_eq!(users[1].slot, 1);
                assert_eq!(users[1].address, 0x0a00_0001);
            }
            other => panic!("Expected users, got {:?}", other),
        }
    }
}
