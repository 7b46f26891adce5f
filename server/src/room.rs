use crate::error::AdmitError;
use crate::peer::Peer;
use crate::physics::PhysicsEngine;
use crate::pointer_pool::PointerPool;
use crate::simulation::Simulation;
use crate::vec3::Vec3;
use blocks_shared::protocol::{color_from_bytes, UserRecord};

/// Number of identity slots. Slot ids fit the u8 wire field.
pub const ROOM_SIZE: usize = 255;

/// Identifies one admission: a slot plus the session that occupied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub slot: u8,
    pub session: u64,
}

/// Fixed array of identity slots mapping slot index to connected peer.
pub struct RoomRegistry {
    slots: Vec<Option<Peer>>,
    pool: PointerPool,
    next_session: u64,
    len: usize,
}

impl RoomRegistry {
    pub fn new(num_pointers: usize) -> Self {
        Self {
            slots: vec![None; ROOM_SIZE],
            pool: PointerPool::new(num_pointers),
            next_session: 1,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pool(&self) -> &PointerPool {
        &self.pool
    }

    /// Admit a peer into the first free slot.
    ///
    /// The peer gets a pointer body if one is free; its body is moved to the
    /// origin. Pool exhaustion is not an error, the peer is admitted without one.
    pub fn admit<E: PhysicsEngine>(
        &mut self,
        remote_address: &str,
        sim: &mut Simulation<E>,
    ) -> Result<&Peer, AdmitError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(AdmitError::RoomFull(ROOM_SIZE))?;

        let remote_address = self.disambiguate(remote_address);
        let pointer = self.pool.acquire();
        if let Some(pointer) = pointer {
            sim.place_pointer(pointer, Vec3::ZERO);
        }

        let session = self.next_session;
        self.next_session += 1;
        self.len += 1;

        let peer = self.slots[slot].insert(Peer::new(slot as u8, session, pointer, remote_address));
        Ok(peer)
    }

    /// Free a peer's slot and pointer body. Stale or repeated keys are ignored.
    pub fn remove<E: PhysicsEngine>(&mut self, key: PeerKey, sim: &mut Simulation<E>) -> Option<Peer> {
        let entry = self.slots.get_mut(usize::from(key.slot))?;
        if entry.as_ref()?.session != key.session {
            return None;
        }
        let peer = entry.take()?;
        self.len -= 1;

        if let Some(pointer) = peer.pointer {
            sim.release_grab(pointer);
            self.pool.release(pointer);
        }
        Some(peer)
    }

    pub fn get(&self, key: PeerKey) -> Option<&Peer> {
        self.slots
            .get(usize::from(key.slot))?
            .as_ref()
            .filter(|peer| peer.session == key.session)
    }

    pub fn get_mut(&mut self, key: PeerKey) -> Option<&mut Peer> {
        self.slots
            .get_mut(usize::from(key.slot))?
            .as_mut()
            .filter(|peer| peer.session == key.session)
    }

    /// Active peers in slot order.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.slots.iter().flatten()
    }

    pub fn peers_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.slots.iter_mut().flatten()
    }

    /// USERS records in slot order.
    pub fn snapshot(&self) -> Vec<UserRecord> {
        self.peers().map(Peer::user_record).collect()
    }

    pub fn set_color(&mut self, key: PeerKey, bytes: &[u8]) -> bool {
        match self.get_mut(key) {
            Some(peer) => {
                peer.color = color_from_bytes(bytes);
                true
            }
            None => false,
        }
    }

    /// Store a round-trip sample, clamped to `0..=65535` ms.
    pub fn set_latency(&mut self, key: PeerKey, latency_ms: u64) -> bool {
        match self.get_mut(key) {
            Some(peer) => {
                peer.latency_ms = latency_ms.min(u64::from(u16::MAX)) as u16;
                true
            }
            None => false,
        }
    }

    /// Append `" (n)"` until the address is unique among active peers.
    fn disambiguate(&self, remote_address: &str) -> String {
        let taken = |candidate: &str| self.peers().any(|p| p.remote_address == candidate);

        let mut candidate = remote_address.to_string();
        let mut count = 1;
        while taken(&candidate) {
            count += 1;
            candidate = format!("{remote_address} ({count})");
        }
        candidate
    }
}

impl PeerKey {
    pub fn of(peer: &Peer) -> Self {
        Self {
            slot: peer.slot,
            session: peer.session,
        }
    }
}
