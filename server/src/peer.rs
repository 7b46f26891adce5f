use blocks_shared::protocol::{address_to_u32, PointerMotion, UserRecord, COLOR_LEN};
use std::time::Instant;

/// One connected client, owned by the room registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub slot: u8,
    /// Distinguishes successive occupants of the same slot.
    pub session: u64,
    /// Pointer body controlled by this peer. `None` when the pool was empty at admission.
    pub pointer: Option<usize>,
    /// Network origin, with a `" (n)"` suffix when shared with another peer.
    pub remote_address: String,
    pub color: [u8; COLOR_LEN],
    pub latency_ms: u16,
    /// `None` while active; set by the idle sweep the first time the peer is quiet.
    pub idle_since: Option<Instant>,
    pub is_moving: bool,
    pub is_pressed: bool,
}

impl Peer {
    pub fn new(slot: u8, session: u64, pointer: Option<usize>, remote_address: String) -> Self {
        Self {
            slot,
            session,
            pointer,
            remote_address,
            color: [0; COLOR_LEN],
            latency_ms: 0,
            idle_since: None,
            is_moving: false,
            is_pressed: false,
        }
    }

    pub fn motion(&self) -> PointerMotion {
        PointerMotion::from_flags(self.is_moving, self.is_pressed)
    }

    /// Record a round trip from a heartbeat echo, clamped to the u16 wire field.
    pub fn record_latency(&mut self, now_ms: u64, echoed_ms: u64) {
        let rtt = now_ms.saturating_sub(echoed_ms);
        self.latency_ms = rtt.min(u64::from(u16::MAX)) as u16;
    }

    pub fn user_record(&self) -> UserRecord {
        UserRecord {
            slot: self.slot,
            color: self.color,
            address: address_to_u32(&self.remote_address),
            latency_ms: self.latency_ms,
        }
    }
}
