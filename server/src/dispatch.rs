use crate::physics::PhysicsEngine;
use crate::room::PeerKey;
use crate::state::RelayState;
use crate::vec3::Vec3;
use blocks_shared::protocol::ClientMsg;

impl<E: PhysicsEngine> RelayState<E> {
    /// Apply one inbound frame from `key`.
    ///
    /// Returns a USERS frame to broadcast when the room listing changed.
    /// The slot byte carried by the frame is ignored: the sender is `key`.
    pub fn dispatch(&mut self, key: PeerKey, msg: ClientMsg, now_ms: u64) -> Option<Vec<u8>> {
        self.touch(key);
        let peer = self.room.get_mut(key)?;

        match msg {
            ClientMsg::HeartbeatAck { timestamp_ms, .. } => {
                peer.record_latency(now_ms, timestamp_ms);
                None
            }
            ClientMsg::Color { color, .. } => {
                // Spectating peers have no pointer and no colour to show.
                peer.pointer?;
                self.room.set_color(key, &color);
                Some(self.users_frame())
            }
            ClientMsg::Pick { body, point, .. } => {
                let pointer = peer.pointer?;
                if !self.sim.grab(pointer, usize::from(body), Vec3::from_array(point)) {
                    tracing::debug!(slot = key.slot, body, "Pick target is not grabbable");
                }
                None
            }
            ClientMsg::Motion { pressed, point, .. } => {
                let pointer = peer.pointer?;
                peer.is_moving = true;
                peer.is_pressed = pressed;
                self.sim.place_pointer(pointer, Vec3::from_array(point));
                if !pressed {
                    self.sim.release_grab(pointer);
                }
                None
            }
            ClientMsg::Unrecognized { tag } => {
                tracing::trace!(slot = key.slot, ?tag, "Dropping unrecognized frame");
                None
            }
        }
    }
}
