#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error("all {0} room slots are occupied")]
    RoomFull(usize),
}
