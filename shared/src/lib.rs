//! Wire protocol and session tuning shared by the blocks relay and its clients.

pub mod config;
pub mod protocol;
