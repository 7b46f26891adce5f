//! Relay server for a shared block room.
//!
//! This module exposes the relay components for use in tests and binaries.

pub mod config;
pub mod contact;
pub mod dispatch;
pub mod error;
pub mod peer;
pub mod physics;
pub mod pointer_pool;
pub mod relay_loop;
pub mod room;
pub mod scene;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod vec3;
pub mod world;
pub mod ws;
