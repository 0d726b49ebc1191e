//! Blitz room server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod ball;
pub mod config;
pub mod dispatcher;
pub mod effect;
pub mod error;
pub mod field;
pub mod game_loop;
pub mod lifecycle;
pub mod mirror;
pub mod physics;
pub mod player;
pub mod powerup;
pub mod profile;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod roster;
pub mod timer;
pub mod ws;
