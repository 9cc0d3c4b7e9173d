//! Marble maze server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lobby;
pub mod lobby_loop;
pub mod maze;
pub mod player;
pub mod store;
pub mod sync;
