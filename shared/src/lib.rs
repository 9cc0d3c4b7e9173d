//! Wire protocol, game rules and the client-side ball simulation shared by
//! the marble maze server and its clients.

pub mod client;
pub mod config;
pub mod maze;
pub mod physics;
pub mod protocol;
