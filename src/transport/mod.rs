//! The `transport` module is responsible for network communication with
//! clients over raw TCP.
//!
//! It defines the line protocol used between clients and the server, the
//! per-connection state machine that turns commands into broker operations,
//! and the acceptor that spawns one handler per connection.

pub mod command;
pub mod connection;
pub mod server;

pub use command::Command;
pub use connection::handle_connection;
pub use server::Server;
