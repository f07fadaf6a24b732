//! # PopSub TCP
//!
//! `popsub_tcp` is a minimalist, in-memory publish/subscribe broker reachable
//! over plain TCP. Clients send a single line command per connection:
//! `pub <topic> <data>` to publish once, or `sub <topic> [<topic> ...]` to
//! keep the connection open and receive every payload published to those
//! topics. Nothing is persisted; delivery is live fan-out only.
//!
//! ## Core Modules
//!
//! - `broker`: the concurrent topic registry and the publish/subscribe engine.
//! - `transport`: the command grammar, the per-connection state machine and the TCP acceptor.
//! - `client`: an async client for the line protocol.
//! - `config`: loading server and broker settings from files and the environment.
//! - `utils`: the error taxonomy written to clients, and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
