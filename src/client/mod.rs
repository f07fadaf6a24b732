//! The `client` module is a small async client for the broker's line
//! protocol, used by the command-line `pub` and `sub` subcommands.

pub mod pubsub_client;
pub use pubsub_client::{Client, ClientError, Subscriber};
