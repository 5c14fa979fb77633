//! Network Module
//!
//! TCP transport for vote sessions: the server side and a voter client.

mod server;
mod client;

pub use server::VoteServer;
pub use client::{VoteClient, VoteOutcome};
