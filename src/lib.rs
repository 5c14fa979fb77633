//! BallotBox - Networked one-vote-per-voter election server
//!
//! Voters connect over TCP, authenticate against a flat-file credential
//! ledger, receive the candidate list and cast exactly one vote. The tally is
//! kept in memory behind a single lock and written to disk after every
//! accepted vote.
//!
//! # Architecture
//!
//! - [`credentials`]: `login;password;role;active` ledger with account management
//! - [`election`]: voters, candidates and the atomic `cast_vote`, plus the
//!   snapshot and CSV export formats
//! - [`session`]: the per-connection protocol as a pure state machine
//! - [`network`]: TCP server driving sessions, and a voter client
//! - [`persist`]: what happens to the results after each accepted vote
//! - [`display`]: live results on the operator terminal
//! - [`admin`]: operator commands over a shared election, and the serve lock
//! - [`console`]: operator commands typed into a running server

pub mod config;
pub mod error;
pub mod credentials;
pub mod election;
pub mod session;
pub mod network;
pub mod persist;
pub mod display;
pub mod admin;
pub mod console;

pub use config::BallotConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::admin::{Operator, ServeLock};
    pub use crate::config::BallotConfig;
    pub use crate::credentials::{Account, CredentialStore, Role};
    pub use crate::election::{Election, ElectionState, VoteReceipt};
    pub use crate::error::{Error, RejectReason, Result};
    pub use crate::network::{VoteClient, VoteOutcome, VoteServer};
    pub use crate::persist::{FileSink, ResultSink};
}
