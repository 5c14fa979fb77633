//! Vote Session Module
//!
//! Per-connection protocol: authenticate, disclose candidates, accept one vote.

mod machine;
pub mod protocol;

pub use machine::{step, Effect, Input, Session, SessionState};
pub use protocol::{CandidateEntry, Reply};
