//! Election Module
//!
//! In-memory roster and tally, plus its snapshot and export file formats.

mod state;
pub mod export;
pub mod snapshot;

pub use state::{
    check_name, Candidate, CandidateId, Election, ElectionState, Tally, TallyEntry, Turnout, Voter, VoterId,
    VoteReceipt, ABSTAIN_ID,
};
