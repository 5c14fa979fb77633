//! Election State
//!
//! Roster of voters and candidates plus the running tally. All access goes
//! through [`Election`], which holds the state behind one lock so that each
//! mutation is a single critical section.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, RejectReason, Result};

/// Numeric voter identifier, assigned by the operator
pub type VoterId = i64;

/// Numeric candidate identifier
pub type CandidateId = i64;

/// Reserved candidate id meaning "abstain"
pub const ABSTAIN_ID: CandidateId = 0;

/// Reject names the snapshot, export or wire listing cannot carry
///
/// Names are single tokens: non-empty, no whitespace (line breaks included)
/// and no `;`.
pub fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ';') {
        return Err(Error::Invalid(format!(
            "{} {:?} must be non-empty and contain no whitespace or ';'",
            what, name
        )));
    }
    Ok(())
}

/// A registered participant entitled to one vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub id: VoterId,
    pub name: String,
    pub has_voted: bool,
    pub voted_blank: bool,
    /// Login of the paired account
    pub login: String,
}

/// A registered option a vote may target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub votes: u64,
}

/// Plain election data, as persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionState {
    pub is_open: bool,
    pub voters: Vec<Voter>,
    pub candidates: Vec<Candidate>,
}

/// Result of an accepted vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteReceipt {
    pub voter_id: VoterId,
    /// Candidate credited, `None` for a blank vote
    pub candidate_id: Option<CandidateId>,
}

impl VoteReceipt {
    pub fn was_blank(&self) -> bool {
        self.candidate_id.is_none()
    }
}

/// Per-candidate counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub id: CandidateId,
    pub name: String,
    pub votes: u64,
}

/// Per-candidate counts plus blank votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub entries: Vec<TallyEntry>,
    pub blank: u64,
}

/// Participation summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Turnout {
    pub voted: u64,
    pub total: u64,
    pub blank: u64,
}

impl ElectionState {
    fn voted_count(&self) -> u64 {
        self.voters.iter().filter(|v| v.has_voted).count() as u64
    }

    fn blank_count(&self) -> u64 {
        self.voters.iter().filter(|v| v.voted_blank).count() as u64
    }

    /// Per-candidate counts and blank votes
    pub fn tally(&self) -> Tally {
        Tally {
            entries: self
                .candidates
                .iter()
                .map(|c| TallyEntry {
                    id: c.id,
                    name: c.name.clone(),
                    votes: c.votes,
                })
                .collect(),
            blank: self.blank_count(),
        }
    }

    /// Voted / registered / blank counts
    pub fn turnout(&self) -> Turnout {
        Turnout {
            voted: self.voted_count(),
            total: self.voters.len() as u64,
            blank: self.blank_count(),
        }
    }

    /// Check that candidate counts plus blank votes equal the number of voters who voted
    pub fn is_consistent(&self) -> bool {
        let counted: u64 = self.candidates.iter().map(|c| c.votes).sum();
        counted + self.blank_count() == self.voted_count()
            && self.voters.iter().all(|v| v.has_voted || !v.voted_blank)
    }
}

/// Shared, lock-guarded election
#[derive(Debug, Default)]
pub struct Election {
    state: RwLock<ElectionState>,
}

impl Election {
    /// Create an empty, closed election
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously persisted state
    pub fn from_state(state: ElectionState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Register a voter; the paired account must already exist
    pub async fn register_voter(&self, id: VoterId, name: &str, login: &str) -> Result<()> {
        check_name("voter name", name)?;
        check_name("voter login", login)?;

        let mut state = self.state.write().await;

        if state.voters.iter().any(|v| v.id == id) {
            return Err(Error::Duplicate(format!("voter id {}", id)));
        }
        if state.voters.iter().any(|v| v.login == login) {
            return Err(Error::Duplicate(format!("voter login {}", login)));
        }

        state.voters.push(Voter {
            id,
            name: name.to_string(),
            has_voted: false,
            voted_blank: false,
            login: login.to_string(),
        });
        tracing::debug!("Registered voter {} ({})", id, login);
        Ok(())
    }

    /// Register a candidate
    ///
    /// Candidate ids are not checked for uniqueness; the first registered
    /// candidate with a given id receives its votes.
    pub async fn register_candidate(&self, id: CandidateId, name: &str) -> Result<()> {
        if id == ABSTAIN_ID {
            return Err(Error::Invalid(format!(
                "candidate id {} is reserved for abstention",
                ABSTAIN_ID
            )));
        }
        check_name("candidate name", name)?;

        let mut state = self.state.write().await;
        state.candidates.push(Candidate {
            id,
            name: name.to_string(),
            votes: 0,
        });
        tracing::debug!("Registered candidate {} ({})", id, name);
        Ok(())
    }

    /// Open voting
    pub async fn open(&self) {
        self.state.write().await.is_open = true;
    }

    /// Close voting
    pub async fn close(&self) {
        self.state.write().await.is_open = false;
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_open
    }

    /// Record one vote for `voter_id`, authenticated as `login`
    ///
    /// The eligibility check, the tally increment and the `has_voted` flip
    /// happen under one write lock.
    pub async fn cast_vote(
        &self,
        voter_id: VoterId,
        login: &str,
        candidate_id: CandidateId,
    ) -> Result<VoteReceipt> {
        let mut state = self.state.write().await;

        if !state.is_open {
            return Err(Error::Rejected(RejectReason::Closed));
        }

        let voter_idx = state
            .voters
            .iter()
            .position(|v| v.id == voter_id)
            .ok_or(Error::Rejected(RejectReason::UnknownVoter))?;

        {
            let voter = &state.voters[voter_idx];
            if voter.login != login {
                return Err(Error::Rejected(RejectReason::IdentityMismatch));
            }
            if voter.has_voted {
                return Err(Error::Rejected(RejectReason::AlreadyVoted));
            }
        }

        let credited = match state.candidates.iter_mut().find(|c| c.id == candidate_id) {
            Some(candidate) => {
                candidate.votes += 1;
                Some(candidate.id)
            }
            None => None,
        };

        let voter = &mut state.voters[voter_idx];
        voter.has_voted = true;
        voter.voted_blank = credited.is_none();

        Ok(VoteReceipt {
            voter_id,
            candidate_id: credited,
        })
    }

    /// Per-candidate counts and blank votes
    pub async fn tally(&self) -> Tally {
        self.state.read().await.tally()
    }

    /// Voted / registered / blank counts
    pub async fn turnout(&self) -> Turnout {
        self.state.read().await.turnout()
    }

    pub async fn voters(&self) -> Vec<Voter> {
        self.state.read().await.voters.clone()
    }

    pub async fn candidates(&self) -> Vec<Candidate> {
        self.state.read().await.candidates.clone()
    }

    /// Copy of the full state
    pub async fn snapshot(&self) -> ElectionState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn sample() -> Election {
        let election = Election::new();
        election.register_voter(1, "Alice", "alice").await.unwrap();
        election.register_voter(2, "Bruno", "bruno").await.unwrap();
        election.register_candidate(5, "Bob").await.unwrap();
        election.register_candidate(7, "Chloe").await.unwrap();
        election
    }

    #[tokio::test]
    async fn test_register_voter_duplicates() {
        let election = sample().await;

        assert!(matches!(
            election.register_voter(1, "Other", "other").await,
            Err(Error::Duplicate(_))
        ));
        assert!(matches!(
            election.register_voter(3, "Alias", "alice").await,
            Err(Error::Duplicate(_))
        ));
        assert_eq!(election.voters().await.len(), 2);
    }

    #[tokio::test]
    async fn test_names_must_be_single_tokens() {
        let election = sample().await;

        for name in ["", "Bob Marley", "Bob\n[9] Mallory", "Bob;1", "Tab\tbed"] {
            assert!(
                matches!(election.register_candidate(9, name).await, Err(Error::Invalid(_))),
                "candidate name {:?}",
                name
            );
            assert!(
                matches!(election.register_voter(9, name, "nina").await, Err(Error::Invalid(_))),
                "voter name {:?}",
                name
            );
        }
        assert!(matches!(
            election.register_voter(9, "Nina", "ni na").await,
            Err(Error::Invalid(_))
        ));

        assert_eq!(election.candidates().await.len(), 2);
        assert_eq!(election.voters().await.len(), 2);
    }

    #[tokio::test]
    async fn test_restored_voter_cannot_vote_again() {
        let election = sample().await;
        election.open().await;
        election.cast_vote(1, "alice", 5).await.unwrap();

        let restarted = Election::from_state(election.snapshot().await);
        assert!(matches!(
            restarted.cast_vote(1, "alice", 7).await,
            Err(Error::Rejected(RejectReason::AlreadyVoted))
        ));
        assert!(restarted.cast_vote(2, "bruno", 7).await.is_ok());

        let tally = restarted.tally().await;
        assert_eq!((tally.entries[0].votes, tally.entries[1].votes), (1, 1));
    }

    #[tokio::test]
    async fn test_abstain_id_is_reserved() {
        let election = Election::new();
        assert!(matches!(
            election.register_candidate(ABSTAIN_ID, "Nobody").await,
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_open_close_idempotent() {
        let election = Election::new();
        assert!(!election.is_open().await);
        election.open().await;
        election.open().await;
        assert!(election.is_open().await);
        election.close().await;
        election.close().await;
        assert!(!election.is_open().await);
    }

    #[tokio::test]
    async fn test_vote_for_candidate() {
        let election = sample().await;
        election.open().await;

        let receipt = election.cast_vote(1, "alice", 5).await.unwrap();
        assert_eq!(receipt.candidate_id, Some(5));
        assert!(!receipt.was_blank());

        let tally = election.tally().await;
        assert_eq!(tally.entries[0].votes, 1);
        assert_eq!(tally.blank, 0);

        let alice = &election.voters().await[0];
        assert!(alice.has_voted);
        assert!(!alice.voted_blank);
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_blank() {
        let election = sample().await;
        election.open().await;

        assert!(election.cast_vote(1, "alice", 999).await.unwrap().was_blank());
        assert!(election.cast_vote(2, "bruno", ABSTAIN_ID).await.unwrap().was_blank());

        let tally = election.tally().await;
        assert!(tally.entries.iter().all(|e| e.votes == 0));
        assert_eq!(tally.blank, 2);
        assert_eq!(
            election.turnout().await,
            Turnout { voted: 2, total: 2, blank: 2 }
        );
    }

    #[tokio::test]
    async fn test_rejections() {
        let election = sample().await;

        assert!(matches!(
            election.cast_vote(1, "alice", 5).await,
            Err(Error::Rejected(RejectReason::Closed))
        ));

        election.open().await;
        assert!(matches!(
            election.cast_vote(42, "alice", 5).await,
            Err(Error::Rejected(RejectReason::UnknownVoter))
        ));
        assert!(matches!(
            election.cast_vote(2, "alice", 5).await,
            Err(Error::Rejected(RejectReason::IdentityMismatch))
        ));

        election.cast_vote(1, "alice", 5).await.unwrap();
        assert!(matches!(
            election.cast_vote(1, "alice", 7).await,
            Err(Error::Rejected(RejectReason::AlreadyVoted))
        ));

        // Nothing moved after the rejections
        let tally = election.tally().await;
        assert_eq!(tally.entries[0].votes, 1);
        assert_eq!(tally.entries[1].votes, 0);
    }

    #[tokio::test]
    async fn test_duplicate_candidate_id_credits_first() {
        let election = Election::new();
        election.register_voter(1, "Alice", "alice").await.unwrap();
        election.register_candidate(5, "First").await.unwrap();
        election.register_candidate(5, "Second").await.unwrap();
        election.open().await;

        election.cast_vote(1, "alice", 5).await.unwrap();
        let candidates = election.candidates().await;
        assert_eq!(candidates[0].votes, 1);
        assert_eq!(candidates[1].votes, 0);
    }

    #[tokio::test]
    async fn test_concurrent_votes_one_voter_single_acceptance() {
        let election = Arc::new(sample().await);
        election.open().await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let election = Arc::clone(&election);
            let candidate = if i % 2 == 0 { 5 } else { 7 };
            handles.push(tokio::spawn(async move {
                election.cast_vote(1, "alice", candidate).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert!(matches!(e, Error::Rejected(RejectReason::AlreadyVoted))),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(election.turnout().await.voted, 1);
        assert!(election.snapshot().await.is_consistent());
    }

    #[tokio::test]
    async fn test_invariant_holds_across_mixed_votes() {
        let election = Election::new();
        for id in 1..=10 {
            election
                .register_voter(id, &format!("V{}", id), &format!("v{}", id))
                .await
                .unwrap();
        }
        election.register_candidate(5, "Bob").await.unwrap();
        election.register_candidate(7, "Chloe").await.unwrap();
        election.open().await;

        for id in 1..=10 {
            let candidate = [5, 7, 0, 123][(id as usize) % 4];
            election.cast_vote(id, &format!("v{}", id), candidate).await.unwrap();
            assert!(election.snapshot().await.is_consistent());
        }

        let turnout = election.turnout().await;
        let tally = election.tally().await;
        let counted: u64 = tally.entries.iter().map(|e| e.votes).sum();
        assert_eq!(counted + tally.blank, turnout.voted);
        assert_eq!(turnout.voted, 10);
    }
}
