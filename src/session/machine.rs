//! Vote Session State Machine
//!
//! One session per connection. The machine never performs I/O: each input
//! yields the next state plus a list of effects for the driver to run, and
//! effect results come back in as further inputs.

use super::protocol::{parse_auth, parse_vote, CandidateEntry, Reply};
use crate::credentials::Account;
use crate::election::{CandidateId, VoteReceipt, VoterId};

/// Session phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `AUTH` request
    AwaitingAuth,
    /// Credentials handed to the store
    Authenticating { login: String },
    /// Authenticated; candidate list requested
    DisclosingCandidates { login: String },
    /// Waiting for the `VOTE` request
    AwaitingVote { login: String },
    /// Vote handed to the election
    Casting { login: String },
    /// Terminal
    Closed,
}

/// Something that happened to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// One complete request line
    Request(String),
    /// A frame that could not be decoded (too long, not UTF-8)
    Malformed,
    /// Peer went away or stopped talking
    Disconnected,
    /// Outcome of `Effect::Authenticate`; `None` on any failure
    AuthResult(Option<Account>),
    /// Outcome of `Effect::FetchCandidates`
    Candidates(Vec<CandidateEntry>),
    /// Outcome of `Effect::CastVote`; `None` when rejected
    VoteResult(Option<VoteReceipt>),
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(Reply),
    Authenticate { login: String, password: String },
    FetchCandidates,
    CastVote {
        voter_id: VoterId,
        login: String,
        candidate_id: CandidateId,
    },
    /// Persist and export results before closing
    Persist,
    Close,
}

/// Pure transition function
pub fn step(state: SessionState, input: Input, max_token_len: usize) -> (SessionState, Vec<Effect>) {
    use SessionState::*;

    match (state, input) {
        (Closed, _) => (Closed, Vec::new()),

        (_, Input::Disconnected) => (Closed, vec![Effect::Close]),

        (AwaitingAuth, Input::Request(line)) => match parse_auth(&line, max_token_len) {
            Some((login, password)) => (
                Authenticating { login: login.clone() },
                vec![Effect::Authenticate { login, password }],
            ),
            None => fail(Reply::AuthFail),
        },

        (Authenticating { login }, Input::AuthResult(Some(account)))
            if account.is_voter() && account.login == login =>
        {
            (
                DisclosingCandidates { login },
                vec![Effect::Send(Reply::AuthOk), Effect::FetchCandidates],
            )
        }

        (Authenticating { .. }, Input::AuthResult(_)) => fail(Reply::AuthFail),

        (DisclosingCandidates { login }, Input::Candidates(mut entries)) => {
            entries.push(CandidateEntry::abstain());
            (
                AwaitingVote { login },
                vec![Effect::Send(Reply::Candidates(entries))],
            )
        }

        (AwaitingVote { login }, Input::Request(line)) => match parse_vote(&line) {
            Some((voter_id, candidate_id)) => (
                Casting { login: login.clone() },
                vec![Effect::CastVote {
                    voter_id,
                    login,
                    candidate_id,
                }],
            ),
            None => fail(Reply::VoteError),
        },

        (Casting { .. }, Input::VoteResult(Some(_))) => (
            Closed,
            vec![Effect::Send(Reply::VoteOk), Effect::Persist, Effect::Close],
        ),

        (Casting { .. }, Input::VoteResult(None)) => fail(Reply::VoteError),

        // Malformed frames and out-of-order inputs end the session
        (AwaitingAuth, _) | (Authenticating { .. }, _) => fail(Reply::AuthFail),
        (_, _) => fail(Reply::VoteError),
    }
}

fn fail(reply: Reply) -> (SessionState, Vec<Effect>) {
    (SessionState::Closed, vec![Effect::Send(reply), Effect::Close])
}

/// Per-connection session
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    max_token_len: usize,
}

impl Session {
    pub fn new(max_token_len: usize) -> Self {
        Self {
            state: SessionState::AwaitingAuth,
            max_token_len,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Check whether the session is blocked on a request from the peer
    pub fn wants_request(&self) -> bool {
        matches!(
            self.state,
            SessionState::AwaitingAuth | SessionState::AwaitingVote { .. }
        )
    }

    /// Authenticated login, once past authentication
    pub fn login(&self) -> Option<&str> {
        match &self.state {
            SessionState::DisclosingCandidates { login }
            | SessionState::AwaitingVote { login }
            | SessionState::Casting { login } => Some(login),
            _ => None,
        }
    }

    /// Feed one input and collect the resulting effects
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let (next, effects) = step(state, input, self.max_token_len);
        self.state = next;
        effects
    }
}
