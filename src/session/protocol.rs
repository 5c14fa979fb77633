//! Vote Session Wire Protocol
//!
//! Newline-delimited text lines:
//!
//! ```text
//! C: AUTH <login> <password>
//! S: AUTH_OK | AUTH_FAIL
//! S: CANDIDATES <n>
//! S: [<id>] <name>          (n lines, the last one is the abstain option)
//! C: VOTE <voterId> <candidateId>
//! S: OK | ERREUR
//! ```

use crate::election::{CandidateId, VoterId, ABSTAIN_ID};

pub const AUTH_COMMAND: &str = "AUTH";
pub const VOTE_COMMAND: &str = "VOTE";
pub const AUTH_OK: &str = "AUTH_OK";
pub const AUTH_FAIL: &str = "AUTH_FAIL";
pub const VOTE_OK: &str = "OK";
pub const VOTE_ERROR: &str = "ERREUR";
pub const CANDIDATES_HEADER: &str = "CANDIDATES";

/// Display label of the abstain option
pub const ABSTAIN_LABEL: &str = "ABSTAIN";

/// One entry of the candidate listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub id: CandidateId,
    pub name: String,
}

impl CandidateEntry {
    pub fn abstain() -> Self {
        Self {
            id: ABSTAIN_ID,
            name: ABSTAIN_LABEL.to_string(),
        }
    }

    fn to_line(&self) -> String {
        format!("[{}] {}", self.id, self.name)
    }

    /// Parse a `[<id>] <name>` line
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (id, name) = rest.split_once(']')?;
        Some(Self {
            id: id.trim().parse().ok()?,
            name: name.trim().to_string(),
        })
    }
}

/// A server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    AuthOk,
    AuthFail,
    /// Listing including the abstain option
    Candidates(Vec<CandidateEntry>),
    VoteOk,
    VoteError,
}

impl Reply {
    /// Lines to put on the wire
    pub fn lines(&self) -> Vec<String> {
        match self {
            Reply::AuthOk => vec![AUTH_OK.to_string()],
            Reply::AuthFail => vec![AUTH_FAIL.to_string()],
            Reply::VoteOk => vec![VOTE_OK.to_string()],
            Reply::VoteError => vec![VOTE_ERROR.to_string()],
            Reply::Candidates(entries) => {
                let mut lines = Vec::with_capacity(entries.len() + 1);
                lines.push(format!("{} {}", CANDIDATES_HEADER, entries.len()));
                lines.extend(entries.iter().map(CandidateEntry::to_line));
                lines
            }
        }
    }
}

/// Parse `AUTH <login> <password>`; every token must fit `max_token_len`
pub fn parse_auth(line: &str, max_token_len: usize) -> Option<(String, String)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [AUTH_COMMAND, login, password]
            if login.len() <= max_token_len && password.len() <= max_token_len =>
        {
            Some((login.to_string(), password.to_string()))
        }
        _ => None,
    }
}

/// Parse `VOTE <voterId> <candidateId>`
pub fn parse_vote(line: &str) -> Option<(VoterId, CandidateId)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [VOTE_COMMAND, voter, candidate] => Some((voter.parse().ok()?, candidate.parse().ok()?)),
        _ => None,
    }
}

/// Parse the `CANDIDATES <n>` header
pub fn parse_candidates_header(line: &str) -> Option<usize> {
    let (header, count) = line.split_once(' ')?;
    if header != CANDIDATES_HEADER {
        return None;
    }
    count.trim().parse().ok()
}

/// Render an `AUTH` request
pub fn auth_request(login: &str, password: &str) -> String {
    format!("{} {} {}", AUTH_COMMAND, login, password)
}

/// Render a `VOTE` request
pub fn vote_request(voter_id: VoterId, candidate_id: CandidateId) -> String {
    format!("{} {} {}", VOTE_COMMAND, voter_id, candidate_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth() {
        assert_eq!(
            parse_auth("AUTH alice pw", 64),
            Some(("alice".to_string(), "pw".to_string()))
        );
        assert_eq!(
            parse_auth("  AUTH   alice\tpw  ", 64),
            Some(("alice".to_string(), "pw".to_string()))
        );

        assert_eq!(parse_auth("AUTH alice", 64), None);
        assert_eq!(parse_auth("AUTH alice pw extra", 64), None);
        assert_eq!(parse_auth("auth alice pw", 64), None);
        assert_eq!(parse_auth("", 64), None);
    }

    #[test]
    fn test_parse_auth_token_limit() {
        let long = "x".repeat(65);
        assert_eq!(parse_auth(&format!("AUTH {} pw", long), 64), None);
        assert_eq!(parse_auth(&format!("AUTH alice {}", long), 64), None);
        assert!(parse_auth(&format!("AUTH {} pw", &long[..64]), 64).is_some());
    }

    #[test]
    fn test_parse_vote() {
        assert_eq!(parse_vote("VOTE 1 5"), Some((1, 5)));
        assert_eq!(parse_vote("VOTE 1 0"), Some((1, 0)));
        assert_eq!(parse_vote("VOTE 1 -3"), Some((1, -3)));

        assert_eq!(parse_vote("VOTE 1 abc"), None);
        assert_eq!(parse_vote("VOTE 1"), None);
        assert_eq!(parse_vote("VOTE 1 5 6"), None);
        assert_eq!(parse_vote("AUTH 1 5"), None);
    }

    #[test]
    fn test_candidate_listing_lines() {
        let reply = Reply::Candidates(vec![
            CandidateEntry { id: 5, name: "Bob".into() },
            CandidateEntry::abstain(),
        ]);

        let lines = reply.lines();
        assert_eq!(lines, vec!["CANDIDATES 2", "[5] Bob", "[0] ABSTAIN"]);

        assert_eq!(parse_candidates_header(&lines[0]), Some(2));
        assert_eq!(
            CandidateEntry::parse_line(&lines[1]),
            Some(CandidateEntry { id: 5, name: "Bob".into() })
        );
        assert_eq!(CandidateEntry::parse_line("Bob"), None);
    }

    #[test]
    fn test_request_rendering() {
        assert_eq!(auth_request("alice", "pw"), "AUTH alice pw");
        assert_eq!(vote_request(1, 5), "VOTE 1 5");
    }
}
