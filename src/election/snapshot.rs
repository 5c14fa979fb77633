//! Election Snapshot
//!
//! Whitespace-separated text dump of the roster and tally:
//!
//! ```text
//! <is_open>
//! <voter count>
//! <id> <name> <has_voted> <voted_blank> <login>
//! <candidate count>
//! <id> <name> <votes>
//! ```
//!
//! Names are written as-is; a name containing whitespace cannot be read back.

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use super::state::{Candidate, ElectionState, Voter};
use crate::error::{Error, Result};
use crate::persist::replace_file;

/// Render the snapshot text
pub fn encode(state: &ElectionState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", flag(state.is_open));
    let _ = writeln!(out, "{}", state.voters.len());
    for v in &state.voters {
        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            v.id,
            v.name,
            flag(v.has_voted),
            flag(v.voted_blank),
            v.login
        );
    }
    let _ = writeln!(out, "{}", state.candidates.len());
    for c in &state.candidates {
        let _ = writeln!(out, "{} {} {}", c.id, c.name, c.votes);
    }
    out
}

/// Parse snapshot text
pub fn decode(content: &str) -> Result<ElectionState> {
    let mut tokens = Tokens::new(content);

    let is_open = tokens.next_flag("is_open")?;

    let voter_count: usize = tokens.next_parsed("voter count")?;
    let mut voters = Vec::with_capacity(voter_count.min(1024));
    for _ in 0..voter_count {
        voters.push(Voter {
            id: tokens.next_parsed("voter id")?,
            name: tokens.next_str("voter name")?.to_string(),
            has_voted: tokens.next_flag("has_voted")?,
            voted_blank: tokens.next_flag("voted_blank")?,
            login: tokens.next_str("voter login")?.to_string(),
        });
    }

    let candidate_count: usize = tokens.next_parsed("candidate count")?;
    let mut candidates = Vec::with_capacity(candidate_count.min(1024));
    for _ in 0..candidate_count {
        candidates.push(Candidate {
            id: tokens.next_parsed("candidate id")?,
            name: tokens.next_str("candidate name")?.to_string(),
            votes: tokens.next_parsed("candidate votes")?,
        });
    }

    if let Some((line, extra)) = tokens.next() {
        return Err(Error::format(line, format!("unexpected trailing token {:?}", extra)));
    }

    Ok(ElectionState {
        is_open,
        voters,
        candidates,
    })
}

/// Write the snapshot to `path`
///
/// A crash mid-write leaves the previous snapshot intact.
pub async fn save(path: &Path, state: &ElectionState) -> Result<()> {
    replace_file(path, encode(state)).await
}

/// Read the snapshot at `path`; a missing file yields an empty, closed election
pub async fn load(path: &Path) -> Result<ElectionState> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => decode(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No snapshot at {:?}, starting empty", path);
            Ok(ElectionState::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn flag(value: bool) -> u8 {
    if value {
        1
    } else {
        0
    }
}

/// Token cursor that remembers line numbers for errors
struct Tokens<'a> {
    iter: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(content: &'a str) -> Self {
        let iter = content
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |t| (i + 1, t)));
        Self {
            iter: Box::new(iter),
            last_line: 1,
        }
    }

    fn next(&mut self) -> Option<(usize, &'a str)> {
        let item = self.iter.next();
        if let Some((line, _)) = item {
            self.last_line = line;
        }
        item
    }

    fn next_str(&mut self, what: &str) -> Result<&'a str> {
        self.next()
            .map(|(_, t)| t)
            .ok_or_else(|| Error::format(self.last_line, format!("missing {}", what)))
    }

    fn next_parsed<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_str(what)?;
        token
            .parse()
            .map_err(|_| Error::format(self.last_line, format!("bad {} {:?}", what, token)))
    }

    fn next_flag(&mut self, what: &str) -> Result<bool> {
        let value: i64 = self.next_parsed(what)?;
        Ok(value != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> ElectionState {
        ElectionState {
            is_open: true,
            voters: vec![
                Voter {
                    id: 1,
                    name: "Alice".into(),
                    has_voted: true,
                    voted_blank: false,
                    login: "alice".into(),
                },
                Voter {
                    id: 2,
                    name: "Bruno".into(),
                    has_voted: true,
                    voted_blank: true,
                    login: "bruno".into(),
                },
                Voter {
                    id: 3,
                    name: "Chen".into(),
                    has_voted: false,
                    voted_blank: false,
                    login: "chen".into(),
                },
            ],
            candidates: vec![
                Candidate { id: 5, name: "Bob".into(), votes: 1 },
                Candidate { id: 7, name: "Chloe".into(), votes: 0 },
            ],
        }
    }

    #[test]
    fn test_encode_layout() {
        let text = encode(&sample_state());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1");
        assert_eq!(lines[1], "3");
        assert_eq!(lines[2], "1 Alice 1 0 alice");
        assert_eq!(lines[5], "2");
        assert_eq!(lines[6], "5 Bob 1");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vote_data.txt");
        let state = sample_state();

        save(&path, &state).await.unwrap();
        assert_eq!(load(&path).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vote_data.txt");

        save(&path, &ElectionState::default()).await.unwrap();
        let state = sample_state();
        save(&path, &state).await.unwrap();

        assert_eq!(load(&path).await.unwrap(), state);
        assert!(!dir.path().join("vote_data.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_leftover_temp_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vote_data.txt");
        let state = sample_state();
        save(&path, &state).await.unwrap();

        // An interrupted write only ever touches the temp file
        std::fs::write(dir.path().join("vote_data.txt.tmp"), "1\n3\n1 Ali").unwrap();
        assert_eq!(load(&path).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let state = load(&dir.path().join("absent.txt")).await.unwrap();
        assert_eq!(state, ElectionState::default());
        assert!(!state.is_open);
    }

    #[test]
    fn test_truncated_snapshot_fails() {
        let err = decode("1\n2\n1 Alice 1 0 alice\n").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_non_numeric_token_fails() {
        let err = decode("1\n1\nx Alice 1 0 alice\n0\n").unwrap_err();
        assert!(matches!(err, Error::Format { line: 3, .. }));
    }

    #[test]
    fn test_name_with_space_corrupts() {
        let mut state = sample_state();
        state.candidates[0].name = "Bob Marley".into();
        assert!(decode(&encode(&state)).is_err());
    }
}
