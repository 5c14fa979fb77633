//! Vote Client
//!
//! Voter-side connection speaking the session protocol.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};

use crate::election::{CandidateId, VoterId};
use crate::error::{Error, Result};
use crate::session::protocol::{
    self, parse_candidates_header, CandidateEntry, AUTH_FAIL, AUTH_OK, VOTE_ERROR, VOTE_OK,
};

/// Final outcome of a complete voting attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Server answered `AUTH_FAIL`
    AuthRejected,
    /// Server answered `OK`
    Accepted,
    /// Server answered `ERREUR`
    Refused,
}

/// One connection to a vote server
pub struct VoteClient {
    framed: Framed<TcpStream, LinesCodec>,
    address: String,
    /// Per-reply timeout
    request_timeout: Duration,
}

impl VoteClient {
    /// Connect to a vote server
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Network(format!("connect to {}: {}", address, e))),
            Err(_) => return Err(Error::ConnectionTimeout(address.to_string())),
        };

        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new()),
            address: address.to_string(),
            request_timeout,
        })
    }

    /// Send `AUTH`; returns whether the server accepted
    pub async fn authenticate(&mut self, login: &str, password: &str) -> Result<bool> {
        self.send_line(&protocol::auth_request(login, password)).await?;
        match self.read_line().await?.as_str() {
            AUTH_OK => Ok(true),
            AUTH_FAIL => Ok(false),
            other => Err(Error::Network(format!("unexpected auth reply {:?}", other))),
        }
    }

    /// Read the candidate listing sent after a successful `AUTH`
    pub async fn candidates(&mut self) -> Result<Vec<CandidateEntry>> {
        let header = self.read_line().await?;
        let count = parse_candidates_header(&header)
            .ok_or_else(|| Error::Network(format!("unexpected listing header {:?}", header)))?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self.read_line().await?;
            let entry = CandidateEntry::parse_line(&line)
                .ok_or_else(|| Error::Network(format!("bad candidate line {:?}", line)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Send `VOTE`; returns whether the server accepted
    pub async fn vote(&mut self, voter_id: VoterId, candidate_id: CandidateId) -> Result<bool> {
        self.send_line(&protocol::vote_request(voter_id, candidate_id)).await?;
        match self.read_line().await?.as_str() {
            VOTE_OK => Ok(true),
            VOTE_ERROR => Ok(false),
            other => Err(Error::Network(format!("unexpected vote reply {:?}", other))),
        }
    }

    /// Full exchange: authenticate, read the listing, vote, wait for the server to hang up
    pub async fn cast(
        mut self,
        login: &str,
        password: &str,
        voter_id: VoterId,
        candidate_id: CandidateId,
    ) -> Result<VoteOutcome> {
        if !self.authenticate(login, password).await? {
            return Ok(VoteOutcome::AuthRejected);
        }
        self.candidates().await?;

        let accepted = self.vote(voter_id, candidate_id).await?;
        self.wait_closed().await?;

        Ok(if accepted {
            VoteOutcome::Accepted
        } else {
            VoteOutcome::Refused
        })
    }

    /// Send a raw request line
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.framed.send(line).await?;
        Ok(())
    }

    /// Read one reply line
    pub async fn read_line(&mut self) -> Result<String> {
        match timeout(self.request_timeout, self.framed.next()).await {
            Ok(Some(line)) => Ok(line?),
            Ok(None) => Err(Error::Network(format!("{} closed the connection", self.address))),
            Err(_) => Err(Error::ConnectionTimeout(self.address.clone())),
        }
    }

    /// Wait until the server closes the connection
    ///
    /// The server persists results before hanging up, so files are current afterwards.
    pub async fn wait_closed(&mut self) -> Result<()> {
        loop {
            match timeout(self.request_timeout, self.framed.next()).await {
                Ok(None) => return Ok(()),
                Ok(Some(Ok(line))) => {
                    tracing::debug!("Ignoring trailing line {:?} from {}", line, self.address);
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Err(_) => return Err(Error::ConnectionTimeout(self.address.clone())),
            }
        }
    }
}
