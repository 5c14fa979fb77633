//! Vote Server
//!
//! TCP acceptor spawning one session task per voter connection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::election::Election;
use crate::error::Result;
use crate::persist::ResultSink;
use crate::session::{CandidateEntry, Effect, Input, Session};

/// Everything a session task needs
struct SessionContext {
    config: SessionConfig,
    store: Arc<CredentialStore>,
    election: Arc<Election>,
    sink: Arc<dyn ResultSink>,
}

/// Vote server
pub struct VoteServer {
    /// Bind address
    bind_address: String,
    /// Shared per-session dependencies
    context: Arc<SessionContext>,
    /// Shutdown signal
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl VoteServer {
    /// Create a new vote server
    pub fn new(
        bind_address: String,
        config: SessionConfig,
        store: Arc<CredentialStore>,
        election: Arc<Election>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        Self {
            bind_address,
            context: Arc::new(SessionContext {
                config,
                store,
                election,
                sink,
            }),
            shutdown: shutdown_tx,
        }
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("Vote server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until stopped
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            tracing::debug!("New voter connection from {}", addr);
                            let context = Arc::clone(&self.context);

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, addr, context).await {
                                    tracing::warn!("Session error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Vote server stopped");
        Ok(())
    }

    /// Stop the server
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Drive one session to completion
async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    context: Arc<SessionContext>,
) -> Result<()> {
    let codec = LinesCodec::new_with_max_length(context.config.max_line_len);
    let mut framed = Framed::new(socket, codec);
    let mut session = Session::new(context.config.max_token_len);
    let mut effects: VecDeque<Effect> = VecDeque::new();

    loop {
        let effect = match effects.pop_front() {
            Some(effect) => effect,
            None if session.is_closed() => break,
            None if session.wants_request() => {
                let input = read_request(&mut framed, &context.config, peer, session.login()).await;
                effects.extend(session.handle(input));
                continue;
            }
            None => {
                tracing::error!("Session from {} stalled in {:?}", peer, session.state());
                break;
            }
        };

        match effect {
            Effect::Send(reply) => {
                for line in reply.lines() {
                    framed.feed(line).await?;
                }
                SinkExt::<String>::flush(&mut framed).await?;
            }
            Effect::Authenticate { login, password } => {
                let account = match context.store.authenticate(&login, &password).await {
                    Ok(account) if account.is_voter() => {
                        tracing::info!("Voter {} authenticated from {}", login, peer);
                        Some(account)
                    }
                    Ok(account) => {
                        tracing::warn!(
                            "Account {} with role {} refused on vote server ({})",
                            login,
                            account.role,
                            peer
                        );
                        None
                    }
                    Err(e) if e.is_storage() => {
                        tracing::error!("Credential ledger unavailable for {} ({}): {}", login, peer, e);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Authentication failed for {} from {}: {}", login, peer, e);
                        None
                    }
                };
                effects.extend(session.handle(Input::AuthResult(account)));
            }
            Effect::FetchCandidates => {
                let entries = context
                    .election
                    .candidates()
                    .await
                    .into_iter()
                    .map(|c| CandidateEntry { id: c.id, name: c.name })
                    .collect();
                effects.extend(session.handle(Input::Candidates(entries)));
            }
            Effect::CastVote {
                voter_id,
                login,
                candidate_id,
            } => {
                let receipt = match context.election.cast_vote(voter_id, &login, candidate_id).await {
                    Ok(receipt) => {
                        if receipt.was_blank() {
                            tracing::info!("Blank vote recorded for voter {} ({})", voter_id, login);
                        } else {
                            tracing::info!("Vote recorded for voter {} ({})", voter_id, login);
                        }
                        Some(receipt)
                    }
                    Err(e) if e.is_rejection() => {
                        tracing::warn!("Vote from {} (voter {}) refused: {}", login, voter_id, e);
                        None
                    }
                    Err(e) => {
                        tracing::error!("Vote from {} (voter {}) failed: {}", login, voter_id, e);
                        None
                    }
                };
                effects.extend(session.handle(Input::VoteResult(receipt)));
            }
            Effect::Persist => {
                // The vote is already counted in memory; a failed write is only reported
                if let Err(e) = context.sink.persist(&context.election).await {
                    tracing::error!("Failed to persist results after vote: {}", e);
                }
            }
            Effect::Close => break,
        }
    }

    tracing::debug!("Session from {} closed", peer);
    Ok(())
}

/// Read one request, mapping transport conditions to session inputs
async fn read_request(
    framed: &mut Framed<TcpStream, LinesCodec>,
    config: &SessionConfig,
    peer: SocketAddr,
    login: Option<&str>,
) -> Input {
    match timeout(config.read_timeout(), framed.next()).await {
        Err(_) => {
            tracing::warn!("Read timeout from {} ({})", peer, login.unwrap_or("unauthenticated"));
            Input::Disconnected
        }
        Ok(None) => {
            if let Some(login) = login {
                tracing::info!("{} ({}) left without voting", login, peer);
            }
            Input::Disconnected
        }
        Ok(Some(Ok(line))) => Input::Request(line),
        Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
            tracing::warn!("Oversized request from {}", peer);
            Input::Malformed
        }
        Ok(Some(Err(LinesCodecError::Io(e)))) if e.kind() == std::io::ErrorKind::InvalidData => {
            tracing::warn!("Undecodable request from {}: {}", peer, e);
            Input::Malformed
        }
        Ok(Some(Err(e))) => {
            tracing::warn!("Error reading request from {}: {}", peer, e);
            Input::Disconnected
        }
    }
}
