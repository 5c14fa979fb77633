//! Operator Commands
//!
//! Roster, candidate and account management shared by the offline CLI and
//! the console of a running server. An [`Operator`] wraps the same
//! `Arc<Election>` and sink the vote server uses, so changes made while
//! serving are seen by voters immediately and saved by the same writer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::credentials::{Account, CredentialStore, Role};
use crate::election::export::ABSTAIN_LABEL;
use crate::election::{check_name, Candidate, CandidateId, Election, Tally, Turnout, Voter, VoterId, ABSTAIN_ID};
use crate::error::{Error, Result};
use crate::persist::FileSink;

/// Operator access to one ledger and one election
pub struct Operator {
    store: Arc<CredentialStore>,
    election: Arc<Election>,
    sink: Arc<FileSink>,
    /// Held across the account-then-voter pair of `add_voter` and across `bootstrap`
    roster_lock: Mutex<()>,
}

impl Operator {
    pub fn new(store: Arc<CredentialStore>, election: Arc<Election>, sink: Arc<FileSink>) -> Self {
        Self {
            store,
            election,
            sink,
            roster_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn election(&self) -> &Arc<Election> {
        &self.election
    }

    /// Write the election snapshot
    pub async fn save(&self) -> Result<()> {
        self.sink.save_snapshot(&self.election).await
    }

    /// Create the first administrator; refused once any admin exists
    pub async fn bootstrap(&self, login: &str, password: &str) -> Result<()> {
        let _guard = self.roster_lock.lock().await;

        if self.store.has_role(&Role::Admin).await? {
            return Err(Error::AlreadyExists(
                "an administrator account already exists".into(),
            ));
        }

        self.store.register(login, password, Role::Admin).await?;
        tracing::info!("Administrator {} created", login);
        Ok(())
    }

    /// Authenticate `login` and check that it holds the `admin` role
    pub async fn require_admin(&self, login: &str, password: &str) -> Result<Account> {
        let account = self.store.authenticate(login, password).await?;
        if account.role != Role::Admin {
            tracing::warn!("Account {} with role {} denied admin access", login, account.role);
            return Err(Error::Invalid(format!("{} is not an administrator", login)));
        }
        Ok(account)
    }

    /// Register a voter together with a fresh `votant` account
    ///
    /// Duplicate ids and logins are refused before the account is written,
    /// so a refused voter leaves nothing in the ledger.
    pub async fn add_voter(&self, id: VoterId, name: &str, login: &str, password: &str) -> Result<()> {
        check_name("voter name", name)?;
        check_name("voter login", login)?;

        let _guard = self.roster_lock.lock().await;

        let voters = self.election.voters().await;
        if voters.iter().any(|v| v.id == id) {
            return Err(Error::Duplicate(format!("voter id {}", id)));
        }
        if voters.iter().any(|v| v.login == login) {
            return Err(Error::Duplicate(format!("voter login {}", login)));
        }

        self.store.register(login, password, Role::Voter).await?;
        self.election.register_voter(id, name, login).await?;
        self.save().await?;

        tracing::info!("Voter {} registered with login {}", id, login);
        Ok(())
    }

    pub async fn add_candidate(&self, id: CandidateId, name: &str) -> Result<()> {
        self.election.register_candidate(id, name).await?;
        self.save().await?;
        tracing::info!("Candidate {} registered", id);
        Ok(())
    }

    /// Open voting and persist the flag
    pub async fn open(&self) -> Result<()> {
        self.election.open().await;
        self.save().await?;
        tracing::info!("Voting opened");
        Ok(())
    }

    /// Close voting and persist the flag
    pub async fn close(&self) -> Result<()> {
        self.election.close().await;
        self.save().await?;
        tracing::info!("Voting closed");
        Ok(())
    }

    /// Write the results CSV, returning its location
    pub async fn export(&self) -> Result<&Path> {
        self.sink.export(&self.election).await?;
        Ok(self.sink.export_path())
    }

    pub async fn add_account(&self, login: &str, password: &str, role: Role) -> Result<()> {
        self.store.register(login, password, role.clone()).await?;
        tracing::info!("Account {} created with role {}", login, role);
        Ok(())
    }

    /// Change a password; `old = None` skips the old-password check
    pub async fn change_password(&self, login: &str, old: Option<&str>, new: &str) -> Result<()> {
        self.store.change_password(login, old, new).await?;
        tracing::info!("Password changed for {}", login);
        Ok(())
    }

    pub async fn set_active(&self, login: &str, active: bool) -> Result<()> {
        self.store.set_active(login, active).await?;
        tracing::info!(
            "Account {} {}",
            login,
            if active { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Delete the snapshot so the next run starts from an empty election
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn reset(&self) -> Result<bool> {
        let removed = self.sink.remove_snapshot().await?;
        if removed {
            tracing::info!("Election snapshot removed");
        }
        Ok(removed)
    }
}

/// Marker file held by a running `serve`
///
/// Its presence tells offline commands that another process owns the
/// election snapshot. Removed on drop.
#[derive(Debug)]
pub struct ServeLock {
    path: PathBuf,
}

impl ServeLock {
    /// Create the lock file, failing if it already exists
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(format!(
                    "{} (another server is running; remove the file if it crashed)",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!("Acquired serve lock {}", path.display());
        Ok(Self { path })
    }

    /// Check whether some server holds the lock at `path`
    pub fn is_held(path: &Path) -> bool {
        path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ServeLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove serve lock {}: {}", self.path.display(), e);
        }
    }
}

// ============ Text reports ============

pub fn render_results(tally: &Tally) -> String {
    let mut out = String::from("BallotBox Results\n=================\n");
    for entry in &tally.entries {
        out.push_str(&format!("  [{:>3}] {:<24} {:>6}\n", entry.id, entry.name, entry.votes));
    }
    out.push_str(&format!(
        "  [{:>3}] {:<24} {:>6}\n",
        ABSTAIN_ID, ABSTAIN_LABEL, tally.blank
    ));
    out
}

pub fn render_stats(turnout: &Turnout, is_open: bool) -> String {
    let percent = if turnout.total > 0 {
        turnout.voted as f64 * 100.0 / turnout.total as f64
    } else {
        0.0
    };

    format!(
        "BallotBox Statistics\n\
         ====================\n\
         Status:           {}\n\
         Registered:       {}\n\
         Voted:            {} ({:.1}%)\n\
         Blank:            {}\n",
        if is_open { "open" } else { "closed" },
        turnout.total,
        turnout.voted,
        percent,
        turnout.blank
    )
}

pub fn render_voters(voters: &[Voter]) -> String {
    let mut out = format!("{:<8} {:<24} {:<16} {}\n", "ID", "NAME", "LOGIN", "VOTED");
    for voter in voters {
        let voted = match (voter.has_voted, voter.voted_blank) {
            (false, _) => "no",
            (true, false) => "yes",
            (true, true) => "blank",
        };
        out.push_str(&format!(
            "{:<8} {:<24} {:<16} {}\n",
            voter.id, voter.name, voter.login, voted
        ));
    }
    out.push_str(&format!("{} voters\n", voters.len()));
    out
}

pub fn render_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("[{}] {}\n", c.id, c.name))
        .collect()
}

/// Account table; passwords are never shown
pub fn render_accounts(accounts: &[Account]) -> String {
    let mut out = format!("{:<24} {:<12} {}\n", "LOGIN", "ROLE", "ACTIVE");
    for account in accounts {
        out.push_str(&format!(
            "{:<24} {:<12} {}\n",
            account.login,
            account.role,
            if account.active { "yes" } else { "no" }
        ));
    }
    out
}
