//! Credential Store
//!
//! Flat-file account ledger. Every operation reads the whole ledger and
//! every mutation rewrites it; mutations from this process are serialized
//! by a single lock held across the read-modify-write.

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::account::{check_field, Account, Role, MAX_PASSWORD_LEN};
use crate::error::{Error, Result};
use crate::persist::replace_file;

/// Account ledger bound to one file
pub struct CredentialStore {
    /// Ledger location
    path: PathBuf,
    /// Held across every read-modify-write
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Bind a store to a ledger path (nothing is touched on disk)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Ledger location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the ledger exists, creating it empty if absent
    pub async fn init(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        tokio::fs::write(&self.path, b"").await?;
        tracing::info!("Created empty account ledger at {:?}", self.path);
        Ok(())
    }

    /// All accounts in ledger order
    pub async fn list(&self) -> Result<Vec<Account>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_ledger(&content)
    }

    /// Look up one account by exact login
    pub async fn find(&self, login: &str) -> Result<Option<Account>> {
        Ok(self.list().await?.into_iter().find(|a| a.login == login))
    }

    /// Check whether any account carries `role`
    pub async fn has_role(&self, role: &Role) -> Result<bool> {
        Ok(self.list().await?.iter().any(|a| &a.role == role))
    }

    /// Register a new, active account
    pub async fn register(&self, login: &str, password: &str, role: Role) -> Result<()> {
        let account = Account::new(login, password, role)?;

        let _guard = self.write_lock.lock().await;
        self.init().await?;

        let mut accounts = self.list().await?;
        if accounts.iter().any(|a| a.login == account.login) {
            return Err(Error::AlreadyExists(account.login));
        }

        tracing::debug!("Registering account {} ({})", account.login, account.role);
        accounts.push(account);
        self.save_all(&accounts).await
    }

    /// Check a login/password pair
    ///
    /// A disabled account and a wrong password both yield `Invalid`.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Account> {
        let account = self
            .find(login)
            .await?
            .ok_or_else(|| Error::NotFound(login.to_string()))?;

        if !account.active || account.password != password {
            return Err(Error::Invalid("bad credentials".into()));
        }

        Ok(account)
    }

    /// Replace a password
    ///
    /// `old_password = None` skips the check (operator forced reset).
    pub async fn change_password(
        &self,
        login: &str,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<()> {
        check_field("password", new_password, MAX_PASSWORD_LEN)?;

        self.update(login, |account| {
            if let Some(old) = old_password {
                if account.password != old {
                    return Err(Error::Invalid("old password does not match".into()));
                }
            }
            account.password = new_password.to_string();
            Ok(())
        })
        .await
    }

    /// Enable or disable an account
    pub async fn set_active(&self, login: &str, active: bool) -> Result<()> {
        self.update(login, |account| {
            account.active = active;
            Ok(())
        })
        .await
    }

    /// Read the ledger, apply `f` to one account and write everything back
    async fn update<F>(&self, login: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Account) -> Result<()>,
    {
        let _guard = self.write_lock.lock().await;

        let mut accounts = self.list().await?;
        let account = accounts
            .iter_mut()
            .find(|a| a.login == login)
            .ok_or_else(|| Error::NotFound(login.to_string()))?;

        f(account)?;
        self.save_all(&accounts).await
    }

    /// Replace the ledger content
    ///
    /// Unlocked readers see either the old or the new ledger.
    async fn save_all(&self, accounts: &[Account]) -> Result<()> {
        let mut content = String::new();
        for account in accounts {
            content.push_str(&account.to_line());
            content.push('\n');
        }
        replace_file(&self.path, content).await
    }
}

/// Parse a full ledger; one bad line fails the whole load
fn parse_ledger(content: &str) -> Result<Vec<Account>> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| Account::parse_line(line, i + 1))
        .collect()
}
