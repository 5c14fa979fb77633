//! Credential Module
//!
//! Account ledger gating who may connect and vote.

mod account;
mod store;

pub use account::{Account, Role, MAX_LOGIN_LEN, MAX_PASSWORD_LEN, MAX_ROLE_LEN};
pub use store::CredentialStore;
