//! Account Records
//!
//! One ledger line per account: `login;password;role;active`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Field delimiter of the ledger
pub const DELIMITER: char = ';';

/// Maximum login length in bytes
pub const MAX_LOGIN_LEN: usize = 64;

/// Maximum password length in bytes
pub const MAX_PASSWORD_LEN: usize = 64;

/// Maximum role length in bytes
pub const MAX_ROLE_LEN: usize = 32;

/// Role of an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Role {
    /// Operator account
    Admin,
    /// May authenticate on the vote server
    Voter,
    /// Any other role string
    Other(String),
}

impl Role {
    /// The string stored in the ledger
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Voter => "votant",
            Role::Other(s) => s,
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "votant" => Role::Voter,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A login/password/role/active record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    pub password: String,
    pub role: Role,
    pub active: bool,
}

impl Account {
    /// Create a new, active account after checking every field
    pub fn new(login: &str, password: &str, role: Role) -> Result<Self> {
        check_field("login", login, MAX_LOGIN_LEN)?;
        check_field("password", password, MAX_PASSWORD_LEN)?;
        check_field("role", role.as_str(), MAX_ROLE_LEN)?;

        Ok(Self {
            login: login.to_string(),
            password: password.to_string(),
            role,
            active: true,
        })
    }

    /// Check whether the account may vote
    pub fn is_voter(&self) -> bool {
        self.role == Role::Voter
    }

    /// Encode as a ledger line (without the trailing newline)
    pub fn to_line(&self) -> String {
        format!(
            "{login}{d}{password}{d}{role}{d}{active}",
            login = self.login,
            password = self.password,
            role = self.role,
            active = if self.active { 1 } else { 0 },
            d = DELIMITER,
        )
    }

    /// Decode one ledger line; `line_no` is 1-based and only used for errors
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields: Vec<&str> = line.split(DELIMITER).collect();

        if fields.len() != 4 {
            return Err(Error::format(
                line_no,
                format!("expected 4 fields, found {}", fields.len()),
            ));
        }

        let active = fields[3]
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::format(line_no, format!("bad active flag {:?}", fields[3])))?;

        Ok(Self {
            login: fields[0].to_string(),
            password: fields[1].to_string(),
            role: Role::from(fields[2]),
            active: active != 0,
        })
    }
}

/// Reject values that would not survive a ledger round trip
pub fn check_field(name: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Invalid(format!("{} cannot be empty", name)));
    }
    if value.len() > max_len {
        return Err(Error::Invalid(format!(
            "{} longer than {} bytes",
            name, max_len
        )));
    }
    if value.contains([DELIMITER, '\r', '\n']) {
        return Err(Error::Invalid(format!(
            "{} cannot contain '{}' or line breaks",
            name, DELIMITER
        )));
    }
    Ok(())
}
