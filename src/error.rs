//! BallotBox Error Types

use thiserror::Error;

/// Result type alias for BallotBox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a vote submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Voting is not open
    Closed,
    /// No voter carries the submitted id
    UnknownVoter,
    /// The voter id belongs to a different login
    IdentityMismatch,
    /// The voter has already cast a vote
    AlreadyVoted,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Closed => write!(f, "election is closed"),
            RejectReason::UnknownVoter => write!(f, "unknown voter"),
            RejectReason::IdentityMismatch => write!(f, "voter id does not match login"),
            RejectReason::AlreadyVoted => write!(f, "voter has already voted"),
        }
    }
}

/// BallotBox error types
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record at line {line}: {reason}")]
    Format { line: usize, reason: String },

    // Lookup / registration errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    // Voting errors
    #[error("Vote rejected: {0}")]
    Rejected(RejectReason),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a format error for a given 1-based line
    pub fn format(line: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            line,
            reason: reason.into(),
        }
    }

    /// Check if this error came from a business-rule rejection of a vote
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    /// Check if this error is a storage failure (unreadable, unwritable or corrupt)
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Format { .. })
    }
}
