//! Error types for the team engine

use thiserror::Error;

/// Main error type for team engine operations
#[derive(Error, Debug)]
pub enum TeamError {
    /// Operation requires membership in a team
    #[error("Not in a team")]
    NotInTeam,

    /// Creating or joining while already a member of a team
    #[error("Already in a team; leave the current team first")]
    AlreadyInTeam,

    /// Caller's role lacks the required permission
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Member was not found in the roster
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Rally point was not found
    #[error("Rally point not found: {0}")]
    RallyNotFound(String),

    /// Unknown role name
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Input is not a recognizable team package
    #[error("Invalid package format: {0}")]
    InvalidPackageFormat(String),

    /// Encrypted package supplied without a passphrase
    #[error("A passphrase is required to import this package")]
    PassphraseRequired,

    /// Authentication tag mismatch, wrong passphrase, or malformed ciphertext
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Team already holds the maximum number of rally points
    #[error("Rally point limit reached ({0})")]
    RallyLimitReached(usize),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during storage operations
    #[error("Storage error: {0}")]
    Storage(String),

    /// Mesh transport failed to send
    #[error("Transport error: {0}")]
    Transport(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TeamError {
    fn from(err: serde_json::Error) -> Self {
        TeamError::Serialization(err.to_string())
    }
}

/// Result type alias using TeamError
pub type TeamResult<T> = Result<T, TeamError>;
