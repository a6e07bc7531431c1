//! Error types for the flexscale state layer.

use thiserror::Error;

/// Result type alias for blueprint store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during blueprint store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// Why a blueprint or binding was rejected by validation.
///
/// Each variant corresponds to one rule family; the message names the
/// offending field so an API caller can fix the request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric limit is out of range or inconsistent.
    #[error("invalid limit: {0}")]
    Limit(String),

    /// A threshold policy is missing or unknown.
    #[error("invalid threshold policy: {0}")]
    Policy(String),

    /// An identifier contains characters outside `\w` and `-`.
    #[error("invalid identifier: {0}")]
    SpecialCharacter(String),

    /// A timestamp violates its ordering invariants.
    #[error("invalid timestamp: {0}")]
    Time(String),

    /// The interval counter is outside its permitted range.
    #[error("invalid working set: {0}")]
    WorkingSet(String),
}
