//! Error types for Survivote Core

use thiserror::Error;

use crate::models::RoomStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(Conflict),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the error means another request already moved the room on.
    ///
    /// Callers should re-read the room rather than report an incident.
    pub fn is_resolution_race(&self) -> bool {
        matches!(
            self,
            Error::Conflict(Conflict::AlreadyResolved { .. })
                | Error::Conflict(Conflict::ChapterNotActive)
                | Error::Conflict(Conflict::RoomChanged)
        )
    }

    /// The conflict kind, if this is a conflict
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Error::Conflict(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Conflict> for Error {
    fn from(conflict: Conflict) -> Self {
        Error::Conflict(conflict)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(StoreError::from(err))
    }
}

/// State conflicts a well-formed request can run into
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("Already joined")]
    AlreadyJoined,
    #[error("Room is full")]
    RoomFull,
    #[error("Room is not joinable")]
    RoomNotJoinable,
    #[error("Already voted")]
    AlreadyVoted,
    #[error("Chapter is not active")]
    ChapterNotActive,
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Game not started")]
    GameNotStarted,
    #[error("No votes to resolve")]
    NoVotes,
    #[error("Vote is tied")]
    VoteTied,
    #[error("Leader vote is tied")]
    LeaderVoteTied,
    #[error("Final vote not started")]
    FinalVoteNotStarted,
    #[error("Room must have an odd number of players, at least 3")]
    InvalidPlayerCount,
    #[error("No active chapter")]
    NoActiveChapter,
    #[error("Game not finished")]
    GameNotFinished,
    #[error("Already resolved elsewhere, room is now {phase}")]
    AlreadyResolved { phase: RoomStatus },
    #[error("Room changed concurrently, re-read and retry")]
    RoomChanged,
}

/// Closed set of failures reported by the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("row not found")]
    NotFound,

    #[error(transparent)]
    Other(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(code, message) => {
                let detail = message.clone().unwrap_or_else(|| code.to_string());
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::UniqueViolation(detail)
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => StoreError::ForeignKeyViolation(detail),
                    _ => StoreError::Other(err),
                }
            }
            _ => StoreError::Other(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
