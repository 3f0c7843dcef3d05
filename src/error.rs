// Domain errors surfaced to peers as ERROR messages with stable codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error codes carried in ERROR messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthFailed,
    NotAuthenticated,
    InvalidMessage,
    UnknownType,
    RateLimited,
    AlreadyInMatch,
    AlreadyInQueue,
    NotInQueue,
    BotNotFound,
    BotOffline,
    MatchNotFound,
    NameTaken,
    TournamentNotFound,
    TournamentFull,
    AlreadyRegistered,
    InvalidTournament,
}

#[derive(Debug, Clone, Error)]
pub enum ArenaError {
    #[error("invalid API key")]
    AuthFailed,
    #[error("authenticate first")]
    NotAuthenticated,
    #[error("malformed message: {0}")]
    InvalidMessage(String),
    #[error("unknown message type")]
    UnknownType,
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("bot is already in a match")]
    AlreadyInMatch,
    #[error("bot is already in the matchmaking queue")]
    AlreadyInQueue,
    #[error("bot is not in the matchmaking queue")]
    NotInQueue,
    #[error("bot not found")]
    BotNotFound,
    #[error("bot is not online")]
    BotOffline,
    #[error("match not found")]
    MatchNotFound,
    #[error("bot name already taken")]
    NameTaken,
    #[error("tournament not found")]
    TournamentNotFound,
    #[error("tournament is full")]
    TournamentFull,
    #[error("already registered in this tournament")]
    AlreadyRegistered,
    #[error("invalid tournament configuration: {0}")]
    InvalidTournament(String),
}

impl ArenaError {
    /// The stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ArenaError::AuthFailed => ErrorCode::AuthFailed,
            ArenaError::NotAuthenticated => ErrorCode::NotAuthenticated,
            ArenaError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            ArenaError::UnknownType => ErrorCode::UnknownType,
            ArenaError::RateLimited(_) => ErrorCode::RateLimited,
            ArenaError::AlreadyInMatch => ErrorCode::AlreadyInMatch,
            ArenaError::AlreadyInQueue => ErrorCode::AlreadyInQueue,
            ArenaError::NotInQueue => ErrorCode::NotInQueue,
            ArenaError::BotNotFound => ErrorCode::BotNotFound,
            ArenaError::BotOffline => ErrorCode::BotOffline,
            ArenaError::MatchNotFound => ErrorCode::MatchNotFound,
            ArenaError::NameTaken => ErrorCode::NameTaken,
            ArenaError::TournamentNotFound => ErrorCode::TournamentNotFound,
            ArenaError::TournamentFull => ErrorCode::TournamentFull,
            ArenaError::AlreadyRegistered => ErrorCode::AlreadyRegistered,
            ArenaError::InvalidTournament(_) => ErrorCode::InvalidTournament,
        }
    }
}
