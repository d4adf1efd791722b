use crate::types::{DuelStatus, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("{0} is not a registered duelist")]
    NotDuelist(UserId),
    #[error("{0} is already a registered duelist")]
    AlreadyRegistered(UserId),
    #[error("{0} is currently in a duel")]
    AlreadyInDuel(UserId),
    #[error("{0}, you cannot challenge yourself")]
    SelfChallenge(UserId),
    #[error("{0}, you are not being challenged")]
    NotChallenged(UserId),
    #[error("{0}, you are not challenging anyone")]
    NotChallenging(UserId),
    #[error("{0}, you are not in a duel")]
    NotInDuel(UserId),
    #[error("{0}, you can no longer invalidate your duel")]
    InvalidateWindowPassed(UserId),
    #[error("duel is {actual}, expected {expected}")]
    WrongState {
        expected: DuelStatus,
        actual: DuelStatus,
    },
    #[error("{0}, only moderators can do that")]
    NotModerator(UserId),
    #[error("{0}, only the creator can cancel the duel")]
    NotCreator(UserId),
    #[error("{0}, you have already accepted this duel")]
    AlreadyAccepted(UserId),
    #[error("{0}, you are not invited to any multiplayer duel")]
    NotInvited(UserId),
    #[error("a multiplayer duel needs between {min} and {max} participants, got {got}")]
    ParticipantCount { min: usize, max: usize, got: usize },
    #[error("a multiplayer duel needs between 1 and {max} problems, got {got}")]
    ProblemCount { max: usize, got: usize },
    #[error("cannot show more than {max} duelists at once")]
    TooManyUsers { max: usize },
    #[error("problem {0} not found in the catalog")]
    UnknownProblem(String),
    #[error("{0} has no handle on the judge")]
    NoHandle(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    #[error(transparent)]
    Precondition(#[from] Precondition),
    #[error("no unsolved problems left at rating {rating} or below")]
    NoEligibleProblem { rating: i32 },
    #[error("Hey! No cheating!")]
    Conflict,
    #[error("judge service error: {0}")]
    External(String),
    #[error("duel store error: {0}")]
    Store(String),
    #[error("invalid config: {0}")]
    Config(String),
}

impl DuelError {
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_) | Self::NoEligibleProblem { .. } | Self::Conflict
        )
    }
}

pub type Result<T, E = DuelError> = std::result::Result<T, E>;
