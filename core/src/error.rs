use thiserror::Error;

use crate::types::{ReclamationId, UserId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Reclamation {id} not found")]
    ReclamationNotFound { id: ReclamationId },

    #[error("Account {id} not found")]
    AccountNotFound { id: UserId },

    #[error("Dependency lookup failed during counterparty resolution: {0}")]
    ResolutionDependency(String),

    #[error("Settlement failed: {0}")]
    Settlement(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// True for both reclamation and account lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::ReclamationNotFound { .. } | EngineError::AccountNotFound { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
