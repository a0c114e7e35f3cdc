// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job entry '{name}': {reason}")]
    InvalidJobEntry { name: String, reason: String },

    #[error("Invalid timeout multiplier: {0}")]
    InvalidMultiplier(f64),

    #[error("Record is missing identity fields (url, headline)")]
    MissingIdentity,
}

pub type Result<T> = std::result::Result<T, DomainError>;
