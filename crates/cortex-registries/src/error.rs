use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("illegal status transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },
    #[error("already exists: {0}")]
    AlreadyExists(String),
}
