use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("authority rejected: {0}")]
    AuthorityRejected(String),
    #[error("handler error: {0}")]
    Handler(String),
}
