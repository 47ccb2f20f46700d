use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(Option<String>),
    #[error("queue '{0}' not found")]
    NoSuchQueue(String),
    #[error("bus is closed")]
    Closed,
    #[cfg(feature = "amqp")]
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}
