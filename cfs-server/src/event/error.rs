use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("event bus publish timed out: {0}")]
    Timeout(String),

    #[error("event bus connection failed: {0}")]
    Connection(String),
}
