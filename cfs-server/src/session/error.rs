use thiserror::Error;

use crate::event::EventBusError;
use crate::kv::KvError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session `{0}` already exists")]
    NameConflict(String),

    #[error("session `{0}` not found")]
    NotFound(String),

    #[error("configuration `{0}` does not exist")]
    UnknownConfiguration(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid ansible_passthrough flag: `{0}`")]
    InvalidPassthrough(String),

    #[error("invalid age token: `{0}`")]
    InvalidAge(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
