use thiserror::Error;

use crate::kv::KvError;

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("component `{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
