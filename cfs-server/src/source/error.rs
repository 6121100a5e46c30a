use thiserror::Error;

use crate::collab::CollabError;
use crate::kv::KvError;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source `{0}` not found")]
    NotFound(String),

    #[error("password authentication requires both `username` and `password`")]
    MissingCredentials,

    #[error("source `{0}` is still in use by one or more configurations or the additional_inventory_source option")]
    InUse(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
