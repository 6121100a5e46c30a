use thiserror::Error;

use crate::collab::CollabError;
use crate::kv::KvError;
use crate::source_resolver::SourceResolverError;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("configuration `{0}` not found")]
    NotFound(String),

    #[error("layer must set exactly one of `branch`/`commit`")]
    AmbiguousRevision,

    #[error("layer must set exactly one of `clone_url`/`source`")]
    AmbiguousOrigin,

    #[error("source `{0}` does not exist")]
    UnknownSource(String),

    #[error("duplicate (origin, playbook) pair in layers: {0:?}")]
    DuplicateLayerPair((String, String)),

    #[error("configuration `{0}` is referenced by at least one component's desired_config")]
    InUse(String),

    #[error(transparent)]
    Resolve(#[from] SourceResolverError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("tenant `{actual}` may not write to configuration owned by `{owner}`")]
    TenantMismatch { owner: String, actual: String },

    #[error("non-admin callers cannot set `tenant_name` to a different tenant")]
    ForeignTenantAssignment,
}
