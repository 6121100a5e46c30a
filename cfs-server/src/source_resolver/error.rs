use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceResolverError {
    #[error("failed to create scoped working directory: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("branch conversion failed: {0}")]
    BranchConversion(String),

    #[error("could not locate credentials for source")]
    MissingCredentials,
}
