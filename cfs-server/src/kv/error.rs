use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("no entry for key `{0}`")]
    NoEntry(String),

    #[error("store too busy: retry budget of {0}s exceeded")]
    TooBusy(u64),

    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("value did not deserialize into the expected type: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Internal sentinel raised by a [`super::backend::KvBackend::transact`]
/// implementation when a watched key changed between read and write. Never
/// escapes [`super::store::KvStore`] — the retry loop catches it.
#[derive(Debug)]
pub(crate) struct WatchConflict;
