pub mod component;
pub mod configuration;
pub mod options;
pub mod session;
pub mod source;

pub use component::Component;
pub use configuration::Configuration;
pub use options::Options;
pub use session::Session;
pub use source::Source;

use chrono::{DateTime, SecondsFormat, Utc};

/// Renders a timestamp the way the store expects: UTC, second precision, RFC3339.
pub fn now_stamp() -> String {
    stamp(Utc::now())
}

pub fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
