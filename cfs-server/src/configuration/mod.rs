pub mod error;
pub mod registry;

pub use error::ConfigurationError;
pub use registry::{ConfigurationRegistry, VcsDefaults};
