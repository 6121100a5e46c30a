pub mod probe;

pub use probe::{ComponentHealth, HealthDocument, HealthProbe};
