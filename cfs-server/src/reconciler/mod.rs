pub mod reconcile;

pub use reconcile::{reconcile, ConfigurationLookup, ConfigurationStatus, ReconcileOutcome};
