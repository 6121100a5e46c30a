pub mod gate;

pub use gate::{TenancyContext, TenancyGate, TENANT_HEADER};
