pub mod error;
pub mod filters;
pub mod registry;

pub use error::ComponentError;
pub use filters::ComponentFilters;
pub use registry::ComponentRegistry;
