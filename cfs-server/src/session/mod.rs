pub mod age;
pub mod error;
pub mod fsm;
pub mod filters;

pub use error::SessionError;
pub use fsm::SessionFSM;
pub use filters::SessionFilters;
