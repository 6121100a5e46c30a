pub mod cache;
pub mod middleware;

pub use cache::{OptionKey, OptionsCache, OptionsSnapshot};
