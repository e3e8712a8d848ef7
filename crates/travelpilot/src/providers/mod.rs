pub mod base;
pub mod errors;
pub mod formats;
pub mod google;
pub mod utils;

pub use base::{Provider, ProviderUsage, Usage};
pub use errors::ProviderError;
pub use google::GoogleProvider;
