//! Adapters for the credit bureau port

pub mod government_api;
pub mod token_cache;
pub mod response_cache;

pub use government_api::{GovernmentApiClient, GovernmentApiConfig};
pub use token_cache::TokenCache;
pub use response_cache::ResponseCache;
