pub mod cache;
pub mod config;
pub mod douban;
pub mod error;
pub mod limiter;
pub mod redirect;
pub mod resolver;
pub mod tmdb;
pub mod tvdb;
pub mod utils;

pub use config::{Settings, SharedConfig};
pub use error::ProviderError;
pub use resolver::{MediaLookup, ProviderId, Resolver};
