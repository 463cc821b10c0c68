#![forbid(unsafe_code)]

pub mod config;
pub mod cookie;
pub mod http;
pub mod provider;

pub use config::{AdapterConfig, ConfigError, LogFormat};
pub use http::{router, serve, AppState};
pub use provider::{GoogleIdentityProvider, IdentityProvider, ProviderError};
