//! # ferry-auth
//!
//! Credential providers and the fallback chain that picks between them.
//!
//! A [`ChainProvider`] asks its providers in order and remembers which one
//! answered, so later [`Provider::is_expired`] checks go to that provider
//! alone. [`CachedCredentials`] sits on top and only re-retrieves once the
//! answering provider reports expiry.

pub mod cached;
pub mod chain;
pub mod credential;
pub mod error;
pub mod providers;

pub use cached::CachedCredentials;
pub use chain::ChainProvider;
pub use credential::{Credential, Provider};
pub use error::ProviderError;
pub use providers::{EnvProvider, FileProvider, StaticProvider};
