//! Consumer-side cache over a provider.

use std::sync::Mutex;

use tracing::debug;

use crate::credential::{Credential, Provider};
use crate::error::ProviderError;

/// Holds the last credential and only calls [`Provider::retrieve`] again
/// when nothing is cached or the provider reports expiry.
pub struct CachedCredentials<P> {
    provider: P,
    cached: Mutex<Option<Credential>>,
}

impl<P: Provider> CachedCredentials<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<Credential, ProviderError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(credential) = cached.as_ref() {
            if !self.provider.is_expired() {
                return Ok(credential.clone());
            }
            debug!(provider = self.provider.name(), "cached credential expired");
        }
        let fresh = self.provider.retrieve()?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached credential so the next `get` retrieves.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}
