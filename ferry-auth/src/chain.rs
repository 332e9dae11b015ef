//! Ordered fallback across providers with affinity to the last one that
//! answered.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::credential::{Credential, Provider};
use crate::error::ProviderError;
use crate::providers::{EnvProvider, FileProvider};

/// Tries each provider in order; the first success becomes the current
/// provider until the next [`Provider::retrieve`].
///
/// The chain only remembers *which* provider answered, never the secret.
pub struct ChainProvider {
    providers: Vec<Arc<dyn Provider>>,
    current: Mutex<Option<usize>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers,
            current: Mutex::new(None),
        }
    }

    /// Environment first, then `<home>/.ferry/token.yaml`.
    pub fn default_chain_at(home: &Path) -> Self {
        let env: Arc<dyn Provider> = Arc::new(EnvProvider::new());
        let file: Arc<dyn Provider> = Arc::new(FileProvider::at_home(home));
        Self::new(vec![env, file])
    }

    /// `default_chain_at` for the user's home directory; without one the
    /// chain holds only the environment provider.
    pub fn default_chain() -> Self {
        match dirs::home_dir() {
            Some(home) => Self::default_chain_at(&home),
            None => Self::new(vec![Arc::new(EnvProvider::new())]),
        }
    }

    /// Name of the provider that answered the last retrieve, if any.
    pub fn current_name(&self) -> Option<&str> {
        let index = (*self.lock())?;
        self.providers.get(index).map(|p| p.name())
    }

    fn lock(&self) -> MutexGuard<'_, Option<usize>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Provider for ChainProvider {
    fn name(&self) -> &str {
        "chain"
    }

    fn retrieve(&self) -> Result<Credential, ProviderError> {
        let mut causes = Vec::with_capacity(self.providers.len());
        for (index, provider) in self.providers.iter().enumerate() {
            match provider.retrieve() {
                Ok(credential) => {
                    debug!(provider = provider.name(), "credential retrieved");
                    *self.lock() = Some(index);
                    return Ok(credential);
                }
                Err(err) => {
                    debug!(provider = provider.name(), error = %err, "provider failed");
                    causes.push((provider.name().to_string(), err));
                }
            }
        }
        *self.lock() = None;
        Err(ProviderError::Exhausted(causes))
    }

    fn is_expired(&self) -> bool {
        let current = *self.lock();
        match current.and_then(|index| self.providers.get(index)) {
            Some(provider) => provider.is_expired(),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
