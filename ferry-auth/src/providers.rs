//! Built-in providers: a fixed token, environment variables, and a YAML
//! token file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::credential::{Credential, Provider};
use crate::error::{io_err, ProviderError};

pub const TOKEN_ENV: &str = "FERRY_TOKEN";
pub const TOKEN_EXPIRES_ENV: &str = "FERRY_TOKEN_EXPIRES";

// ---------------------------------------------------------------------------
// Expiry bookkeeping
// ---------------------------------------------------------------------------

/// Expiry of the last credential a provider handed out; the outer `None`
/// means nothing was retrieved yet.
#[derive(Default)]
struct LastExpiry(Mutex<Option<Option<DateTime<Utc>>>>);

impl LastExpiry {
    fn record(&self, credential: &Credential) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(credential.expires_at);
    }

    fn is_expired(&self) -> bool {
        match *self.0.lock().unwrap_or_else(|e| e.into_inner()) {
            None => true,
            Some(None) => false,
            Some(Some(at)) => at <= Utc::now(),
        }
    }
}

fn hand_out(
    provider: &str,
    last: &LastExpiry,
    credential: Credential,
) -> Result<Credential, ProviderError> {
    if let Some(at) = credential.expires_at.filter(|at| *at <= Utc::now()) {
        return Err(ProviderError::Expired {
            provider: provider.to_string(),
            expired_at: at,
        });
    }
    last.record(&credential);
    Ok(credential)
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// Always returns the token it was built with.
pub struct StaticProvider {
    credential: Credential,
    last: LastExpiry,
}

impl StaticProvider {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            credential: Credential::new(token, expires_at),
            last: LastExpiry::default(),
        }
    }
}

impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn retrieve(&self) -> Result<Credential, ProviderError> {
        if self.credential.token.is_empty() {
            return Err(ProviderError::Invalid {
                provider: self.name().to_string(),
                reason: "token is empty".to_string(),
            });
        }
        hand_out(self.name(), &self.last, self.credential.clone())
    }

    fn is_expired(&self) -> bool {
        self.last.is_expired()
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Reads the token from `FERRY_TOKEN` and an optional unix-seconds expiry
/// from `FERRY_TOKEN_EXPIRES`.
pub struct EnvProvider {
    token_var: String,
    expires_var: String,
    last: LastExpiry,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self::with_vars(TOKEN_ENV, TOKEN_EXPIRES_ENV)
    }

    pub fn with_vars(token_var: impl Into<String>, expires_var: impl Into<String>) -> Self {
        Self {
            token_var: token_var.into(),
            expires_var: expires_var.into(),
            last: LastExpiry::default(),
        }
    }

    fn invalid(&self, reason: String) -> ProviderError {
        ProviderError::Invalid {
            provider: self.name().to_string(),
            reason,
        }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn retrieve(&self) -> Result<Credential, ProviderError> {
        let token = match std::env::var(&self.token_var) {
            Ok(token) if !token.trim().is_empty() => token,
            Ok(_) | Err(std::env::VarError::NotPresent) => {
                return Err(ProviderError::NotFound {
                    provider: self.name().to_string(),
                    what: format!("${}", self.token_var),
                })
            }
            Err(std::env::VarError::NotUnicode(_)) => {
                return Err(self.invalid(format!("${} is not valid unicode", self.token_var)))
            }
        };
        let expires_at = match std::env::var(&self.expires_var) {
            Ok(raw) if !raw.trim().is_empty() => {
                let secs: i64 = raw.trim().parse().map_err(|_| {
                    self.invalid(format!("${} is not a unix timestamp: {raw}", self.expires_var))
                })?;
                let at = Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                    self.invalid(format!("${} is out of range: {raw}", self.expires_var))
                })?;
                Some(at)
            }
            _ => None,
        };
        hand_out(self.name(), &self.last, Credential::new(token, expires_at))
    }

    fn is_expired(&self) -> bool {
        self.last.is_expired()
    }
}

// ---------------------------------------------------------------------------
// Token file
// ---------------------------------------------------------------------------

/// Reads a YAML [`Credential`] document, `~/.ferry/token.yaml` by default.
pub struct FileProvider {
    path: PathBuf,
    last: LastExpiry,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: LastExpiry::default(),
        }
    }

    /// `<home>/.ferry/token.yaml`
    pub fn at_home(home: &Path) -> Self {
        Self::new(home.join(".ferry").join("token.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically write `credential` to the token file (mode `0600`).
    pub fn store(&self, credential: &Credential) -> Result<(), ProviderError> {
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
                set_mode(dir, 0o700)?;
            }
        }
        let tmp = self.path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(credential).map_err(|e| ProviderError::Invalid {
            provider: self.name().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        set_mode(&tmp, 0o600)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn retrieve(&self) -> Result<Credential, ProviderError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound {
                    provider: self.name().to_string(),
                    what: self.path.display().to_string(),
                })
            }
            Err(e) => return Err(io_err(&self.path, e)),
        };
        let credential: Credential =
            serde_yaml::from_str(&contents).map_err(|e| ProviderError::Invalid {
                provider: self.name().to_string(),
                reason: format!("failed to parse {}: {e}", self.path.display()),
            })?;
        if credential.token.trim().is_empty() {
            return Err(ProviderError::Invalid {
                provider: self.name().to_string(),
                reason: format!("{} holds an empty token", self.path.display()),
            });
        }
        hand_out(self.name(), &self.last, credential)
    }

    fn is_expired(&self) -> bool {
        self.last.is_expired()
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ProviderError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ProviderError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn static_provider_hands_out_its_token() {
        let provider = StaticProvider::new("abc", None);
        assert!(provider.is_expired(), "nothing retrieved yet");
        assert_eq!(provider.retrieve().unwrap().token, "abc");
        assert!(!provider.is_expired());
    }

    #[test]
    fn static_provider_refuses_expired_token() {
        let provider = StaticProvider::new("abc", Some(Utc::now() - Duration::seconds(5)));
        assert!(matches!(provider.retrieve(), Err(ProviderError::Expired { .. })));
    }

    #[test]
    fn env_provider_reads_token_and_expiry() {
        let provider = EnvProvider::with_vars("FERRY_TEST_TOKEN_A", "FERRY_TEST_EXPIRES_A");
        let expires = Utc::now().timestamp() + 600;
        std::env::set_var("FERRY_TEST_TOKEN_A", "from-env");
        std::env::set_var("FERRY_TEST_EXPIRES_A", expires.to_string());
        let cred = provider.retrieve().unwrap();
        assert_eq!(cred.token, "from-env");
        assert_eq!(cred.expires_at.map(|at| at.timestamp()), Some(expires));
    }

    #[test]
    fn env_provider_missing_variable_is_not_found() {
        let provider = EnvProvider::with_vars("FERRY_TEST_TOKEN_UNSET", "FERRY_TEST_EXPIRES_UNSET");
        let err = provider.retrieve().unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
        assert!(err.to_string().contains("FERRY_TEST_TOKEN_UNSET"));
    }

    #[test]
    fn env_provider_rejects_garbage_expiry() {
        let provider = EnvProvider::with_vars("FERRY_TEST_TOKEN_B", "FERRY_TEST_EXPIRES_B");
        std::env::set_var("FERRY_TEST_TOKEN_B", "t");
        std::env::set_var("FERRY_TEST_EXPIRES_B", "tomorrow");
        assert!(matches!(provider.retrieve(), Err(ProviderError::Invalid { .. })));
    }

    #[test]
    fn file_provider_store_then_retrieve() {
        let home = TempDir::new().unwrap();
        let provider = FileProvider::at_home(home.path());
        assert!(matches!(provider.retrieve(), Err(ProviderError::NotFound { .. })));

        let cred = Credential::new("from-file", Some(Utc::now() + Duration::hours(1)));
        provider.store(&cred).unwrap();
        let back = provider.retrieve().unwrap();
        assert_eq!(back.token, "from-file");
        assert!(!provider.is_expired());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(provider.path()).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn file_provider_malformed_document_is_invalid() {
        let home = TempDir::new().unwrap();
        let provider = FileProvider::at_home(home.path());
        std::fs::create_dir_all(home.path().join(".ferry")).unwrap();
        std::fs::write(provider.path(), "- not: a credential\n").unwrap();
        let err = provider.retrieve().unwrap_err();
        assert!(matches!(err, ProviderError::Invalid { .. }), "{err}");
    }
}
