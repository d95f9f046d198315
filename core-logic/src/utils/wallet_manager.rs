use crate::error::ConfigError;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One signing secret from the account list. Wiped on drop, never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccountSecret(String);

impl AccountSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountSecret")
            .field(&"***REDACTED***")
            .finish()
    }
}

pub struct WalletManager;

impl WalletManager {
    /// Reads one secret per line, in file order. Blank and `#` lines are ignored.
    ///
    /// A missing or empty file is a startup error.
    pub fn load_secrets(path: impl AsRef<Path>) -> Result<Vec<AccountSecret>, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        if !path.exists() {
            return Err(ConfigError::FileNotFound { path: shown });
        }

        let mut content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: shown.clone(),
            msg: e.to_string(),
        })?;

        let secrets: Vec<AccountSecret> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(AccountSecret::new)
            .collect();
        content.zeroize();

        if secrets.is_empty() {
            return Err(ConfigError::EmptyAccountList { path: shown });
        }

        info!("Loaded {} account secrets from {}", secrets.len(), shown);
        Ok(secrets)
    }
}
