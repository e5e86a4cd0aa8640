use ethers::signers::{LocalWallet, Signer};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Account/signing collaborator. The end user may switch or remove the
/// underlying account at any time, so callers must re-read it around every
/// remote operation instead of caching it once.
pub trait WalletSession: Send + Sync {
    /// Currently connected account (lowercase 0x hex), or `None` when no
    /// signer is available.
    fn account(&self) -> Option<String>;
}

/// Signer built from a configured private key. Its account never changes;
/// browser-wallet style providers implement [`WalletSession`] themselves.
pub struct LocalWalletSession {
    wallet: LocalWallet,
}

impl LocalWalletSession {
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(key) = config.player_private_key.as_deref() else {
            return Ok(None);
        };
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| AppError::Configuration(format!("Invalid PLAYER_PRIVATE_KEY: {}", e)))?;
        Ok(Some(Self { wallet }))
    }

    pub fn address(&self) -> String {
        format!("{:#x}", self.wallet.address())
    }

    pub fn signer(&self) -> LocalWallet {
        self.wallet.clone()
    }
}

impl WalletSession for LocalWalletSession {
    fn account(&self) -> Option<String> {
        Some(self.address())
    }
}
