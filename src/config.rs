use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_CHAIN_ID, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PREFERENCES_PATH};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Blockchain
    pub ethereum_rpc_url: String,
    pub chain_id: u64,

    // Local signer (absent = wallet unavailable, read-only operation impossible too)
    pub player_private_key: Option<String>,

    // Contract address override; the persisted preference is used when unset
    pub contract_address: Option<String>,

    // Session refresh
    pub poll_interval_secs: u64,

    // Persisted preference document
    pub preferences_path: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            ethereum_rpc_url: env::var("ETHEREUM_RPC_URL")?,
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| DEFAULT_CHAIN_ID.to_string())
                .parse()?,

            player_private_key: env::var("PLAYER_PRIVATE_KEY").ok(),
            contract_address: env::var("TICTACTOE_CONTRACT_ADDRESS").ok(),

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_SECS.to_string())
                .parse()?,

            preferences_path: env::var("PREFERENCES_PATH")
                .unwrap_or_else(|_| DEFAULT_PREFERENCES_PATH.to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ethereum_rpc_url.trim().is_empty() {
            anyhow::bail!("ETHEREUM_RPC_URL is empty");
        }
        if url::Url::parse(&self.ethereum_rpc_url).is_err() {
            anyhow::bail!("ETHEREUM_RPC_URL is not a valid URL");
        }

        if let Some(address) = &self.contract_address {
            if !crate::services::onchain::is_valid_contract_address(address) {
                anyhow::bail!(
                    "TICTACTOE_CONTRACT_ADDRESS is malformed (expected 0x + 40 hex digits)"
                );
            }
            if address.starts_with("0x0000") {
                tracing::warn!("Using placeholder TicTacToe contract address");
            }
        }

        if self.player_private_key.is_none() {
            tracing::warn!("PLAYER_PRIVATE_KEY is not set; no signer will be available");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be > 0");
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
