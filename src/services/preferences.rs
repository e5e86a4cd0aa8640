use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::constants::PREFERENCE_KEY_CONTRACT_ADDRESS;
use crate::error::{AppError, Result};
use crate::services::onchain::is_valid_contract_address;

/// Persisted preference document holding the user's chosen contract address
/// under a fixed key. Read once at startup, rewritten on save, and emptied on
/// explicit reset; nothing else reaches into it.
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.preferences_path.clone())
    }

    /// Stored contract address, if present and still well-formed. A malformed
    /// document or value is discarded with a warning, never an error: a bad
    /// preference must not block startup.
    pub fn load(&self) -> Option<String> {
        let document = self.read_document()?;
        let value = document
            .get(PREFERENCE_KEY_CONTRACT_ADDRESS)?
            .as_str()?
            .to_string();
        if !is_valid_contract_address(&value) {
            tracing::warn!(
                "Discarding malformed stored contract address {:?} from {}",
                value,
                self.path.display()
            );
            return None;
        }
        Some(value)
    }

    pub fn save(&self, address: &str) -> Result<()> {
        let address = address.trim();
        if !is_valid_contract_address(address) {
            return Err(AppError::Configuration(format!(
                "Refusing to store malformed contract address {:?}",
                address
            )));
        }

        let mut document = self.read_document().unwrap_or_default();
        document.insert(
            PREFERENCE_KEY_CONTRACT_ADDRESS.to_string(),
            Value::String(address.to_string()),
        );
        self.write_document(&document)
    }

    /// Explicit reset: removes the key, keeps the document.
    pub fn clear(&self) -> Result<()> {
        let Some(mut document) = self.read_document() else {
            return Ok(());
        };
        document.remove(PREFERENCE_KEY_CONTRACT_ADDRESS);
        self.write_document(&document)
    }

    // Internal helper that supports `read_document` operations.
    fn read_document(&self) -> Option<Map<String, Value>> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) | Err(_) => {
                tracing::warn!(
                    "Discarding malformed preference file {}",
                    self.path.display()
                );
                None
            }
        }
    }

    // Internal helper that supports `write_document` operations.
    fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::Configuration(format!(
                        "Failed to create preference directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let raw = serde_json::to_string_pretty(&Value::Object(document.clone()))
            .map_err(|e| AppError::Configuration(format!("Failed to encode preferences: {}", e)))?;
        fs::write(&self.path, raw).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to write preference file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// Effective contract address: the environment override wins, then the stored
/// preference. `None` blocks remote operations until the user supplies one.
pub fn resolve_contract_address(config: &Config, store: &PreferenceStore) -> Option<String> {
    if let Some(address) = config.contract_address.as_deref() {
        if is_valid_contract_address(address) {
            return Some(address.to_string());
        }
        tracing::warn!("Ignoring malformed TICTACTOE_CONTRACT_ADDRESS override");
    }
    store.load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_PREFERENCES_PATH;

    const ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";

    fn temp_store(tag: &str) -> PreferenceStore {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "tictactoe-prefs-{}-{}.json",
            std::process::id(),
            tag
        ));
        let _ = fs::remove_file(&path);
        PreferenceStore::new(path)
    }

    fn config_with_override(address: Option<&str>) -> Config {
        Config {
            ethereum_rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            player_private_key: None,
            contract_address: address.map(str::to_string),
            poll_interval_secs: 5,
            preferences_path: DEFAULT_PREFERENCES_PATH.to_string(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = temp_store("round-trip");
        store.save(ADDRESS).unwrap();
        assert_eq!(store.load().as_deref(), Some(ADDRESS));
    }

    #[test]
    fn clear_removes_the_stored_address() {
        let store = temp_store("clear");
        store.save(ADDRESS).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_file_loads_nothing() {
        let store = temp_store("missing");
        assert!(store.load().is_none());
    }

    #[test]
    fn malformed_file_is_tolerated() {
        // Memastikan file preferensi rusak tidak menghentikan startup
        let store = temp_store("malformed");
        fs::write(&store.path, "not json at all").unwrap();
        assert!(store.load().is_none());

        fs::write(&store.path, "[1, 2, 3]").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_rejects_malformed_address() {
        let store = temp_store("reject");
        assert!(matches!(
            store.save("0x123"),
            Err(AppError::Configuration(_))
        ));
        assert!(store.load().is_none());
    }

    #[test]
    fn env_override_wins_over_stored_preference() {
        let store = temp_store("override");
        store
            .save("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .unwrap();

        let config = config_with_override(Some(ADDRESS));
        assert_eq!(
            resolve_contract_address(&config, &store).as_deref(),
            Some(ADDRESS)
        );

        let config = config_with_override(None);
        assert_eq!(
            resolve_contract_address(&config, &store).as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }
}
