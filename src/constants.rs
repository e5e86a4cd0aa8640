/// Application constants

// Board geometry (3x3, cells addressed 0..=8 row-major)
pub const BOARD_CELLS: usize = 9;

// Refresh cadence while a session is selected
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

// Persisted preference document
pub const PREFERENCE_KEY_CONTRACT_ADDRESS: &str = "contract_address";
pub const DEFAULT_PREFERENCES_PATH: &str = ".tictactoe/preferences.json";

// Unset player slot as reported by the contract
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// Default chain id (Ethereum mainnet) when CHAIN_ID is not set
pub const DEFAULT_CHAIN_ID: u64 = 1;
