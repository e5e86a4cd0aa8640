// All service modules
pub mod onchain;
pub mod preferences;
pub mod session;
pub mod wallet;

// Re-export for convenience
pub use onchain::{GameBackend, GameContract};
pub use preferences::PreferenceStore;
pub use session::SessionClient;
pub use wallet::{LocalWalletSession, WalletSession};
