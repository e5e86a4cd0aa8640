//! Contract-facing client for an on-chain Tic-Tac-Toe game.
//!
//! The crate maintains a local projection of a remote game session, mediates
//! turn-taking and move submission against the contract, polls for
//! convergence while a session is selected, and classifies failures from the
//! chain layer. The smart contract stays the sole authority on game rules;
//! everything here is best-effort client state.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Game, GameOutcome, GameState, Player};
pub use services::onchain::{is_valid_contract_address, GameBackend, GameContract};
pub use services::preferences::{resolve_contract_address, PreferenceStore};
pub use services::session::{
    ClientPhase, SessionAction, SessionClient, SessionPhase, SessionView,
};
pub use services::wallet::{LocalWalletSession, WalletSession};
