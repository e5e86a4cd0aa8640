use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::RawLog;
use ethers::contract::EthLogDecode;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Log, TransactionReceipt, U256, U64};

use crate::config::Config;
use crate::constants::BOARD_CELLS;
use crate::error::{AppError, Result};
use crate::models::{is_zero_address, Game};

ethers::contract::abigen!(
    TicTacToe,
    r#"[
        function createGame() external returns (uint256)
        function joinGame(uint256 gameId) external
        function makeMove(uint256 gameId, uint8 position) external
        function getGame(uint256 gameId) external view returns (address player1, address player2, uint8 currentTurn, uint8[9] board, uint8 state, uint8 winner)
        function games(uint256 gameId) external view returns (address player1, address player2, uint8 currentTurn, uint8[9] board, uint8 state, uint8 winner)
        function gameCount() external view returns (uint256)
        event GameCreated(uint256 gameId, address player1)
        event GameJoined(uint256 gameId, address player2)
        event MoveMade(uint256 gameId, address player, uint8 position)
        event GameWon(uint256 gameId, address winner)
        event GameDrawn(uint256 gameId)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

// Markers that distinguish a remote refusal from a transport failure. The
// node embeds these in the error text; anything else is treated as retryable
// transport trouble.
const REMOTE_REVERT_MARKERS: [&str; 5] = [
    "execution reverted",
    "revert",
    "call exception",
    "vm exception",
    "invalid opcode",
];

/// Remote ledger operations the session client depends on. The contract
/// wrapper below is the production implementation; tests swap in an
/// in-memory fake.
#[async_trait]
pub trait GameBackend: Send + Sync {
    async fn create_game(&self) -> Result<u64>;
    async fn join_game(&self, game_id: u64) -> Result<()>;
    async fn make_move(&self, game_id: u64, position: u8) -> Result<()>;
    async fn get_game(&self, game_id: u64) -> Result<Game>;
    async fn game_count(&self) -> Result<u64>;
}

/// Ethers-backed wrapper around the deployed TicTacToe contract.
pub struct GameContract {
    contract: TicTacToe<SignerClient>,
    address: Address,
    account: String,
}

impl GameContract {
    pub fn connect(config: &Config, contract_address: &str, signer: LocalWallet) -> Result<Self> {
        if !is_valid_contract_address(contract_address) {
            return Err(AppError::Configuration(format!(
                "Contract address {} is malformed (expected 0x + 40 hex digits)",
                contract_address
            )));
        }

        let provider = Provider::<Http>::try_from(config.ethereum_rpc_url.as_str())
            .map_err(|e| AppError::Configuration(format!("Invalid EVM RPC URL: {}", e)))?;
        let signer = signer.with_chain_id(config.chain_id);
        let account = format!("{:#x}", signer.address());

        let address = Address::from_str(contract_address)
            .map_err(|_| AppError::Configuration("Invalid contract address".to_string()))?;
        let client = Arc::new(SignerMiddleware::new(provider, signer));

        Ok(Self {
            contract: TicTacToe::new(address, client),
            address,
            account,
        })
    }

    /// Account the wrapper signs with (lowercase 0x hex).
    pub fn account(&self) -> &str {
        &self.account
    }
}

#[async_trait]
impl GameBackend for GameContract {
    /// Creates a session on chain and recovers its remote-assigned id.
    ///
    /// # Returns
    /// * `Ok(game_id)` once the transaction is final and the `GameCreated`
    ///   event has been decoded from the receipt.
    /// * `Err(AppError::EventMissing)` when the receipt confirmed but carries
    ///   no creation event (never a silently invalid id).
    async fn create_game(&self) -> Result<u64> {
        let call = self.contract.create_game();
        let pending = call
            .send()
            .await
            .map_err(|e| classify_remote_error("createGame", e))?;
        let receipt = pending
            .await
            .map_err(|e| classify_remote_error("createGame", e))?
            .ok_or_else(|| {
                AppError::Transport("createGame transaction dropped before inclusion".to_string())
            })?;
        ensure_receipt_success("createGame", &receipt)?;

        let game_id = extract_game_created(&receipt.logs, self.address)?;
        tracing::info!(
            "createGame confirmed in block {:?}: game_id={}",
            receipt.block_number,
            game_id
        );
        Ok(game_id)
    }

    async fn join_game(&self, game_id: u64) -> Result<()> {
        let call = self.contract.join_game(U256::from(game_id));
        let pending = call
            .send()
            .await
            .map_err(|e| classify_remote_error("joinGame", e))?;
        let receipt = pending
            .await
            .map_err(|e| classify_remote_error("joinGame", e))?
            .ok_or_else(|| {
                AppError::Transport("joinGame transaction dropped before inclusion".to_string())
            })?;
        ensure_receipt_success("joinGame", &receipt)?;
        log_session_events(&receipt.logs, self.address);
        Ok(())
    }

    async fn make_move(&self, game_id: u64, position: u8) -> Result<()> {
        if (position as usize) >= BOARD_CELLS {
            return Err(AppError::Precondition(format!(
                "Cell position {} out of range",
                position
            )));
        }

        let call = self.contract.make_move(U256::from(game_id), position);
        let pending = call
            .send()
            .await
            .map_err(|e| classify_remote_error("makeMove", e))?;
        let receipt = pending
            .await
            .map_err(|e| classify_remote_error("makeMove", e))?
            .ok_or_else(|| {
                AppError::Transport("makeMove transaction dropped before inclusion".to_string())
            })?;
        ensure_receipt_success("makeMove", &receipt)?;
        log_session_events(&receipt.logs, self.address);
        Ok(())
    }

    /// Read-only snapshot fetch. Never mutates remote state.
    async fn get_game(&self, game_id: u64) -> Result<Game> {
        let (player1, player2, current_turn, board, state, winner) = self
            .contract
            .get_game(U256::from(game_id))
            .call()
            .await
            .map_err(|e| classify_remote_error("getGame", e))?;

        // The games mapping returns a zeroed struct for ids the contract has
        // never assigned; a zero player1 therefore means "no such session".
        let player1 = format!("{:#x}", player1);
        if is_zero_address(&player1) {
            return Err(AppError::NotFound(game_id));
        }

        Game::from_onchain(
            player1,
            format!("{:#x}", player2),
            current_turn,
            board,
            state,
            winner,
        )
    }

    async fn game_count(&self) -> Result<u64> {
        let count = self
            .contract
            .game_count()
            .call()
            .await
            .map_err(|e| classify_remote_error("gameCount", e))?;
        u256_to_u64(count, "gameCount")
    }
}

// Internal helper that parses or transforms values for `u256_to_u64`.
fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(AppError::Transport(format!(
            "{} out of u64 range in contract response",
            field
        )));
    }
    Ok(value.as_u64())
}

/// Syntactic check only: 0x-prefixed 40-hex-digit identifier. Says nothing
/// about whether the address hosts a deployed TicTacToe contract.
pub fn is_valid_contract_address(value: &str) -> bool {
    let trimmed = value.trim();
    let Some(hex_part) = trimmed.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 40 && hex::decode(hex_part).is_ok()
}

// Internal helper that parses or transforms values for `classify_remote_error`.
fn classify_remote_error(action: &str, error: impl std::fmt::Display) -> AppError {
    let text = error.to_string();
    let lower = text.to_ascii_lowercase();
    if REMOTE_REVERT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
    {
        AppError::RemoteRejected(format!("{}: {}", action, text))
    } else {
        AppError::Transport(format!("{}: {}", action, text))
    }
}

// Internal helper that checks conditions for `ensure_receipt_success`.
fn ensure_receipt_success(action: &str, receipt: &TransactionReceipt) -> Result<()> {
    if receipt.status == Some(U64::zero()) {
        return Err(AppError::RemoteRejected(format!(
            "{} reverted on chain (tx {:#x})",
            action, receipt.transaction_hash
        )));
    }
    Ok(())
}

// Internal helper that supports `extract_game_created` operations.
fn extract_game_created(logs: &[Log], contract: Address) -> Result<u64> {
    for log in logs.iter().filter(|log| log.address == contract) {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        if let Ok(event) = GameCreatedFilter::decode_log(&raw) {
            return u256_to_u64(event.game_id, "GameCreated game_id");
        }
    }
    Err(AppError::EventMissing("GameCreated"))
}

// Internal helper that supports `log_session_events` operations.
fn log_session_events(logs: &[Log], contract: Address) {
    for log in logs.iter().filter(|log| log.address == contract) {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        if let Ok(event) = GameJoinedFilter::decode_log(&raw) {
            tracing::info!("GameJoined: game_id={}", event.game_id);
        } else if let Ok(event) = MoveMadeFilter::decode_log(&raw) {
            tracing::info!(
                "MoveMade: game_id={} position={}",
                event.game_id,
                event.position
            );
        } else if let Ok(event) = GameWonFilter::decode_log(&raw) {
            tracing::info!("GameWon: game_id={}", event.game_id);
        } else if let Ok(event) = GameDrawnFilter::decode_log(&raw) {
            tracing::info!("GameDrawn: game_id={}", event.game_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::contract::EthEvent;

    #[test]
    fn test_valid_contract_address() {
        assert!(is_valid_contract_address(
            "0x1234567890abcdef1234567890abcdef12345678"
        ));
        // Uppercase hex digits are acceptable
        assert!(is_valid_contract_address(
            "0x1234567890ABCDEF1234567890ABCDEF12345678"
        ));
    }

    #[test]
    fn address_validation_rejects_everything_else() {
        // Memastikan hanya format 0x + 40 digit hex yang diterima
        assert!(!is_valid_contract_address("0x123"));
        assert!(!is_valid_contract_address(""));
        assert!(!is_valid_contract_address(
            "1234567890abcdef1234567890abcdef12345678"
        ));
        assert!(!is_valid_contract_address(
            "0x1234567890abcdef1234567890abcdef1234567"
        ));
        assert!(!is_valid_contract_address(
            "0x1234567890abcdef1234567890abcdef123456789"
        ));
        assert!(!is_valid_contract_address(
            "0xzzzz567890abcdef1234567890abcdef12345678"
        ));
    }

    #[test]
    fn revert_errors_classify_as_remote_rejected() {
        let error = classify_remote_error("makeMove", "execution reverted: Not your turn");
        assert!(matches!(error, AppError::RemoteRejected(_)));

        let error = classify_remote_error("joinGame", "VM Exception while processing transaction");
        assert!(matches!(error, AppError::RemoteRejected(_)));
    }

    #[test]
    fn transport_errors_stay_transport() {
        let error = classify_remote_error("getGame", "connection timed out");
        assert!(matches!(error, AppError::Transport(_)));

        let error = classify_remote_error("getGame", "error decoding response body");
        assert!(matches!(error, AppError::Transport(_)));
    }

    #[test]
    fn receipt_status_zero_is_a_rejection() {
        let receipt = TransactionReceipt {
            status: Some(U64::zero()),
            ..Default::default()
        };
        assert!(matches!(
            ensure_receipt_success("createGame", &receipt),
            Err(AppError::RemoteRejected(_))
        ));

        let receipt = TransactionReceipt {
            status: Some(U64::one()),
            ..Default::default()
        };
        assert!(ensure_receipt_success("createGame", &receipt).is_ok());
    }

    fn game_created_log(contract: Address, game_id: u64) -> Log {
        Log {
            address: contract,
            topics: vec![GameCreatedFilter::signature()],
            data: encode(&[
                Token::Uint(U256::from(game_id)),
                Token::Address(Address::zero()),
            ])
            .into(),
            ..Default::default()
        }
    }

    #[test]
    fn game_created_event_is_extracted_from_receipt_logs() {
        let contract = Address::from_low_u64_be(0x1001);
        let logs = vec![game_created_log(contract, 42)];
        assert_eq!(extract_game_created(&logs, contract).unwrap(), 42);
    }

    #[test]
    fn missing_creation_event_is_a_first_class_error() {
        let contract = Address::from_low_u64_be(0x1001);
        assert!(matches!(
            extract_game_created(&[], contract),
            Err(AppError::EventMissing("GameCreated"))
        ));

        // Event dari kontrak lain tidak boleh dihitung
        let other = Address::from_low_u64_be(0x2002);
        let logs = vec![game_created_log(other, 42)];
        assert!(matches!(
            extract_game_created(&logs, contract),
            Err(AppError::EventMissing("GameCreated"))
        ));
    }
}
