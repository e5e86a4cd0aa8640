use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BOARD_CELLS;
use crate::error::{AppError, Result};

/// Mark owner for a board cell, the turn holder, and the winner slot.
/// Mirrors the contract's uint8 encoding (0 = none, 1 = player1, 2 = player2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Player {
    None,
    Player1,
    Player2,
}

impl Player {
    // Strict decode: an out-of-range discriminant means we are talking to the
    // wrong contract (or a wrong ABI), which must surface, not default.
    pub fn from_onchain(value: u8, field: &str) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Player1),
            2 => Ok(Self::Player2),
            other => Err(AppError::Transport(format!(
                "Invalid player discriminant {} for {} in contract response",
                other, field
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Player1 => 1,
            Self::Player2 => 2,
        }
    }
}

/// Remote session lifecycle as reported by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    Waiting,
    Active,
    Finished,
}

impl GameState {
    // Internal helper that supports `as_str` operations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Active => "ACTIVE",
            Self::Finished => "FINISHED",
        }
    }

    pub fn from_onchain(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Active),
            2 => Ok(Self::Finished),
            other => Err(AppError::Transport(format!(
                "Invalid game state discriminant {} in contract response",
                other
            ))),
        }
    }
}

/// Full snapshot of one remote game session.
///
/// Addresses are lowercase `0x…` hex; an unset `player2` is the zero address.
/// `fetched_at` is the local observation time, not remote data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub player1: String,
    pub player2: String,
    pub current_turn: Player,
    pub board: [Player; BOARD_CELLS],
    pub state: GameState,
    pub winner: Player,
    pub fetched_at: DateTime<Utc>,
}

impl Game {
    /// Decodes a raw `getGame` tuple, enforcing the snapshot invariants.
    pub fn from_onchain(
        player1: String,
        player2: String,
        current_turn: u8,
        board: [u8; BOARD_CELLS],
        state: u8,
        winner: u8,
    ) -> Result<Self> {
        let state = GameState::from_onchain(state)?;
        let current_turn = Player::from_onchain(current_turn, "current_turn")?;
        let winner = Player::from_onchain(winner, "winner")?;

        let mut cells = [Player::None; BOARD_CELLS];
        for (index, raw) in board.iter().enumerate() {
            cells[index] = Player::from_onchain(*raw, "board cell")?;
        }

        if state == GameState::Waiting && !is_zero_address(&player2) {
            return Err(AppError::Transport(
                "Inconsistent snapshot: waiting session already has player2".to_string(),
            ));
        }

        Ok(Game {
            player1,
            player2,
            current_turn,
            board: cells,
            state,
            winner,
            fetched_at: Utc::now(),
        })
    }

    pub fn has_opponent(&self) -> bool {
        !is_zero_address(&self.player2)
    }

    pub fn is_player1(&self, account: &str) -> bool {
        addr_eq(&self.player1, account)
    }

    pub fn is_player2(&self, account: &str) -> bool {
        self.has_opponent() && addr_eq(&self.player2, account)
    }

    pub fn is_participant(&self, account: &str) -> bool {
        self.is_player1(account) || self.is_player2(account)
    }

    /// False unless the session is ACTIVE and the turn mark matches `account`.
    pub fn is_my_turn(&self, account: &str) -> bool {
        if self.state != GameState::Active {
            return false;
        }
        match self.current_turn {
            Player::Player1 => self.is_player1(account),
            Player::Player2 => self.is_player2(account),
            Player::None => false,
        }
    }

    pub fn cell(&self, position: u8) -> Option<Player> {
        self.board.get(position as usize).copied()
    }

    pub fn is_cell_open(&self, position: u8) -> bool {
        self.cell(position) == Some(Player::None)
    }

    /// Derived status for `account`'s point of view.
    pub fn outcome_for(&self, account: &str) -> GameOutcome {
        if !self.is_participant(account) {
            return GameOutcome::Observer;
        }
        match self.state {
            GameState::Waiting => GameOutcome::WaitingForOpponent,
            GameState::Active => {
                if self.is_my_turn(account) {
                    GameOutcome::YourTurn
                } else {
                    GameOutcome::OpponentTurn
                }
            }
            GameState::Finished => match self.winner {
                Player::None => GameOutcome::Draw,
                Player::Player1 if self.is_player1(account) => GameOutcome::Won,
                Player::Player2 if self.is_player2(account) => GameOutcome::Won,
                _ => GameOutcome::Lost,
            },
        }
    }
}

/// What the current snapshot means for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    WaitingForOpponent,
    YourTurn,
    OpponentTurn,
    Draw,
    Won,
    Lost,
    Observer,
}

// Internal helper that supports `addr_eq` operations.
pub fn addr_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// Internal helper that checks conditions for `is_zero_address`.
pub fn is_zero_address(value: &str) -> bool {
    let hex = value.trim().trim_start_matches("0x");
    !hex.is_empty() && hex.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const ZERO: &str = "0x0000000000000000000000000000000000000000";

    fn make_game(state: GameState, turn: Player, winner: Player) -> Game {
        Game {
            player1: ALICE.to_string(),
            player2: if state == GameState::Waiting {
                ZERO.to_string()
            } else {
                BOB.to_string()
            },
            current_turn: turn,
            board: [Player::None; BOARD_CELLS],
            state,
            winner,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn is_my_turn_false_for_any_inactive_state() {
        for state in [GameState::Waiting, GameState::Finished] {
            for turn in [Player::None, Player::Player1, Player::Player2] {
                let game = make_game(state, turn, Player::None);
                assert!(!game.is_my_turn(ALICE));
                assert!(!game.is_my_turn(BOB));
            }
        }
    }

    #[test]
    fn is_my_turn_matches_turn_holder_only() {
        let game = make_game(GameState::Active, Player::Player1, Player::None);
        assert!(game.is_my_turn(ALICE));
        assert!(!game.is_my_turn(BOB));

        let game = make_game(GameState::Active, Player::Player2, Player::None);
        assert!(game.is_my_turn(BOB));
        assert!(!game.is_my_turn(ALICE));
    }

    #[test]
    fn identity_comparison_is_case_insensitive() {
        // Memastikan perbandingan alamat tidak peka huruf besar/kecil
        let game = make_game(GameState::Active, Player::Player1, Player::None);
        assert!(game.is_player1(&ALICE.to_uppercase().replace("0X", "0x")));
        assert!(game.is_my_turn(&ALICE.to_uppercase().replace("0X", "0x")));
    }

    #[test]
    fn waiting_session_has_no_player2() {
        let game = make_game(GameState::Waiting, Player::None, Player::None);
        assert!(!game.has_opponent());
        assert!(!game.is_player2(ZERO));
    }

    #[test]
    fn outcome_covers_all_finishes() {
        let won = make_game(GameState::Finished, Player::None, Player::Player1);
        assert_eq!(won.outcome_for(ALICE), GameOutcome::Won);
        assert_eq!(won.outcome_for(BOB), GameOutcome::Lost);

        let draw = make_game(GameState::Finished, Player::None, Player::None);
        assert_eq!(draw.outcome_for(ALICE), GameOutcome::Draw);
        assert_eq!(draw.outcome_for(BOB), GameOutcome::Draw);

        let waiting = make_game(GameState::Waiting, Player::None, Player::None);
        assert_eq!(waiting.outcome_for(ALICE), GameOutcome::WaitingForOpponent);

        let active = make_game(GameState::Active, Player::Player2, Player::None);
        assert_eq!(active.outcome_for(ALICE), GameOutcome::OpponentTurn);
        assert_eq!(active.outcome_for(BOB), GameOutcome::YourTurn);

        let stranger = "0xcccccccccccccccccccccccccccccccccccccccc";
        assert_eq!(active.outcome_for(stranger), GameOutcome::Observer);
    }

    #[test]
    fn from_onchain_rejects_out_of_range_discriminants() {
        let result = Game::from_onchain(
            ALICE.to_string(),
            BOB.to_string(),
            7,
            [0; BOARD_CELLS],
            1,
            0,
        );
        assert!(matches!(result, Err(AppError::Transport(_))));

        let result = Game::from_onchain(
            ALICE.to_string(),
            BOB.to_string(),
            1,
            [0; BOARD_CELLS],
            9,
            0,
        );
        assert!(matches!(result, Err(AppError::Transport(_))));
    }

    #[test]
    fn from_onchain_rejects_waiting_with_player2_set() {
        let result = Game::from_onchain(
            ALICE.to_string(),
            BOB.to_string(),
            0,
            [0; BOARD_CELLS],
            0,
            0,
        );
        assert!(matches!(result, Err(AppError::Transport(_))));
    }

    #[test]
    fn test_zero_address_detection() {
        assert!(is_zero_address(ZERO));
        assert!(is_zero_address("0x0"));
        assert!(!is_zero_address(ALICE));
        assert!(!is_zero_address(""));
    }
}
