use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::constants::BOARD_CELLS;
use crate::error::{AppError, Result};
use crate::models::{addr_eq, Game, GameOutcome, GameState};
use crate::services::onchain::GameBackend;
use crate::services::wallet::WalletSession;

/// Sub-state while a session is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Loading,
    Ready,
    Moving,
    Error,
}

/// View-level state machine. This is the client's own lifecycle, not the
/// contract's: a FINISHED session still leaves the client in `Selected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientPhase {
    Disconnected,
    Unselected,
    Selected(SessionPhase),
}

impl ClientPhase {
    // Internal helper that supports `as_str` operations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Unselected => "UNSELECTED",
            Self::Selected(SessionPhase::Loading) => "SELECTED_LOADING",
            Self::Selected(SessionPhase::Ready) => "SELECTED_READY",
            Self::Selected(SessionPhase::Moving) => "SELECTED_MOVING",
            Self::Selected(SessionPhase::Error) => "SELECTED_ERROR",
        }
    }
}

/// Actions with independent, dismissible error slots: one failing action must
/// not block or overwrite the notices of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Create,
    Join,
    Submit,
    Fetch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub kind: &'static str,
    pub message: String,
}

impl ErrorNotice {
    fn from_error(error: &AppError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionErrors {
    pub create: Option<ErrorNotice>,
    pub join: Option<ErrorNotice>,
    pub submit: Option<ErrorNotice>,
    pub fetch: Option<ErrorNotice>,
}

impl ActionErrors {
    fn set(&mut self, action: SessionAction, notice: Option<ErrorNotice>) {
        match action {
            SessionAction::Create => self.create = notice,
            SessionAction::Join => self.join = notice,
            SessionAction::Submit => self.submit = notice,
            SessionAction::Fetch => self.fetch = notice,
        }
    }
}

/// Serializable snapshot of the client for a presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub phase: ClientPhase,
    pub session_id: Option<u64>,
    pub game: Option<Game>,
    pub outcome: Option<GameOutcome>,
    pub errors: ActionErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// Wait for any in-flight fetch to finish, then fetch. Used by the
    /// mandatory post-write refresh and manual refresh.
    Queue,
    /// Drop the tick if a fetch is already running. Used by the poll loop.
    SkipIfBusy,
}

struct SessionState {
    phase: ClientPhase,
    account: Option<String>,
    selected: Option<u64>,
    game: Option<Game>,
    errors: ActionErrors,
    poll_task: Option<JoinHandle<()>>,
}

struct SessionInner {
    backend: Arc<dyn GameBackend>,
    wallet: Arc<dyn WalletSession>,
    poll_interval: Duration,
    // Bumped on every select/leave/disconnect; completions compare it before
    // applying results so late responses for a previous selection are dropped.
    epoch: AtomicU64,
    // One permit: at most one in-flight mutating call per session.
    mutation_slot: Semaphore,
    // Read fetches are never issued concurrently against the same session.
    fetch_gate: Mutex<()>,
    state: RwLock<SessionState>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().poll_task.take() {
            task.abort();
        }
    }
}

/// Local projection of one remote game session and the sole mediator of
/// reads/writes against it. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<SessionInner>,
}

impl SessionClient {
    pub fn new(
        backend: Arc<dyn GameBackend>,
        wallet: Arc<dyn WalletSession>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                wallet,
                poll_interval,
                epoch: AtomicU64::new(0),
                mutation_slot: Semaphore::new(1),
                fetch_gate: Mutex::new(()),
                state: RwLock::new(SessionState {
                    phase: ClientPhase::Disconnected,
                    account: None,
                    selected: None,
                    game: None,
                    errors: ActionErrors::default(),
                    poll_task: None,
                }),
            }),
        }
    }

    /// Moves the client out of `Disconnected` once an account is available.
    pub async fn connect(&self) -> Result<String> {
        let Some(account) = self.inner.wallet.account() else {
            return Err(AppError::ConnectionUnavailable(
                "No account/signing provider is connected".to_string(),
            ));
        };
        let mut state = self.inner.state.write().await;
        if matches!(state.phase, ClientPhase::Disconnected) {
            state.phase = ClientPhase::Unselected;
        }
        state.account = Some(account.clone());
        tracing::info!("Connected as {}", account);
        Ok(account)
    }

    pub async fn disconnect(&self) {
        self.reset_to_disconnected("explicit disconnect").await;
    }

    /// Creates a remote session and selects the id the ledger assigned.
    ///
    /// # Returns
    /// * `Ok(session_id)` once creation is final; the session is selected and
    ///   the refresh loop is running.
    /// * `Err(AppError)` with the failure recorded in the `create` slot; the
    ///   client stays in `Unselected`.
    pub async fn create_session(&self) -> Result<u64> {
        self.ensure_wallet().await?;
        self.ensure_unselected("create a session").await?;
        self.set_action_error(SessionAction::Create, None).await;

        let created = {
            let _permit = self.mutation_permit()?;
            self.inner.backend.create_game().await
        };
        let session_id = match created {
            Ok(session_id) => session_id,
            Err(error) => {
                self.record_action_error(SessionAction::Create, &error).await;
                return Err(error);
            }
        };

        // The account may have changed while the transaction confirmed.
        self.ensure_wallet().await?;
        self.enter_session(session_id).await;
        Ok(session_id)
    }

    pub async fn join_session(&self, session_id: u64) -> Result<()> {
        self.ensure_wallet().await?;
        self.ensure_unselected("join a session").await?;
        self.set_action_error(SessionAction::Join, None).await;

        let joined = {
            let _permit = self.mutation_permit()?;
            self.inner.backend.join_game(session_id).await
        };
        if let Err(error) = joined {
            self.record_action_error(SessionAction::Join, &error).await;
            return Err(error);
        }

        self.ensure_wallet().await?;
        self.enter_session(session_id).await;
        Ok(())
    }

    /// Selects an existing session without touching remote state.
    pub async fn select_session(&self, session_id: u64) -> Result<()> {
        self.ensure_wallet().await?;
        self.ensure_unselected("select a session").await?;
        self.enter_session(session_id).await;
        Ok(())
    }

    /// Deselects the current session. The poll task is cancelled on every
    /// exit path; late fetch results are discarded via the epoch guard.
    pub async fn leave_session(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.state.write().await;
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        if let Some(session_id) = state.selected.take() {
            tracing::info!("Left session {}", session_id);
        }
        state.game = None;
        state.errors.submit = None;
        state.errors.fetch = None;
        if !matches!(state.phase, ClientPhase::Disconnected) {
            state.phase = ClientPhase::Unselected;
        }
    }

    /// Submits a move for the selected session.
    ///
    /// Preconditions are checked locally first (position in range, cell open,
    /// our turn, session active, nothing else pending) so an obviously doomed
    /// call never reaches the ledger; the contract remains the final arbiter.
    /// Exactly one snapshot refresh follows the attempt, success or failure.
    pub async fn submit_move(&self, position: u8) -> Result<()> {
        let account = self.ensure_wallet().await?;

        let (epoch, session_id) = {
            let state = self.inner.state.read().await;
            let ClientPhase::Selected(phase) = state.phase else {
                return Err(AppError::Precondition("No session selected".to_string()));
            };
            if phase == SessionPhase::Moving {
                return Err(AppError::Precondition("A move is already pending".to_string()));
            }
            let session_id = state
                .selected
                .ok_or_else(|| AppError::Precondition("No session selected".to_string()))?;
            if (position as usize) >= BOARD_CELLS {
                return Err(AppError::Precondition(format!(
                    "Cell position {} out of range",
                    position
                )));
            }
            let game = state.game.as_ref().ok_or_else(|| {
                AppError::Precondition("Session snapshot not loaded yet".to_string())
            })?;
            if game.state != GameState::Active {
                return Err(AppError::Precondition(format!(
                    "Session is {}, not ACTIVE",
                    game.state.as_str()
                )));
            }
            if !game.is_my_turn(&account) {
                return Err(AppError::Precondition("Not your turn".to_string()));
            }
            if !game.is_cell_open(position) {
                return Err(AppError::Precondition(format!(
                    "Cell {} is already marked",
                    position
                )));
            }
            (self.inner.epoch.load(Ordering::SeqCst), session_id)
        };

        let result = {
            let _permit = self.mutation_permit()?;
            self.set_phase_if_current(epoch, ClientPhase::Selected(SessionPhase::Moving))
                .await;
            self.set_action_error(SessionAction::Submit, None).await;

            let result = self.inner.backend.make_move(session_id, position).await;

            // moving -> ready on completion, success or failure
            self.set_phase_if_current(epoch, ClientPhase::Selected(SessionPhase::Ready))
                .await;
            result
        };

        if let Err(error) = &result {
            self.record_action_error_if_current(epoch, SessionAction::Submit, error)
                .await;
        }

        // No assumption that the optimistic move matches the mined outcome:
        // always re-fetch, queued behind any in-flight poll fetch.
        self.fetch_snapshot(epoch, session_id, FetchMode::Queue).await;

        result
    }

    /// Manual refresh of the selected session's snapshot.
    pub async fn refresh(&self) -> Result<()> {
        self.ensure_wallet().await?;
        let (epoch, session_id) = {
            let state = self.inner.state.read().await;
            let Some(session_id) = state.selected else {
                return Err(AppError::Precondition("No session selected".to_string()));
            };
            (self.inner.epoch.load(Ordering::SeqCst), session_id)
        };
        self.fetch_snapshot(epoch, session_id, FetchMode::Queue).await;
        Ok(())
    }

    pub async fn dismiss_error(&self, action: SessionAction) {
        self.set_action_error(action, None).await;
    }

    pub async fn view(&self) -> SessionView {
        let state = self.inner.state.read().await;
        let outcome = match (&state.game, &state.account) {
            (Some(game), Some(account)) => Some(game.outcome_for(account)),
            _ => None,
        };
        SessionView {
            phase: state.phase,
            session_id: state.selected,
            game: state.game.clone(),
            outcome,
            errors: state.errors.clone(),
        }
    }

    pub async fn is_my_turn(&self) -> bool {
        let state = self.inner.state.read().await;
        match (&state.game, &state.account) {
            (Some(game), Some(account)) => game.is_my_turn(account),
            _ => false,
        }
    }

    // Every operation tolerates the wallet changing underneath it: a missing
    // or switched account resets the client instead of applying results.
    async fn ensure_wallet(&self) -> Result<String> {
        let live = self.inner.wallet.account();
        let connected = { self.inner.state.read().await.account.clone() };
        match (connected, live) {
            (Some(connected), Some(live)) if addr_eq(&connected, &live) => Ok(connected),
            (None, _) => Err(AppError::ConnectionUnavailable(
                "Client is not connected".to_string(),
            )),
            (Some(_), Some(_)) => {
                self.reset_to_disconnected("wallet account changed").await;
                Err(AppError::ConnectionUnavailable(
                    "Wallet account changed; reconnect to continue".to_string(),
                ))
            }
            (Some(_), None) => {
                self.reset_to_disconnected("wallet account disappeared").await;
                Err(AppError::ConnectionUnavailable(
                    "Wallet account is no longer available".to_string(),
                ))
            }
        }
    }

    async fn ensure_unselected(&self, verb: &str) -> Result<()> {
        let state = self.inner.state.read().await;
        match state.phase {
            ClientPhase::Unselected => Ok(()),
            ClientPhase::Disconnected => Err(AppError::ConnectionUnavailable(
                "Client is not connected".to_string(),
            )),
            ClientPhase::Selected(_) => Err(AppError::Precondition(format!(
                "Leave the current session before trying to {}",
                verb
            ))),
        }
    }

    fn mutation_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.inner.mutation_slot.try_acquire().map_err(|_| {
            AppError::Precondition("Another state-changing call is still pending".to_string())
        })
    }

    async fn enter_session(&self, session_id: u64) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.inner.state.write().await;
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        state.selected = Some(session_id);
        state.game = None;
        state.phase = ClientPhase::Selected(SessionPhase::Loading);
        state.errors.submit = None;
        state.errors.fetch = None;
        state.poll_task = Some(spawn_poll_task(
            Arc::downgrade(&self.inner),
            epoch,
            session_id,
        ));
        tracing::info!("Selected session {}", session_id);
    }

    async fn reset_to_disconnected(&self, reason: &str) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.state.write().await;
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        tracing::info!("Session client disconnected: {}", reason);
        state.phase = ClientPhase::Disconnected;
        state.account = None;
        state.selected = None;
        state.game = None;
        state.errors = ActionErrors::default();
    }

    async fn set_phase_if_current(&self, epoch: u64, phase: ClientPhase) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let mut state = self.inner.state.write().await;
        if matches!(state.phase, ClientPhase::Selected(_)) {
            state.phase = phase;
        }
    }

    async fn set_action_error(&self, action: SessionAction, notice: Option<ErrorNotice>) {
        let mut state = self.inner.state.write().await;
        state.errors.set(action, notice);
    }

    async fn record_action_error(&self, action: SessionAction, error: &AppError) {
        tracing::warn!("{:?} failed: {}", action, error);
        self.set_action_error(action, Some(ErrorNotice::from_error(error)))
            .await;
    }

    async fn record_action_error_if_current(
        &self,
        epoch: u64,
        action: SessionAction,
        error: &AppError,
    ) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding stale {:?} error: {}", action, error);
            return;
        }
        self.record_action_error(action, error).await;
    }

    async fn fetch_snapshot(&self, epoch: u64, session_id: u64, mode: FetchMode) {
        let _guard = match mode {
            FetchMode::Queue => self.inner.fetch_gate.lock().await,
            FetchMode::SkipIfBusy => match self.inner.fetch_gate.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::trace!("Skipping poll tick: a fetch is already in flight");
                    return;
                }
            },
        };
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        let result = self.inner.backend.get_game(session_id).await;

        let mut state = self.inner.state.write().await;
        if self.inner.epoch.load(Ordering::SeqCst) != epoch || state.selected != Some(session_id) {
            tracing::debug!("Discarding stale snapshot for session {}", session_id);
            return;
        }
        match result {
            Ok(game) => {
                state.game = Some(game);
                state.errors.fetch = None;
                if matches!(
                    state.phase,
                    ClientPhase::Selected(
                        SessionPhase::Loading | SessionPhase::Ready | SessionPhase::Error
                    )
                ) {
                    state.phase = ClientPhase::Selected(SessionPhase::Ready);
                }
            }
            Err(error) => {
                // Keep the last known board visible while reporting the failure.
                tracing::warn!("Fetch for session {} failed: {}", session_id, error);
                state.errors.fetch = Some(ErrorNotice::from_error(&error));
                if !matches!(state.phase, ClientPhase::Selected(SessionPhase::Moving)) {
                    state.phase = ClientPhase::Selected(SessionPhase::Error);
                }
            }
        }
    }
}

// Polling loop bound to one selection. Holds only a weak reference so a
// dropped client ends its own loop; explicit leave/disconnect aborts eagerly.
fn spawn_poll_task(inner: Weak<SessionInner>, epoch: u64, session_id: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(poll_interval) = inner.upgrade().map(|inner| inner.poll_interval) else {
            return;
        };
        let mut ticker = interval(poll_interval);
        loop {
            ticker.tick().await;
            let Some(strong) = inner.upgrade() else {
                break;
            };
            if strong.epoch.load(Ordering::SeqCst) != epoch {
                break;
            }
            // A pending mutation suppresses poll ticks entirely.
            if strong.mutation_slot.available_permits() == 0 {
                tracing::trace!("Skipping poll tick: a mutation is in flight");
                continue;
            }
            let client = SessionClient { inner: strong };
            client
                .fetch_snapshot(epoch, session_id, FetchMode::SkipIfBusy)
                .await;
        }
    })
}
