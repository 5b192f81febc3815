//! # Rifas Grid
//!
//! The number grid a visitor uses to pick raffle tickets.
//!
//! The grid is a reducer ([`GridReducer`]) over [`GridState`], driven by a
//! [`rifas_runtime::Store`]. Store calls run as effects and their results are
//! fed back as [`GridAction`] events, so the whole session is testable with
//! `ReducerTest` and an in-memory ticket store.
//!
//! ## Example
//!
//! ```ignore
//! let grid = RaffleGrid::render(store, clock, raffle.id, participant.id, 3, 10).await?;
//! grid.toggle(TicketNumber::new(5)).await?;
//! grid.reserve_random().await?;
//! let view = grid.confirm_selected().await?;
//! assert!(view.completed);
//! ```

use rifas_core::environment::Clock;
use rifas_core::store::TicketStore;
use rifas_core::types::{ParticipantId, RaffleId, ReservationTtl, TicketNumber};
use rifas_runtime::{RuntimeError, Store};
use std::sync::Arc;
use std::time::Duration;

/// Commands and store results
pub mod action;
/// Notices and the grid error taxonomy
pub mod notice;
/// Page window over the number range
pub mod paging;
/// The grid reducer and its environment
pub mod reducer;
/// Session state
pub mod state;
/// Presentation model
pub mod view;

pub use action::{GridAction, PurchaseMode, RefreshOrigin};
pub use notice::{GridError, Notice, Severity};
pub use paging::{PAGE_SIZE, PageWindow};
pub use reducer::{GridEnvironment, GridReducer};
pub use state::GridState;
pub use view::{CellHint, CellView, GridView, NoticeView};

type GridStore = Store<GridState, GridAction, GridEnvironment, GridReducer>;

/// A rendered grid bound to one raffle and one visitor
///
/// Every action method dispatches the command, waits for the round trips it
/// triggers, and returns the resulting view.
#[derive(Clone)]
pub struct RaffleGrid {
    store: GridStore,
}

impl RaffleGrid {
    /// Opens the grid and loads the raffle with its tickets
    ///
    /// Load failures do not fail the call; they show up as a
    /// [`GridError::LoadFailed`] notice and the grid can be reloaded.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeError`] only if the grid could not accept the
    /// load command.
    #[tracing::instrument(skip(store, clock), fields(raffle = %raffle_id, participant = %participant_id))]
    pub async fn render(
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        raffle_id: RaffleId,
        participant_id: ParticipantId,
        desired_quantity: u32,
        ttl_minutes: i64,
    ) -> Result<Self, RuntimeError> {
        let state = GridState::new(
            raffle_id,
            participant_id,
            desired_quantity,
            ReservationTtl::from_minutes(ttl_minutes),
        );
        let grid = Self {
            store: Store::new(state, GridReducer::new(), GridEnvironment::new(store, clock)),
        };
        grid.apply(GridAction::Load).await?;
        Ok(grid)
    }

    /// Sends an action and waits until the grid is quiet again
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownInProgress`] after [`RaffleGrid::close`].
    pub async fn apply(&self, action: GridAction) -> Result<GridView, RuntimeError> {
        self.store.send(action).await?;
        self.store.settled().await;
        Ok(self.view().await)
    }

    /// Current view, judged at the clock's now
    pub async fn view(&self) -> GridView {
        let now = self.store.environment().clock.now();
        self.store.state(|state| GridView::build(state, now)).await
    }

    /// Copy of the session state
    pub async fn state(&self) -> GridState {
        self.store.state(GridState::clone).await
    }

    /// Re-fetches the snapshot and reconciles the selection
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn reload(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::Reload).await
    }

    /// Checks or unchecks a number
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn toggle(&self, numero: TicketNumber) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::Toggle(numero)).await
    }

    /// Shows the next page of numbers
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn next_page(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::NextPage).await
    }

    /// Shows the previous page of numbers
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn previous_page(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::PreviousPage).await
    }

    /// Jumps to `page`, clamped into the range
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn go_to_page(&self, page: u32) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::GoToPage(page)).await
    }

    /// Reserves the checked numbers
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn reserve_selected(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::ReserveSelected).await
    }

    /// Reserves random numbers for the rest of the quota
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn reserve_random(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::ReserveRandom).await
    }

    /// Releases the checked numbers
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn clear_selection(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::ClearSelection).await
    }

    /// Buys exactly the checked numbers
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn confirm_selected(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::ConfirmSelected).await
    }

    /// Buys every vigente reservation the visitor holds
    ///
    /// # Errors
    ///
    /// See [`RaffleGrid::apply`].
    pub async fn confirm_all_active(&self) -> Result<GridView, RuntimeError> {
        self.apply(GridAction::ConfirmAllActive).await
    }

    /// Stops accepting actions and waits for outstanding round trips
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] if calls are still running
    /// after `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.store.shutdown(timeout).await
    }
}
