//! Grid commands and the store results they feed back.

use rifas_core::ledger::{PurchaseOutcome, ReleaseOutcome, ReservationOutcome};
use rifas_core::store::StoreError;
use rifas_core::ticket::Ticket;
use rifas_core::types::{Raffle, TicketNumber};

/// What triggered a snapshot refresh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOrigin {
    /// First load of the grid
    Load,
    /// The visitor pressed reload
    User,
    /// Follow-up to a reservation, release or purchase
    AfterMutation,
}

/// Which purchase mode produced a result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurchaseMode {
    /// Confirmation of exactly the selected numbers
    Selected {
        /// Size of the submitted selection
        expected: usize,
    },
    /// Confirmation of every vigente reservation the visitor holds
    AllActive,
}

/// Everything the grid reducer handles
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GridAction {
    // Commands
    /// Fetch the raffle and its tickets
    Load,
    /// Re-fetch the ticket snapshot
    Reload,
    /// Check or uncheck a number
    Toggle(TicketNumber),
    /// Show the next page
    NextPage,
    /// Show the previous page
    PreviousPage,
    /// Jump to a page (clamped)
    GoToPage(u32),
    /// Reserve the checked numbers
    ReserveSelected,
    /// Reserve `remaining` random numbers
    ReserveRandom,
    /// Release the checked numbers and clear the selection
    ClearSelection,
    /// Buy exactly the checked numbers
    ConfirmSelected,
    /// Buy every vigente reservation held by the visitor
    ConfirmAllActive,

    // Events
    /// Raffle fetch finished
    RaffleLoaded(Result<Raffle, StoreError>),
    /// Ticket snapshot fetch finished
    Refreshed {
        /// Why the refresh ran
        origin: RefreshOrigin,
        /// Tickets of the whole range
        result: Result<Vec<Ticket>, StoreError>,
    },
    /// Explicit reservation finished
    Reserved(Result<ReservationOutcome, StoreError>),
    /// Random reservation finished
    RandomReserved(Result<ReservationOutcome, StoreError>),
    /// Release finished
    Released(Result<ReleaseOutcome, StoreError>),
    /// Purchase finished
    Purchased {
        /// How the purchase was requested
        mode: PurchaseMode,
        /// Store reply
        result: Result<PurchaseOutcome, StoreError>,
    },
}

impl GridAction {
    /// Commands that start a store round trip
    #[must_use]
    pub const fn starts_round_trip(&self) -> bool {
        matches!(
            self,
            Self::Load
                | Self::Reload
                | Self::ReserveSelected
                | Self::ReserveRandom
                | Self::ClearSelection
                | Self::ConfirmSelected
                | Self::ConfirmAllActive
        )
    }
}
