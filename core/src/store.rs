//! The ticket store contract.
//!
//! [`TicketStore`] is the single arbiter of who holds which number. Every call is
//! atomic per number: a concurrent caller either wins a number or sees it in
//! `unavailable`/`invalid`, never half of a transition.

use crate::ledger::{LedgerError, PurchaseOutcome, PurchaseSelection, ReleaseOutcome, ReservationOutcome};
use crate::ticket::Ticket;
use crate::types::{
    ApprovalStatus, NewParticipant, NewRaffle, NumberRange, Participant, ParticipantId, PaymentOption, Raffle,
    RafflePatch, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors returned by [`TicketStore`] implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Raffle, participant or route does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Raffle does not accept reservations or purchases in its current status
    #[error("Raffle {raffle} is {status}")]
    RaffleNotOpen {
        /// Raffle involved
        raffle: RaffleId,
        /// Its current status
        status: RaffleStatus,
    },

    /// Input rejected before touching any ticket
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A stored or received record could not be understood
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Backend unreachable or failing
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Concurrent modification could not be resolved
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<LedgerError> for StoreError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::RaffleNotOpen { raffle, status } => Self::RaffleNotOpen { raffle, status },
            LedgerError::RangeInUse { .. } => Self::Conflict(error.to_string()),
        }
    }
}

impl From<crate::wire::DecodeError> for StoreError {
    fn from(error: crate::wire::DecodeError) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Storage and arbitration of raffle ticket numbers
///
/// Implementations:
/// - `InMemoryTicketStore` (this crate)
/// - `PostgresTicketStore` (`rifas-postgres`)
/// - `HttpTicketStore` (`rifas-client`)
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Creates a raffle in `CREADA` with one available ticket per number
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for an empty title, a zero price, or a range
    /// that is inverted or wider than [`Raffle::MAX_NUMBERS`].
    async fn create_raffle(&self, raffle: NewRaffle) -> Result<Raffle, StoreError>;

    /// Lists raffles, optionally only those in `status`
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] when the backend fails.
    async fn list_raffles(&self, status: Option<RaffleStatus>) -> Result<Vec<Raffle>, StoreError>;

    /// Fetches one raffle
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id.
    async fn get_raffle(&self, id: RaffleId) -> Result<Raffle, StoreError>;

    /// Applies a partial update to a raffle
    ///
    /// A moved range reseeds the tickets and is only accepted while no number
    /// is reserved or sold. `payment_options`, when present, replaces the list.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id, [`StoreError::Validation`]
    /// when the result breaks a creation rule, [`StoreError::Conflict`] when
    /// the range moves under engaged numbers.
    async fn update_raffle(&self, id: RaffleId, patch: RafflePatch) -> Result<Raffle, StoreError>;

    /// Moves a raffle to another lifecycle status
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id.
    async fn set_raffle_status(&self, id: RaffleId, status: RaffleStatus) -> Result<Raffle, StoreError> {
        self.update_raffle(id, RafflePatch::status(status)).await
    }

    /// Deletes a raffle with its tickets, participants and payment options
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id.
    async fn delete_raffle(&self, id: RaffleId) -> Result<(), StoreError>;

    /// Payment options of a raffle ordered by `sort_order`, inactive ones included
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    async fn list_payment_options(&self, raffle: RaffleId) -> Result<Vec<PaymentOption>, StoreError>;

    /// Tickets of a raffle in ascending order, optionally limited to a window
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    async fn list_tickets(&self, raffle: RaffleId, range: Option<NumberRange>) -> Result<Vec<Ticket>, StoreError>;

    /// Reserves specific numbers for `participant` until `now + ttl`
    ///
    /// # Errors
    ///
    /// [`StoreError::RaffleNotOpen`] unless the raffle is `ABIERTA`. Unavailable
    /// numbers are not an error; they are listed in the outcome.
    async fn reserve_explicit(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError>;

    /// Reserves up to `count` free numbers picked at random
    ///
    /// # Errors
    ///
    /// [`StoreError::RaffleNotOpen`] unless the raffle is `ABIERTA`.
    async fn reserve_random(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        count: u32,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError>;

    /// Releases the caller's own reservations among `numbers`
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    async fn release_reservations(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
    ) -> Result<ReleaseOutcome, StoreError>;

    /// Converts vigente reservations into purchases
    ///
    /// # Errors
    ///
    /// [`StoreError::RaffleNotOpen`] unless the raffle is `ABIERTA`. Ineligible
    /// numbers are listed in `invalid`.
    async fn confirm_purchase(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        selection: &PurchaseSelection,
    ) -> Result<PurchaseOutcome, StoreError>;

    /// Returns every lapsed reservation of the raffle to AVAILABLE
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    async fn release_expired(&self, raffle: RaffleId) -> Result<u32, StoreError>;

    /// Numbers the participant bought plus those they currently hold
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    async fn tickets_of_participant(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
    ) -> Result<Vec<TicketNumber>, StoreError>;

    /// Registers a visitor against a raffle with approval `pendiente`
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for missing fields or a payment option that
    /// is not an active option of the raffle, [`StoreError::NotFound`] for an
    /// unknown raffle.
    async fn register_participant(&self, participant: NewParticipant) -> Result<Participant, StoreError>;

    /// Fetches one participant
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id.
    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError>;

    /// Records the admin's review of a participant's payment
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown id.
    async fn set_participant_status(
        &self,
        id: ParticipantId,
        status: ApprovalStatus,
    ) -> Result<Participant, StoreError>;
}

/// Checks a participant's chosen payment option against the raffle's options
///
/// # Errors
///
/// [`StoreError::Validation`] when the option is unknown to the raffle or inactive.
pub fn check_payment_option(participant: &NewParticipant, options: &[PaymentOption]) -> Result<(), StoreError> {
    let Some(chosen) = participant.payment_option_id else {
        return Ok(());
    };
    match options.iter().find(|option| option.id == chosen) {
        Some(option) if option.is_active => Ok(()),
        Some(_) => Err(StoreError::Validation(format!("payment option {} is inactive", chosen.value()))),
        None => Err(StoreError::Validation(format!(
            "payment option {} does not belong to raffle {}",
            chosen.value(),
            participant.rifa_id
        ))),
    }
}
