//! Per-raffle ticket ledger.
//!
//! [`RaffleBook`] applies the reservation, purchase and expiry rules to a set of
//! ticket records. Every store implementation funnels its mutations through a
//! book so the rules live in one place:
//!
//! - the in-memory store keeps one book per raffle behind a mutex
//! - the Postgres store loads the locked rows into a partial book, applies the
//!   operation and writes back [`RaffleBook::take_changes`]
//!
//! Each number is decided on its own. A batch may partly succeed and the outcome
//! always lists every requested number in exactly one partition.

use crate::ticket::{Ticket, TicketStatus};
use crate::types::{NumberRange, ParticipantId, Raffle, RaffleId, RaffleStatus, ReservationTtl, TicketNumber};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a reservation call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOutcome {
    /// Numbers held by the caller after the call, ascending
    pub reserved: Vec<TicketNumber>,
    /// Subset of `reserved` that the caller already held before the call
    pub already_mine: Vec<TicketNumber>,
    /// Numbers that could not be acquired, ascending
    pub unavailable: Vec<TicketNumber>,
}

impl ReservationOutcome {
    /// Count of numbers held after the call
    #[must_use]
    pub fn total(&self) -> usize {
        self.reserved.len()
    }

    /// Whether some requested numbers were not acquired
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

/// Which reservations a purchase should convert
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseSelection {
    /// Exactly these numbers
    Numbers(BTreeSet<TicketNumber>),
    /// Every vigente reservation the participant holds in the raffle
    AllActive,
}

impl PurchaseSelection {
    /// An empty list means "all active reservations"
    #[must_use]
    pub fn from_numbers(numbers: impl IntoIterator<Item = TicketNumber>) -> Self {
        let numbers: BTreeSet<TicketNumber> = numbers.into_iter().collect();
        if numbers.is_empty() {
            Self::AllActive
        } else {
            Self::Numbers(numbers)
        }
    }

    /// Numbers for the wire; empty for [`PurchaseSelection::AllActive`]
    #[must_use]
    pub fn to_numbers(&self) -> Vec<TicketNumber> {
        match self {
            Self::Numbers(numbers) => numbers.iter().copied().collect(),
            Self::AllActive => Vec::new(),
        }
    }
}

/// Result of a purchase confirmation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    /// Numbers now purchased by the caller, ascending
    pub purchased: Vec<TicketNumber>,
    /// Numbers that were not eligible, ascending
    pub invalid: Vec<TicketNumber>,
}

impl PurchaseOutcome {
    /// Count of purchased numbers
    #[must_use]
    pub fn total(&self) -> usize {
        self.purchased.len()
    }
}

/// Result of releasing the caller's own reservations
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    /// Numbers returned to AVAILABLE, ascending
    pub released: Vec<TicketNumber>,
}

/// Ledger rule violations that reject a whole call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Reservations and purchases need an ABIERTA raffle
    #[error("raffle {raffle} is {status}, not accepting reservations or purchases")]
    RaffleNotOpen {
        /// Raffle involved
        raffle: RaffleId,
        /// Its current status
        status: RaffleStatus,
    },

    /// The range can only move while no number is held or sold
    #[error("raffle {raffle} has {engaged} numbers reserved or sold, its range cannot change")]
    RangeInUse {
        /// Raffle involved
        raffle: RaffleId,
        /// Numbers blocking the change
        engaged: usize,
    },
}

enum Acquire {
    Reserved,
    AlreadyMine,
    Unavailable,
}

// ============================================================================
// Raffle book
// ============================================================================

/// Ticket records of one raffle plus the rules that mutate them
#[derive(Clone, Debug)]
pub struct RaffleBook {
    raffle: Raffle,
    tickets: BTreeMap<TicketNumber, Ticket>,
    changed: BTreeSet<TicketNumber>,
}

impl RaffleBook {
    /// Creates a book with one available ticket per number in the raffle's range
    #[must_use]
    pub fn seeded(raffle: Raffle) -> Self {
        let tickets = raffle
            .numbers()
            .map(|numero| (numero, Ticket::available(numero)))
            .collect();
        Self {
            raffle,
            tickets,
            changed: BTreeSet::new(),
        }
    }

    /// Creates a book over an existing (possibly partial) set of tickets
    ///
    /// Numbers missing from `tickets` behave as unavailable.
    #[must_use]
    pub fn from_parts(raffle: Raffle, tickets: impl IntoIterator<Item = Ticket>) -> Self {
        Self {
            raffle,
            tickets: tickets.into_iter().map(|t| (t.numero, t)).collect(),
            changed: BTreeSet::new(),
        }
    }

    /// The raffle this book belongs to
    #[must_use]
    pub const fn raffle(&self) -> &Raffle {
        &self.raffle
    }

    /// Numbers reserved (vigente) or purchased at `now`
    #[must_use]
    pub fn engaged(&self, now: DateTime<Utc>) -> usize {
        self.tickets.values().filter(|t| !t.is_reservable(now)).count()
    }

    /// Replaces the raffle metadata; a moved range reseeds every ticket
    ///
    /// # Errors
    ///
    /// [`LedgerError::RangeInUse`] when the range moves while numbers are
    /// engaged. The book is left untouched.
    pub fn revise(&mut self, next: Raffle, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let moved = next.rango_min != self.raffle.rango_min || next.rango_max != self.raffle.rango_max;
        if !moved {
            self.raffle = next;
            return Ok(());
        }

        let engaged = self.engaged(now);
        if engaged > 0 {
            return Err(LedgerError::RangeInUse {
                raffle: self.raffle.id,
                engaged,
            });
        }
        *self = Self::seeded(next);
        Ok(())
    }

    /// Looks up one ticket
    #[must_use]
    pub fn ticket(&self, numero: TicketNumber) -> Option<&Ticket> {
        self.tickets.get(&numero)
    }

    /// Tickets in ascending order, optionally limited to a window
    #[must_use]
    pub fn tickets(&self, range: Option<NumberRange>) -> Vec<Ticket> {
        match range {
            Some(range) => self
                .tickets
                .range(range.desde..=range.hasta)
                .map(|(_, t)| t.clone())
                .collect(),
            None => self.tickets.values().cloned().collect(),
        }
    }

    /// Drains the tickets modified since the last call
    pub fn take_changes(&mut self) -> Vec<Ticket> {
        std::mem::take(&mut self.changed)
            .into_iter()
            .filter_map(|numero| self.tickets.get(&numero).cloned())
            .collect()
    }

    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.raffle.estado.accepts_sales() {
            Ok(())
        } else {
            Err(LedgerError::RaffleNotOpen {
                raffle: self.raffle.id,
                status: self.raffle.estado,
            })
        }
    }

    fn acquire(
        &mut self,
        participant: ParticipantId,
        numero: TicketNumber,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Acquire {
        let Some(ticket) = self.tickets.get_mut(&numero) else {
            return Acquire::Unavailable;
        };

        if ticket.is_reserved_by(participant, now) {
            return Acquire::AlreadyMine;
        }
        if !ticket.is_reservable(now) {
            return Acquire::Unavailable;
        }

        if ticket.is_expired(now) {
            if let Err(error) = ticket.transition(TicketStatus::Available, now) {
                tracing::warn!(%error, "Could not lapse expired hold");
                return Acquire::Unavailable;
            }
            self.changed.insert(numero);
        }

        let held = TicketStatus::Reserved {
            holder: participant,
            until: Some(until),
        };
        match ticket.transition(held, now) {
            Ok(()) => {
                self.changed.insert(numero);
                Acquire::Reserved
            }
            Err(error) => {
                tracing::warn!(%error, "Reservation transition rejected");
                Acquire::Unavailable
            }
        }
    }

    /// Reserves specific numbers for `participant`
    ///
    /// Numbers the participant already holds (vigente) count as reserved and are
    /// also listed in `already_mine`; their expiry is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RaffleNotOpen`] when the raffle is not selling.
    pub fn reserve_explicit(
        &mut self,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        ttl: ReservationTtl,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome, LedgerError> {
        self.ensure_open()?;
        let until = now + ttl.duration();
        let mut outcome = ReservationOutcome::default();

        for &numero in numbers {
            match self.acquire(participant, numero, until, now) {
                Acquire::Reserved => outcome.reserved.push(numero),
                Acquire::AlreadyMine => {
                    outcome.reserved.push(numero);
                    outcome.already_mine.push(numero);
                }
                Acquire::Unavailable => outcome.unavailable.push(numero),
            }
        }

        metrics::counter!("rifas.reservations.reserved", "mode" => "explicit")
            .increment((outcome.reserved.len() - outcome.already_mine.len()) as u64);
        metrics::counter!("rifas.reservations.unavailable")
            .increment(outcome.unavailable.len() as u64);

        Ok(outcome)
    }

    /// Reserves up to `count` numbers picked at random among the free ones
    ///
    /// Fewer than `count` numbers are reserved when fewer are free; the shortfall
    /// shows only in the size of `reserved`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RaffleNotOpen`] when the raffle is not selling.
    pub fn reserve_random<R: Rng + ?Sized>(
        &mut self,
        participant: ParticipantId,
        count: u32,
        ttl: ReservationTtl,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ReservationOutcome, LedgerError> {
        self.ensure_open()?;
        let until = now + ttl.duration();

        let candidates: Vec<TicketNumber> = self
            .tickets
            .values()
            .filter(|t| t.is_reservable(now))
            .map(|t| t.numero)
            .collect();
        let mut picked: Vec<TicketNumber> = candidates
            .choose_multiple(rng, count as usize)
            .copied()
            .collect();
        picked.sort_unstable();

        let mut outcome = ReservationOutcome::default();
        for numero in picked {
            if matches!(self.acquire(participant, numero, until, now), Acquire::Reserved) {
                outcome.reserved.push(numero);
            }
        }

        metrics::counter!("rifas.reservations.reserved", "mode" => "random")
            .increment(outcome.reserved.len() as u64);

        Ok(outcome)
    }

    /// Returns the participant's own reservations among `numbers` to AVAILABLE
    ///
    /// Numbers held by anyone else, or not reserved at all, are left untouched.
    /// Expired holds of the participant are released as well.
    pub fn release(
        &mut self,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        now: DateTime<Utc>,
    ) -> ReleaseOutcome {
        let mut outcome = ReleaseOutcome::default();

        for &numero in numbers {
            let Some(ticket) = self.tickets.get_mut(&numero) else {
                continue;
            };
            if ticket.holder() != Some(participant) {
                continue;
            }
            match ticket.transition(TicketStatus::Available, now) {
                Ok(()) => {
                    self.changed.insert(numero);
                    outcome.released.push(numero);
                }
                Err(error) => tracing::warn!(%error, "Release transition rejected"),
            }
        }

        outcome
    }

    /// Converts vigente reservations of `participant` into purchases
    ///
    /// Numbers already purchased by the participant count as purchased again.
    /// Anything else requested explicitly lands in `invalid`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RaffleNotOpen`] when the raffle is not selling.
    pub fn confirm(
        &mut self,
        participant: ParticipantId,
        selection: &PurchaseSelection,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome, LedgerError> {
        self.ensure_open()?;

        let targets: Vec<TicketNumber> = match selection {
            PurchaseSelection::Numbers(numbers) => numbers.iter().copied().collect(),
            PurchaseSelection::AllActive => self
                .tickets
                .values()
                .filter(|t| t.is_reserved_by(participant, now))
                .map(|t| t.numero)
                .collect(),
        };

        let mut outcome = PurchaseOutcome::default();
        for numero in targets {
            let Some(ticket) = self.tickets.get_mut(&numero) else {
                outcome.invalid.push(numero);
                continue;
            };

            if ticket.is_purchased_by(participant) {
                outcome.purchased.push(numero);
                continue;
            }
            if !ticket.is_reserved_by(participant, now) {
                outcome.invalid.push(numero);
                continue;
            }

            match ticket.transition(TicketStatus::Purchased { buyer: Some(participant) }, now) {
                Ok(()) => {
                    self.changed.insert(numero);
                    outcome.purchased.push(numero);
                }
                Err(error) => {
                    tracing::warn!(%error, "Purchase transition rejected");
                    outcome.invalid.push(numero);
                }
            }
        }

        metrics::counter!("rifas.purchases.confirmed").increment(outcome.purchased.len() as u64);
        metrics::counter!("rifas.purchases.invalid").increment(outcome.invalid.len() as u64);

        Ok(outcome)
    }

    /// Returns every lapsed reservation to AVAILABLE; reports how many
    pub fn release_expired(&mut self, now: DateTime<Utc>) -> u32 {
        let mut released = 0;

        for ticket in self.tickets.values_mut() {
            if !ticket.is_expired(now) {
                continue;
            }
            match ticket.transition(TicketStatus::Available, now) {
                Ok(()) => {
                    self.changed.insert(ticket.numero);
                    released += 1;
                }
                Err(error) => tracing::warn!(%error, "Expiry transition rejected"),
            }
        }

        metrics::counter!("rifas.expired.released").increment(u64::from(released));
        released
    }

    /// Numbers the participant bought plus those they hold (vigente)
    #[must_use]
    pub fn numbers_of(&self, participant: ParticipantId, now: DateTime<Utc>) -> Vec<TicketNumber> {
        self.tickets
            .values()
            .filter(|t| t.is_purchased_by(participant) || t.is_reserved_by(participant, now))
            .map(|t| t.numero)
            .collect()
    }
}
