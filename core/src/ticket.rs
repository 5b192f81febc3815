//! Ticket number records and their state machine.
//!
//! Legal transitions:
//!
//! ```text
//! AVAILABLE ──reserve──▶ RESERVED ──confirm──▶ PURCHASED (terminal)
//!     ▲                     │
//!     └──release / expire───┘
//! ```
//!
//! A RESERVED ticket without an expiry never lapses. That case comes from older
//! stores that did not record `reserved_until` and is kept for compatibility.

use crate::types::{ParticipantId, TicketNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one ticket number
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Free for anyone to reserve
    Available,
    /// Held by a participant until `until` (forever when `None`)
    Reserved {
        /// Participant holding the number
        holder: ParticipantId,
        /// End of the hold
        until: Option<DateTime<Utc>>,
    },
    /// Bought; terminal
    Purchased {
        /// Participant that bought the number, when known
        buyer: Option<ParticipantId>,
    },
}

impl TicketStatus {
    /// Coarse state name used on the wire
    #[must_use]
    pub const fn kind(&self) -> TicketState {
        match self {
            Self::Available => TicketState::Available,
            Self::Reserved { .. } => TicketState::Reserved,
            Self::Purchased { .. } => TicketState::Purchased,
        }
    }

    /// Whether moving to `next` follows the ticket state machine
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Reserved { .. })
                | (Self::Reserved { .. }, Self::Available | Self::Purchased { .. })
        )
    }
}

/// Coarse ticket state without holder details
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketState {
    /// `DISPONIBLE`
    Available,
    /// `RESERVADO`
    Reserved,
    /// `COMPRADO` (legacy `VENDIDO`)
    Purchased,
}

impl TicketState {
    /// Canonical wire spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "DISPONIBLE",
            Self::Reserved => "RESERVADO",
            Self::Purchased => "COMPRADO",
        }
    }

    /// Parses any known spelling, case-insensitive
    ///
    /// `VENDIDO`/`SOLD` are legacy names for a purchased number.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DISPONIBLE" | "AVAILABLE" | "D" => Some(Self::Available),
            "RESERVADO" | "RESERVED" => Some(Self::Reserved),
            "COMPRADO" | "PURCHASED" | "VENDIDO" | "SOLD" => Some(Self::Purchased),
            _ => None,
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ticket {numero}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    /// Ticket involved
    pub numero: TicketNumber,
    /// State before
    pub from: TicketState,
    /// Requested state
    pub to: TicketState,
}

/// One ticket number of a raffle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// The number
    pub numero: TicketNumber,
    /// Current state
    pub status: TicketStatus,
    /// Last change
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Creates an available ticket
    #[must_use]
    pub const fn available(numero: TicketNumber) -> Self {
        Self {
            numero,
            status: TicketStatus::Available,
            updated_at: None,
        }
    }

    /// Coarse state
    #[must_use]
    pub const fn state(&self) -> TicketState {
        self.status.kind()
    }

    /// Current holder of a reservation, if any
    #[must_use]
    pub const fn holder(&self) -> Option<ParticipantId> {
        match self.status {
            TicketStatus::Reserved { holder, .. } => Some(holder),
            _ => None,
        }
    }

    /// Expiry of a reservation, if any
    #[must_use]
    pub const fn reserved_until(&self) -> Option<DateTime<Utc>> {
        match self.status {
            TicketStatus::Reserved { until, .. } => until,
            _ => None,
        }
    }

    /// Whether the ticket is free
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.status, TicketStatus::Available)
    }

    /// Whether the ticket is bought (terminal)
    #[must_use]
    pub const fn is_purchased(&self) -> bool {
        matches!(self.status, TicketStatus::Purchased { .. })
    }

    /// RESERVED with an expiry at or before `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, TicketStatus::Reserved { until: Some(until), .. } if until <= now)
    }

    /// RESERVED by `participant` and still vigente at `now`
    #[must_use]
    pub fn is_reserved_by(&self, participant: ParticipantId, now: DateTime<Utc>) -> bool {
        match self.status {
            TicketStatus::Reserved { holder, until } => {
                holder == participant && until.is_none_or(|until| now < until)
            }
            _ => false,
        }
    }

    /// PURCHASED by `participant`
    #[must_use]
    pub fn is_purchased_by(&self, participant: ParticipantId) -> bool {
        matches!(self.status, TicketStatus::Purchased { buyer: Some(buyer) } if buyer == participant)
    }

    /// Whether `participant` may pick this number
    ///
    /// True iff the ticket is available or reserved by `participant` and vigente.
    #[must_use]
    pub fn is_selectable_by(&self, participant: ParticipantId, now: DateTime<Utc>) -> bool {
        self.is_available() || self.is_reserved_by(participant, now)
    }

    /// Whether a new reservation may take this number at `now`
    ///
    /// Expired holds count as free even before the reaper has run.
    #[must_use]
    pub fn is_reservable(&self, now: DateTime<Utc>) -> bool {
        self.is_available() || self.is_expired(now)
    }

    /// Moves the ticket to `next`, enforcing the state machine
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `next` is not reachable from the current state.
    pub fn transition(&mut self, next: TicketStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(&next) {
            return Err(TransitionError {
                numero: self.numero,
                from: self.state(),
                to: next.kind(),
            });
        }
        self.status = next;
        self.updated_at = Some(now);
        Ok(())
    }
}
