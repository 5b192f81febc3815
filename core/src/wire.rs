//! JSON bodies of the REST API.
//!
//! Request and reply field names follow the public API (`participanteId`,
//! `yaReservadosMios`, ...). Ticket rows arrive from several backends with
//! differently spelled holder fields; [`WireTicket`] accepts all of them and
//! `TryFrom<WireTicket> for Ticket` maps them onto the single internal field.

use crate::ledger::{PurchaseOutcome, PurchaseSelection, ReleaseOutcome, ReservationOutcome};
use crate::ticket::{Ticket, TicketState, TicketStatus};
use crate::types::{
    ApprovalStatus, NumberRange, ParticipantId, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A ticket row that cannot be turned into a [`Ticket`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `estado` is not a known spelling
    #[error("ticket {numero}: unknown state '{estado}'")]
    UnknownState {
        /// Ticket involved
        numero: TicketNumber,
        /// Raw value
        estado: String,
    },

    /// RESERVED without any holder field
    #[error("ticket {0}: reserved without a holder")]
    MissingHolder(TicketNumber),
}

// ============================================================================
// Ticket rows
// ============================================================================

/// Ticket row as exchanged over HTTP
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTicket {
    /// Ticket number
    pub numero: TicketNumber,
    /// Owning raffle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rifa_id: Option<RaffleId>,
    /// State spelling
    pub estado: String,
    /// Holder of a reservation
    #[serde(default, alias = "reservadoPorId", skip_serializing_if = "Option::is_none")]
    pub reservado_por_id: Option<ParticipantId>,
    /// Buyer of a purchased number
    #[serde(default, alias = "compradoPorId", skip_serializing_if = "Option::is_none")]
    pub comprado_por_id: Option<ParticipantId>,
    /// Legacy owner field, holder or buyer depending on `estado`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participante_id: Option<ParticipantId>,
    /// End of the reservation
    #[serde(default, alias = "reservadoHasta", skip_serializing_if = "Option::is_none")]
    pub reservado_hasta: Option<DateTime<Utc>>,
    /// Last change
    #[serde(default, alias = "actualizadoEn", skip_serializing_if = "Option::is_none")]
    pub actualizado_en: Option<DateTime<Utc>>,
}

impl WireTicket {
    /// Canonical row for a ticket
    #[must_use]
    pub fn from_ticket(raffle: RaffleId, ticket: &Ticket) -> Self {
        let (reservado_por_id, comprado_por_id, reservado_hasta) = match ticket.status {
            TicketStatus::Available => (None, None, None),
            TicketStatus::Reserved { holder, until } => (Some(holder), None, until),
            TicketStatus::Purchased { buyer } => (None, buyer, None),
        };
        Self {
            numero: ticket.numero,
            rifa_id: Some(raffle),
            estado: ticket.state().as_str().to_string(),
            reservado_por_id,
            comprado_por_id,
            participante_id: None,
            reservado_hasta,
            actualizado_en: ticket.updated_at,
        }
    }
}

impl TryFrom<WireTicket> for Ticket {
    type Error = DecodeError;

    fn try_from(row: WireTicket) -> Result<Self, Self::Error> {
        let state = TicketState::parse(&row.estado).ok_or_else(|| DecodeError::UnknownState {
            numero: row.numero,
            estado: row.estado.clone(),
        })?;

        let status = match state {
            TicketState::Available => TicketStatus::Available,
            TicketState::Reserved => {
                let holder = row
                    .reservado_por_id
                    .or(row.participante_id)
                    .ok_or(DecodeError::MissingHolder(row.numero))?;
                if row.reservado_hasta.is_none() {
                    tracing::warn!(numero = %row.numero, "Reserved ticket has no expiry; holding it indefinitely");
                }
                TicketStatus::Reserved {
                    holder,
                    until: row.reservado_hasta,
                }
            }
            TicketState::Purchased => TicketStatus::Purchased {
                buyer: row.comprado_por_id.or(row.participante_id),
            },
        };

        Ok(Self {
            numero: row.numero,
            status,
            updated_at: row.actualizado_en,
        })
    }
}

// ============================================================================
// Requests
// ============================================================================

/// `POST /rifas/:id/reservas`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    /// Caller
    pub participante_id: ParticipantId,
    /// Requested numbers
    pub numeros: Vec<TicketNumber>,
    /// Requested hold in minutes, clamped to 1..=60
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutos_reserva: Option<i64>,
}

impl ReserveRequest {
    /// Requested numbers without duplicates
    #[must_use]
    pub fn numbers(&self) -> BTreeSet<TicketNumber> {
        self.numeros.iter().copied().collect()
    }

    /// Clamped hold duration
    #[must_use]
    pub fn ttl(&self) -> ReservationTtl {
        self.minutos_reserva.map(ReservationTtl::from_minutes).unwrap_or_default()
    }
}

/// `POST /rifas/:id/reservas/aleatorias`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomReserveRequest {
    /// Caller
    pub participante_id: ParticipantId,
    /// How many numbers to reserve
    pub cantidad: u32,
    /// Requested hold in minutes, clamped to 1..=60
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutos_reserva: Option<i64>,
}

impl RandomReserveRequest {
    /// Clamped hold duration
    #[must_use]
    pub fn ttl(&self) -> ReservationTtl {
        self.minutos_reserva.map(ReservationTtl::from_minutes).unwrap_or_default()
    }
}

/// `DELETE /rifas/:id/reservas`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    /// Caller
    pub participante_id: ParticipantId,
    /// Numbers to release
    pub numeros: Vec<TicketNumber>,
}

/// `POST /rifas/:id/compras`
///
/// An empty `numeros` list means "all my active reservations".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Raffle, repeated from the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rifa_id: Option<RaffleId>,
    /// Caller
    pub participante_id: ParticipantId,
    /// Numbers to buy
    #[serde(default)]
    pub numeros: Vec<TicketNumber>,
}

impl PurchaseRequest {
    /// Interprets the number list
    #[must_use]
    pub fn selection(&self) -> PurchaseSelection {
        PurchaseSelection::from_numbers(self.numeros.iter().copied())
    }
}

/// `PUT /admin/participantes/:id/estado`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStatusUpdate {
    /// Review decision
    pub nuevo_estado: ApprovalStatus,
}

/// Query of `GET /rifas`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleFilter {
    /// Only raffles in this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<RaffleStatus>,
}

/// Query of `GET /rifas/:id/numeros`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQuery {
    /// First number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desde: Option<i32>,
    /// Last number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hasta: Option<i32>,
}

impl RangeQuery {
    /// Window to list; a missing bound is open
    #[must_use]
    pub fn range(&self) -> Option<NumberRange> {
        match (self.desde, self.hasta) {
            (None, None) => None,
            (desde, hasta) => Some(NumberRange::new(
                TicketNumber::new(desde.unwrap_or(i32::MIN)),
                TicketNumber::new(hasta.unwrap_or(i32::MAX)),
            )),
        }
    }
}

impl From<Option<NumberRange>> for RangeQuery {
    fn from(range: Option<NumberRange>) -> Self {
        range.map_or_else(Self::default, |r| Self {
            desde: Some(r.desde.value()),
            hasta: Some(r.hasta.value()),
        })
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Reply of both reservation routes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReply {
    /// Raffle
    pub rifa_id: RaffleId,
    /// Numbers held by the caller after the call
    #[serde(default)]
    pub reservado: Vec<TicketNumber>,
    /// Numbers the caller already held
    #[serde(default)]
    pub ya_reservados_mios: Vec<TicketNumber>,
    /// Numbers that could not be acquired
    #[serde(default)]
    pub no_disponibles: Vec<TicketNumber>,
    /// `reservado.len()`
    #[serde(default)]
    pub total: usize,
}

impl ReservationReply {
    /// Builds the reply for an outcome
    #[must_use]
    pub fn new(raffle: RaffleId, outcome: ReservationOutcome) -> Self {
        Self {
            rifa_id: raffle,
            total: outcome.total(),
            reservado: outcome.reserved,
            ya_reservados_mios: outcome.already_mine,
            no_disponibles: outcome.unavailable,
        }
    }
}

impl From<ReservationReply> for ReservationOutcome {
    fn from(reply: ReservationReply) -> Self {
        let mut outcome = Self {
            reserved: reply.reservado,
            already_mine: reply.ya_reservados_mios,
            unavailable: reply.no_disponibles,
        };
        outcome.reserved.sort_unstable();
        outcome.already_mine.sort_unstable();
        outcome.unavailable.sort_unstable();
        outcome
    }
}

/// Reply of `POST /rifas/:id/compras`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReply {
    /// Raffle
    pub rifa_id: RaffleId,
    /// Numbers now purchased by the caller
    #[serde(default)]
    pub comprado: Vec<TicketNumber>,
    /// Numbers that were not eligible
    #[serde(default)]
    pub invalido: Vec<TicketNumber>,
    /// `comprado.len()`
    #[serde(default)]
    pub total: usize,
}

impl PurchaseReply {
    /// Builds the reply for an outcome
    #[must_use]
    pub fn new(raffle: RaffleId, outcome: PurchaseOutcome) -> Self {
        Self {
            rifa_id: raffle,
            total: outcome.total(),
            comprado: outcome.purchased,
            invalido: outcome.invalid,
        }
    }
}

impl From<PurchaseReply> for PurchaseOutcome {
    fn from(reply: PurchaseReply) -> Self {
        let mut outcome = Self {
            purchased: reply.comprado,
            invalid: reply.invalido,
        };
        outcome.purchased.sort_unstable();
        outcome.invalid.sort_unstable();
        outcome
    }
}

/// Reply of `DELETE /rifas/:id/reservas`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReply {
    /// Raffle
    pub rifa_id: RaffleId,
    /// Numbers returned to AVAILABLE
    #[serde(default)]
    pub liberados: Vec<TicketNumber>,
}

impl ReleaseReply {
    /// Builds the reply for an outcome
    #[must_use]
    pub fn new(raffle: RaffleId, outcome: ReleaseOutcome) -> Self {
        Self {
            rifa_id: raffle,
            liberados: outcome.released,
        }
    }
}

/// Reply of `POST /rifas/:id/liberar-vencidas`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredReply {
    /// Raffle
    pub rifa_id: RaffleId,
    /// How many holds were released
    pub liberadas: u32,
}

/// Reply of calls that only acknowledge, such as `DELETE /rifas/:id`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    /// Human-readable acknowledgement
    pub msg: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Machine-readable `code` values of [`ErrorBody`]
pub mod error_codes {
    /// Malformed request
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    /// Unknown raffle, participant or route
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Raffle not accepting sales
    pub const RAFFLE_NOT_OPEN: &str = "RAFFLE_NOT_OPEN";
    /// Concurrent modification
    pub const CONFLICT: &str = "CONFLICT";
    /// Input rejected by the store
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// Stored record could not be decoded
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    /// Backend down
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    /// Anything else
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Body of every failed API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// One of [`error_codes`]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Structured context, when the code carries any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
