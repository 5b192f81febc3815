//! Messages the grid shows after an action.
//!
//! Store failures never escape the grid; they end up here as a [`GridError`]
//! inside a [`Notice`] and the grid stays interactive.

use rifas_core::types::TicketNumber;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures reported to the visitor
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum GridError {
    /// Raffle or ticket list could not be fetched
    #[error("Could not load the raffle: {0}")]
    LoadFailed(String),

    /// A reservation call failed outright; selection is unchanged
    #[error("Could not reserve numbers: {0}")]
    ReservationFailed(String),

    /// Fewer numbers were purchased than requested
    #[error("{}", purchase_incomplete(.invalid))]
    PurchaseIncomplete {
        /// Numbers that were not eligible
        invalid: Vec<TicketNumber>,
    },

    /// A purchase call failed or bought nothing
    #[error("Could not complete the purchase: {0}")]
    PurchaseFailed(String),

    /// Releasing the selection failed
    #[error("Could not release the reservations: {0}")]
    ReleaseFailed(String),

    /// Reserve pressed with an empty selection
    #[error("No numbers selected")]
    NothingSelected,

    /// Confirm pressed before picking the full quantity
    #[error("Select exactly {required} numbers to confirm ({selected} selected)")]
    SelectionIncomplete {
        /// Current selection size
        selected: usize,
        /// Requested quantity
        required: u32,
    },
}

fn purchase_incomplete(invalid: &[TicketNumber]) -> String {
    if invalid.is_empty() {
        "Could not confirm the purchase".to_string()
    } else {
        format!("Some numbers could not be purchased: {}", join(invalid))
    }
}

pub(crate) fn join(numbers: &[TicketNumber]) -> String {
    numbers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// How a notice should be presented
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Action succeeded
    Success,
    /// Informational, not a failure
    Info,
    /// Action failed
    Error,
}

/// One message shown above the grid
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Notice {
    /// Explicit reservation took these numbers
    Reserved(Vec<TicketNumber>),
    /// Random reservation took these numbers
    RandomReserved(Vec<TicketNumber>),
    /// A reservation call succeeded but acquired nothing
    NothingReserved,
    /// Requested numbers (or previously selected ones) are no longer available
    PartialUnavailable(Vec<TicketNumber>),
    /// Random reservation skipped; the quantity is already selected
    QuantityComplete,
    /// Selection released
    Released,
    /// Purchase went through; the visitor is participating
    PurchaseConfirmed,
    /// Something failed
    Failed(GridError),
}

impl Notice {
    /// Presentation level
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Reserved(_) | Self::RandomReserved(_) | Self::Released | Self::PurchaseConfirmed => Severity::Success,
            Self::NothingReserved | Self::PartialUnavailable(_) | Self::QuantityComplete => Severity::Info,
            Self::Failed(_) => Severity::Error,
        }
    }

    /// The error carried by a failure notice
    #[must_use]
    pub const fn error(&self) -> Option<&GridError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<GridError> for Notice {
    fn from(error: GridError) -> Self {
        Self::Failed(error)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved(numbers) => write!(f, "Reserved: {}", join(numbers)),
            Self::RandomReserved(numbers) => write!(f, "Randomly reserved: {}", join(numbers)),
            Self::NothingReserved => f.write_str("No numbers could be reserved"),
            Self::PartialUnavailable(numbers) => write!(f, "No longer available: {}", join(numbers)),
            Self::QuantityComplete => f.write_str("You already selected the requested quantity"),
            Self::Released => f.write_str("Reservations released"),
            Self::PurchaseConfirmed => f.write_str("Purchase confirmed! You are now participating in the raffle"),
            Self::Failed(error) => write!(f, "{error}"),
        }
    }
}
