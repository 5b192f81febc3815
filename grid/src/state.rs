//! Selection session state.
//!
//! The selection is a cache over the last ticket snapshot. It is rebuilt from
//! every snapshot instead of being merged field by field.

use crate::notice::Notice;
use chrono::{DateTime, Utc};
use rifas_core::ticket::Ticket;
use rifas_core::types::{ParticipantId, Raffle, RaffleId, ReservationTtl, TicketNumber};
use std::collections::{BTreeMap, BTreeSet};

/// State of one visitor's number grid
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridState {
    /// Raffle shown
    pub raffle_id: RaffleId,
    /// Visitor
    pub participant: ParticipantId,
    /// Quantity asked for in the previous step (raw, may be 0)
    pub desired_quantity: u32,
    /// Hold requested for every reservation
    pub ttl: ReservationTtl,
    /// Raffle details once loaded
    pub raffle: Option<Raffle>,
    /// Last ticket snapshot, keyed by number
    pub tickets: BTreeMap<TicketNumber, Ticket>,
    /// When the snapshot was taken
    pub synced_at: Option<DateTime<Utc>>,
    /// Locally checked numbers
    pub selected: BTreeSet<TicketNumber>,
    /// Current page, 1-based
    pub page: u32,
    /// A round trip is outstanding
    pub busy: bool,
    /// A purchase went through
    pub completed: bool,
    /// Messages from the last user action
    pub notices: Vec<Notice>,
}

impl GridState {
    /// Fresh session, nothing loaded yet
    #[must_use]
    pub fn new(raffle_id: RaffleId, participant: ParticipantId, desired_quantity: u32, ttl: ReservationTtl) -> Self {
        Self {
            raffle_id,
            participant,
            desired_quantity,
            ttl,
            raffle: None,
            tickets: BTreeMap::new(),
            synced_at: None,
            selected: BTreeSet::new(),
            page: 1,
            busy: false,
            completed: false,
            notices: Vec::new(),
        }
    }

    /// The quota `N = max(1, desired_quantity)`
    #[must_use]
    pub const fn quota(&self) -> u32 {
        if self.desired_quantity == 0 { 1 } else { self.desired_quantity }
    }

    fn quota_len(&self) -> usize {
        usize::try_from(self.quota()).unwrap_or(usize::MAX)
    }

    /// `|selected| >= N`
    #[must_use]
    pub fn reached_max(&self) -> bool {
        self.selected.len() >= self.quota_len()
    }

    /// `max(0, N - |selected|)`
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let selected = u32::try_from(self.selected.len()).unwrap_or(u32::MAX);
        self.quota().saturating_sub(selected)
    }

    /// Whether `numero` is checked
    #[must_use]
    pub fn is_selected(&self, numero: TicketNumber) -> bool {
        self.selected.contains(&numero)
    }

    /// Whether the visitor may check `numero` at `now`, ignoring the quota
    #[must_use]
    pub fn is_selectable(&self, numero: TicketNumber, now: DateTime<Utc>) -> bool {
        self.tickets
            .get(&numero)
            .is_some_and(|t| t.is_selectable_by(self.participant, now))
    }

    /// Whether the visitor holds at least one vigente reservation
    #[must_use]
    pub fn has_own_active_reservations(&self, now: DateTime<Utc>) -> bool {
        self.tickets.values().any(|t| t.is_reserved_by(self.participant, now))
    }

    /// Checks or unchecks `numero`
    ///
    /// Unchecking always works. Checking needs a selectable number and a free
    /// slot in the quota; otherwise nothing changes. Returns whether the
    /// selection changed.
    pub fn toggle(&mut self, numero: TicketNumber, now: DateTime<Utc>) -> bool {
        if self.selected.remove(&numero) {
            return true;
        }
        if self.reached_max() || !self.is_selectable(numero, now) {
            return false;
        }
        self.selected.insert(numero)
    }

    /// Adds numbers in ascending order until the quota is full
    pub fn merge_capped(&mut self, numbers: impl IntoIterator<Item = TicketNumber>) {
        let mut incoming: Vec<TicketNumber> = numbers.into_iter().collect();
        incoming.sort_unstable();
        for numero in incoming {
            if self.reached_max() {
                break;
            }
            self.selected.insert(numero);
        }
    }

    /// Replaces the snapshot and rebuilds the selection from it
    ///
    /// A checked number survives iff it is still selectable by the visitor or
    /// was bought by them. Returns the numbers that were dropped.
    pub fn apply_snapshot(&mut self, tickets: Vec<Ticket>, now: DateTime<Utc>) -> Vec<TicketNumber> {
        self.tickets = tickets.into_iter().map(|t| (t.numero, t)).collect();
        self.synced_at = Some(now);

        let participant = self.participant;
        let tickets = &self.tickets;
        let (kept, dropped): (BTreeSet<TicketNumber>, BTreeSet<TicketNumber>) =
            self.selected.iter().partition(|numero| {
                tickets
                    .get(numero)
                    .is_some_and(|t| t.is_selectable_by(participant, now) || t.is_purchased_by(participant))
            });

        self.selected = kept;
        dropped.into_iter().collect()
    }
}
