//! Read-only presentation of a [`GridState`].

use crate::notice::{Notice, Severity};
use crate::paging::PageWindow;
use crate::state::GridState;
use chrono::{DateTime, Utc};
use rifas_core::ticket::{Ticket, TicketState};
use rifas_core::types::{Raffle, TicketNumber};
use serde::Serialize;

/// Why a cell looks the way it does
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellHint {
    /// Free to pick
    Available,
    /// Held by the visitor and still vigente
    ReservedByYou,
    /// Selectable, but the quota is full
    QuotaReached,
    /// Held by someone else or sold
    Unavailable,
}

/// One number in the grid
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CellView {
    /// Ticket number
    pub numero: TicketNumber,
    /// Store state
    pub status: TicketState,
    /// Locally checked
    pub selected: bool,
    /// A click would change the selection
    pub clickable: bool,
    /// Reserved (vigente) or bought by the visitor
    pub mine: bool,
    /// Tooltip category
    pub hint: CellHint,
}

/// A displayable notice
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NoticeView {
    /// Presentation level
    pub severity: Severity,
    /// Text shown to the visitor
    pub message: String,
    /// Structured payload
    pub notice: Notice,
}

impl From<&Notice> for NoticeView {
    fn from(notice: &Notice) -> Self {
        Self {
            severity: notice.severity(),
            message: notice.to_string(),
            notice: notice.clone(),
        }
    }
}

/// Everything a renderer needs for one frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GridView {
    /// Raffle details, once loaded
    pub raffle: Option<Raffle>,
    /// Visible page
    pub window: Option<PageWindow>,
    /// Cells of the visible page, ascending
    pub cells: Vec<CellView>,
    /// Quota N
    pub requested: u32,
    /// Selection size
    pub selected: usize,
    /// Numbers still to pick
    pub remaining: u32,
    /// Selection is full
    pub reached_max: bool,
    /// Round trip outstanding
    pub busy: bool,
    /// Purchase went through
    pub completed: bool,
    /// Offer "confirm all my reservations"
    pub has_own_active_reservations: bool,
    /// Messages from the last action
    pub notices: Vec<NoticeView>,
    /// Reserve button enabled
    pub can_reserve_selected: bool,
    /// Random button enabled
    pub can_reserve_random: bool,
    /// Clear button enabled
    pub can_clear: bool,
    /// Confirm button enabled
    pub can_confirm: bool,
}

impl GridView {
    /// Builds the view of `state` as seen at `now`
    #[must_use]
    pub fn build(state: &GridState, now: DateTime<Utc>) -> Self {
        let window = state.raffle.as_ref().map(|raffle| PageWindow::new(raffle, state.page));
        let cells = window
            .map(|window| {
                state
                    .tickets
                    .range(window.desde..=window.hasta)
                    .map(|(_, ticket)| cell(state, ticket, now))
                    .collect()
            })
            .unwrap_or_default();

        let idle = !state.busy && state.raffle.is_some() && !state.completed;
        let reached_max = state.reached_max();
        let has_selection = !state.selected.is_empty();

        Self {
            raffle: state.raffle.clone(),
            window,
            cells,
            requested: state.quota(),
            selected: state.selected.len(),
            remaining: state.remaining(),
            reached_max,
            busy: state.busy,
            completed: state.completed,
            has_own_active_reservations: state.has_own_active_reservations(now),
            notices: state.notices.iter().map(NoticeView::from).collect(),
            can_reserve_selected: idle && has_selection,
            can_reserve_random: idle && !reached_max,
            can_clear: idle && has_selection,
            can_confirm: idle && state.remaining() == 0,
        }
    }
}

fn cell(state: &GridState, ticket: &Ticket, now: DateTime<Utc>) -> CellView {
    let me = state.participant;
    let selected = state.is_selected(ticket.numero);
    let selectable = ticket.is_selectable_by(me, now);
    let reserved_by_me = ticket.is_reserved_by(me, now);

    let hint = if reserved_by_me {
        CellHint::ReservedByYou
    } else if !selectable {
        CellHint::Unavailable
    } else if state.reached_max() && !selected {
        CellHint::QuotaReached
    } else {
        CellHint::Available
    };

    CellView {
        numero: ticket.numero,
        status: ticket.state(),
        selected,
        clickable: selected || (selectable && !state.reached_max()),
        mine: reserved_by_me || ticket.is_purchased_by(me),
        hint,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rifas_core::ticket::TicketStatus;
    use rifas_core::types::{Money, ParticipantId, ProductId, RaffleId, RaffleStatus, ReservationTtl};
    use rifas_testing::test_time;

    const ME: ParticipantId = ParticipantId::new(1);
    const OTHER: ParticipantId = ParticipantId::new(2);

    fn state(quantity: u32, max: i32) -> GridState {
        let mut state = GridState::new(RaffleId::new(1), ME, quantity, ReservationTtl::default());
        state.raffle = Some(Raffle {
            id: RaffleId::new(1),
            titulo: "Moto".to_string(),
            producto_id: ProductId::new(1),
            rango_min: TicketNumber::new(1),
            rango_max: TicketNumber::new(max),
            precio_numero: Money::from_cents(100),
            estado: RaffleStatus::Abierta,
        });
        let until = Some(test_time() + Duration::minutes(5));
        let tickets = (1..=max)
            .map(|n| {
                let numero = TicketNumber::new(n);
                let status = match n {
                    2 => TicketStatus::Reserved { holder: ME, until },
                    3 => TicketStatus::Reserved { holder: OTHER, until },
                    4 => TicketStatus::Purchased { buyer: Some(ME) },
                    _ => TicketStatus::Available,
                };
                Ticket {
                    numero,
                    status,
                    updated_at: None,
                }
            })
            .collect();
        state.apply_snapshot(tickets, test_time());
        state
    }

    #[test]
    fn cells_carry_hints_and_ownership() {
        let view = GridView::build(&state(2, 10), test_time());

        assert_eq!(view.cells.len(), 10);
        assert_eq!(view.cells[0].hint, CellHint::Available);
        assert_eq!(view.cells[1].hint, CellHint::ReservedByYou);
        assert_eq!(view.cells[2].hint, CellHint::Unavailable);
        assert!(!view.cells[2].clickable);
        assert!(view.cells[3].mine);
        assert_eq!(view.cells[3].status, TicketState::Purchased);
        assert!(view.has_own_active_reservations);
    }

    #[test]
    fn full_quota_locks_unselected_cells() {
        let mut grid = state(1, 10);
        grid.toggle(TicketNumber::new(1), test_time());
        let view = GridView::build(&grid, test_time());

        assert!(view.reached_max);
        assert!(view.cells[0].clickable);
        assert_eq!(view.cells[4].hint, CellHint::QuotaReached);
        assert!(!view.cells[4].clickable);
        assert!(view.can_confirm);
        assert!(!view.can_reserve_random);
    }

    #[test]
    fn only_the_current_page_is_rendered() {
        let mut grid = state(1, 250);
        grid.page = 3;
        let view = GridView::build(&grid, test_time());

        assert_eq!(view.cells.len(), 50);
        assert_eq!(view.cells[0].numero, TicketNumber::new(201));
    }

    #[test]
    fn busy_disables_every_button() {
        let mut grid = state(1, 10);
        grid.toggle(TicketNumber::new(1), test_time());
        grid.busy = true;
        let view = GridView::build(&grid, test_time());

        assert!(!view.can_reserve_selected && !view.can_clear && !view.can_confirm && !view.can_reserve_random);
    }
}
