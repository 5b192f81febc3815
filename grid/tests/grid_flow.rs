//! End-to-end grid sessions against the in-memory ticket store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration;
use rifas_core::environment::Clock;
use rifas_core::memory::InMemoryTicketStore;
use rifas_core::store::TicketStore;
use rifas_core::ticket::TicketState;
use rifas_core::types::{ParticipantId, Raffle, RaffleStatus, ReservationTtl, TicketNumber};
use rifas_grid::{CellHint, GridError, Notice, RaffleGrid};
use rifas_testing::{ManualClock, fixtures, test_time};
use std::collections::BTreeSet;
use std::sync::Arc;

struct World {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryTicketStore>,
    raffle: Raffle,
}

impl World {
    async fn new(min: i32, max: i32) -> Self {
        let clock = Arc::new(ManualClock::new(test_time()));
        let store = Arc::new(InMemoryTicketStore::with_seed(clock.clone(), 7));
        let raffle = fixtures::open_raffle(store.as_ref(), min, max).await.unwrap();
        Self { clock, store, raffle }
    }

    async fn visitor(&self, name: &str, quantity: u32) -> ParticipantId {
        fixtures::participant(self.store.as_ref(), &self.raffle, name, quantity)
            .await
            .unwrap()
            .id
    }

    async fn grid(&self, participant: ParticipantId, quantity: u32) -> RaffleGrid {
        let store: Arc<dyn TicketStore> = self.store.clone();
        let clock: Arc<dyn Clock> = self.clock.clone();
        RaffleGrid::render(store, clock, self.raffle.id, participant, quantity, 10)
            .await
            .unwrap()
    }
}

fn set(values: &[i32]) -> BTreeSet<TicketNumber> {
    values.iter().copied().map(TicketNumber::new).collect()
}

fn numbers(values: &[i32]) -> Vec<TicketNumber> {
    values.iter().copied().map(TicketNumber::new).collect()
}

#[tokio::test]
async fn render_loads_the_first_page() {
    let world = World::new(1, 250).await;
    let me = world.visitor("Ana", 2).await;
    let grid = world.grid(me, 2).await;

    let view = grid.view().await;
    let window = view.window.unwrap();
    assert_eq!(window.total_pages, 3);
    assert_eq!(view.cells.len(), 100);
    assert!(!view.busy);
    assert!(view.notices.is_empty());

    let view = grid.go_to_page(3).await.unwrap();
    assert_eq!(view.cells.len(), 50);

    let view = grid.next_page().await.unwrap();
    assert_eq!(view.window.unwrap().page, 3);
    let view = grid.previous_page().await.unwrap();
    assert_eq!(view.window.unwrap().page, 2);
    assert_eq!(view.cells.len(), 100);
}

#[tokio::test]
async fn render_of_unknown_raffle_reports_load_failure() {
    let world = World::new(1, 10).await;
    let store: Arc<dyn TicketStore> = world.store.clone();
    let clock: Arc<dyn Clock> = world.clock.clone();
    let grid = RaffleGrid::render(store, clock, rifas_core::types::RaffleId::new(999), ParticipantId::new(1), 1, 10)
        .await
        .unwrap();

    let view = grid.view().await;
    assert!(!view.busy);
    assert!(matches!(
        view.notices[0].notice,
        Notice::Failed(GridError::LoadFailed(_))
    ));
}

#[tokio::test]
async fn explicit_reservation_reports_numbers_taken_by_others() {
    let world = World::new(1, 100).await;
    let me = world.visitor("Ana", 3).await;
    let rival = world.visitor("Luis", 1).await;

    world
        .store
        .reserve_explicit(world.raffle.id, rival, &set(&[6]), ReservationTtl::default())
        .await
        .unwrap();

    let grid = world.grid(me, 3).await;
    for n in [5, 6, 7] {
        grid.toggle(TicketNumber::new(n)).await.unwrap();
    }
    // 6 is not selectable for us, so only 5 and 7 were checked
    let view = grid.view().await;
    assert_eq!(view.selected, 2);

    let view = grid.reserve_selected().await.unwrap();
    assert_eq!(view.notices[0].notice, Notice::Reserved(numbers(&[5, 7])));
    assert!(view.has_own_active_reservations);
    assert!(!view.busy);

    let state = grid.state().await;
    assert_eq!(state.selected, set(&[5, 7]));
    assert_eq!(state.tickets[&TicketNumber::new(6)].holder(), Some(rival));
}

#[tokio::test]
async fn lost_race_is_reconciled_on_reserve() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 2).await;
    let rival = world.visitor("Luis", 1).await;

    let grid = world.grid(me, 2).await;
    grid.toggle(TicketNumber::new(3)).await.unwrap();
    grid.toggle(TicketNumber::new(4)).await.unwrap();

    // rival wins number 4 after our snapshot was taken
    world
        .store
        .reserve_explicit(world.raffle.id, rival, &set(&[4]), ReservationTtl::default())
        .await
        .unwrap();

    let view = grid.reserve_selected().await.unwrap();
    let notices: Vec<Notice> = view.notices.iter().map(|n| n.notice.clone()).collect();
    assert_eq!(
        notices,
        vec![
            Notice::Reserved(numbers(&[3])),
            Notice::PartialUnavailable(numbers(&[4]))
        ]
    );
    assert_eq!(view.selected, 1);
    assert_eq!(view.remaining, 1);
}

#[tokio::test]
async fn random_fill_then_confirm_completes_the_purchase() {
    let world = World::new(1, 30).await;
    let me = world.visitor("Ana", 3).await;
    let grid = world.grid(me, 3).await;

    grid.toggle(TicketNumber::new(10)).await.unwrap();
    grid.reserve_selected().await.unwrap();

    let view = grid.reserve_random().await.unwrap();
    assert_eq!(view.selected, 3);
    assert!(view.reached_max);
    assert!(view.can_confirm);

    let view = grid.confirm_selected().await.unwrap();
    assert!(view.completed);
    assert_eq!(view.selected, 0);
    assert_eq!(view.notices[0].notice, Notice::PurchaseConfirmed);

    let mine = world.store.tickets_of_participant(world.raffle.id, me).await.unwrap();
    assert_eq!(mine.len(), 3);
    assert!(mine.contains(&TicketNumber::new(10)));
}

#[tokio::test]
async fn random_when_quota_is_full_makes_no_call() {
    let world = World::new(1, 10).await;
    let me = world.visitor("Ana", 1).await;
    let grid = world.grid(me, 1).await;

    grid.toggle(TicketNumber::new(2)).await.unwrap();
    let view = grid.reserve_random().await.unwrap();

    assert_eq!(view.notices[0].notice, Notice::QuantityComplete);
    let mine = world.store.tickets_of_participant(world.raffle.id, me).await.unwrap();
    assert!(mine.is_empty());
}

#[tokio::test]
async fn random_with_scarce_stock_reserves_what_is_left() {
    let world = World::new(1, 4).await;
    let me = world.visitor("Ana", 5).await;
    let rival = world.visitor("Luis", 2).await;
    world
        .store
        .reserve_explicit(world.raffle.id, rival, &set(&[1, 2]), ReservationTtl::default())
        .await
        .unwrap();

    let grid = world.grid(me, 5).await;
    let view = grid.reserve_random().await.unwrap();

    assert_eq!(view.selected, 2);
    assert_eq!(view.remaining, 3);
    assert_eq!(view.notices[0].notice, Notice::RandomReserved(numbers(&[3, 4])));
}

#[tokio::test]
async fn expired_reservation_cannot_be_confirmed() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 1).await;
    let grid = world.grid(me, 1).await;

    grid.toggle(TicketNumber::new(10)).await.unwrap();
    grid.reserve_selected().await.unwrap();

    world.clock.advance(Duration::minutes(10) + Duration::seconds(1));

    let view = grid.confirm_selected().await.unwrap();
    assert!(!view.completed);
    let notices: Vec<Notice> = view.notices.iter().map(|n| n.notice.clone()).collect();
    assert_eq!(
        notices[0],
        Notice::Failed(GridError::PurchaseIncomplete {
            invalid: numbers(&[10])
        })
    );
    // the lapsed hold is dropped from the selection on the follow-up refresh
    assert_eq!(view.selected, 0);
    assert_eq!(notices[1], Notice::PartialUnavailable(numbers(&[10])));
}

#[tokio::test]
async fn confirm_all_active_without_reservations_fails_visibly() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 2).await;
    let grid = world.grid(me, 2).await;

    let view = grid.confirm_all_active().await.unwrap();

    assert!(!view.completed);
    assert!(!view.busy);
    assert!(matches!(
        view.notices[0].notice,
        Notice::Failed(GridError::PurchaseFailed(_))
    ));
}

#[tokio::test]
async fn confirm_all_active_recovers_an_earlier_session() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 2).await;
    world
        .store
        .reserve_explicit(world.raffle.id, me, &set(&[8, 9]), ReservationTtl::default())
        .await
        .unwrap();

    let grid = world.grid(me, 2).await;
    let before = grid.view().await;
    assert!(before.has_own_active_reservations);
    assert_eq!(before.cells[7].hint, CellHint::ReservedByYou);

    let view = grid.confirm_all_active().await.unwrap();
    assert!(view.completed);
    assert_eq!(view.cells[7].status, TicketState::Purchased);
    assert!(view.cells[8].mine);
}

#[tokio::test]
async fn clear_selection_releases_holds() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 2).await;
    let grid = world.grid(me, 2).await;

    grid.toggle(TicketNumber::new(1)).await.unwrap();
    grid.toggle(TicketNumber::new(2)).await.unwrap();
    grid.reserve_selected().await.unwrap();

    let view = grid.clear_selection().await.unwrap();
    assert_eq!(view.selected, 0);
    assert_eq!(view.notices[0].notice, Notice::Released);
    assert!(!view.has_own_active_reservations);

    let tickets = world.store.list_tickets(world.raffle.id, None).await.unwrap();
    assert!(tickets.iter().all(|t| t.is_available()));
}

#[tokio::test]
async fn closed_raffle_rejects_reservation_but_grid_stays_usable() {
    let world = World::new(1, 20).await;
    let me = world.visitor("Ana", 1).await;
    let grid = world.grid(me, 1).await;

    world
        .store
        .set_raffle_status(world.raffle.id, RaffleStatus::Cerrada)
        .await
        .unwrap();

    grid.toggle(TicketNumber::new(4)).await.unwrap();
    let view = grid.reserve_selected().await.unwrap();
    assert!(matches!(
        view.notices[0].notice,
        Notice::Failed(GridError::ReservationFailed(_))
    ));
    assert_eq!(view.selected, 1);

    let view = grid.reload().await.unwrap();
    assert!(view.notices.is_empty());
    assert!(!view.busy);
}

#[tokio::test]
async fn closed_grid_rejects_commands() {
    let world = World::new(1, 10).await;
    let me = world.visitor("Ana", 1).await;
    let grid = world.grid(me, 1).await;

    grid.close(std::time::Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        grid.toggle(TicketNumber::new(1)).await.unwrap_err(),
        rifas_runtime::RuntimeError::ShutdownInProgress
    );
}
