//! The number grid reducer.
//!
//! Every store call is an [`Effect::Future`] whose result comes back as a
//! [`GridAction`] event. Store failures become notices; nothing escapes.
//!
//! `busy` is raised when a round trip starts and lowered once the follow-up
//! snapshot has been applied, or right away when the call failed.

use crate::action::{GridAction, PurchaseMode, RefreshOrigin};
use crate::notice::{GridError, Notice};
use crate::paging;
use crate::state::GridState;
use rifas_core::ledger::{PurchaseOutcome, PurchaseSelection, ReleaseOutcome, ReservationOutcome};
use rifas_core::store::{StoreError, TicketStore};
use rifas_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use std::sync::Arc;

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the grid
#[derive(Clone)]
pub struct GridEnvironment {
    /// Ticket store every round trip goes to
    pub store: Arc<dyn TicketStore>,
    /// Clock used for selectability checks
    pub clock: Arc<dyn Clock>,
}

impl GridEnvironment {
    /// Creates a new `GridEnvironment`
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

type Effects = SmallVec<[Effect<GridAction>; 4]>;

/// Reducer for one visitor's number grid
#[derive(Clone, Copy, Debug, Default)]
pub struct GridReducer;

impl GridReducer {
    /// Creates a new `GridReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fetch_raffle(state: &GridState, env: &GridEnvironment) -> Effects {
        let store = Arc::clone(&env.store);
        let raffle = state.raffle_id;
        smallvec![Effect::future(async move {
            Some(GridAction::RaffleLoaded(store.get_raffle(raffle).await))
        })]
    }

    fn refresh(state: &GridState, env: &GridEnvironment, origin: RefreshOrigin) -> Effects {
        let store = Arc::clone(&env.store);
        let raffle = state.raffle_id;
        smallvec![Effect::future(async move {
            Some(GridAction::Refreshed {
                origin,
                result: store.list_tickets(raffle, None).await,
            })
        })]
    }

    /// Marks the grid idle and records a failure
    fn fail(state: &mut GridState, error: GridError) -> Effects {
        tracing::warn!(raffle = %state.raffle_id, participant = %state.participant, %error, "grid action failed");
        state.busy = false;
        state.notices.push(error.into());
        SmallVec::new()
    }

    fn reserve_selected(state: &mut GridState, env: &GridEnvironment) -> Effects {
        if state.selected.is_empty() {
            state.notices.push(GridError::NothingSelected.into());
            return SmallVec::new();
        }

        state.busy = true;
        let store = Arc::clone(&env.store);
        let (raffle, participant, ttl) = (state.raffle_id, state.participant, state.ttl);
        let numbers = state.selected.clone();
        smallvec![Effect::future(async move {
            Some(GridAction::Reserved(
                store.reserve_explicit(raffle, participant, &numbers, ttl).await,
            ))
        })]
    }

    fn reserve_random(state: &mut GridState, env: &GridEnvironment) -> Effects {
        let count = state.remaining();
        if count == 0 {
            state.notices.push(Notice::QuantityComplete);
            return SmallVec::new();
        }

        state.busy = true;
        let store = Arc::clone(&env.store);
        let (raffle, participant, ttl) = (state.raffle_id, state.participant, state.ttl);
        smallvec![Effect::future(async move {
            Some(GridAction::RandomReserved(
                store.reserve_random(raffle, participant, count, ttl).await,
            ))
        })]
    }

    fn clear_selection(state: &mut GridState, env: &GridEnvironment) -> Effects {
        if state.selected.is_empty() {
            return SmallVec::new();
        }

        state.busy = true;
        let store = Arc::clone(&env.store);
        let (raffle, participant) = (state.raffle_id, state.participant);
        let numbers = state.selected.clone();
        smallvec![Effect::future(async move {
            Some(GridAction::Released(
                store.release_reservations(raffle, participant, &numbers).await,
            ))
        })]
    }

    fn confirm(state: &mut GridState, env: &GridEnvironment, mode: PurchaseMode) -> Effects {
        let selection = match mode {
            PurchaseMode::Selected { expected } => {
                let required = state.quota();
                if u32::try_from(expected).ok() != Some(required) {
                    state.notices.push(
                        GridError::SelectionIncomplete {
                            selected: expected,
                            required,
                        }
                        .into(),
                    );
                    return SmallVec::new();
                }
                PurchaseSelection::Numbers(state.selected.clone())
            },
            PurchaseMode::AllActive => PurchaseSelection::AllActive,
        };

        state.busy = true;
        let store = Arc::clone(&env.store);
        let (raffle, participant) = (state.raffle_id, state.participant);
        smallvec![Effect::future(async move {
            Some(GridAction::Purchased {
                mode,
                result: store.confirm_purchase(raffle, participant, &selection).await,
            })
        })]
    }

    fn on_reserved(
        state: &mut GridState,
        env: &GridEnvironment,
        result: Result<ReservationOutcome, StoreError>,
    ) -> Effects {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => return Self::fail(state, GridError::ReservationFailed(error.to_string())),
        };

        tracing::info!(
            raffle = %state.raffle_id,
            reserved = outcome.reserved.len(),
            unavailable = outcome.unavailable.len(),
            "explicit reservation applied"
        );

        state.selected.clear();
        state.merge_capped(outcome.reserved.iter().copied());

        if !outcome.reserved.is_empty() {
            state.notices.push(Notice::Reserved(outcome.reserved));
        }
        if outcome.unavailable.is_empty() {
            if state.selected.is_empty() {
                state.notices.push(Notice::NothingReserved);
            }
        } else {
            state.notices.push(Notice::PartialUnavailable(outcome.unavailable));
        }

        Self::refresh(state, env, RefreshOrigin::AfterMutation)
    }

    fn on_random_reserved(
        state: &mut GridState,
        env: &GridEnvironment,
        result: Result<ReservationOutcome, StoreError>,
    ) -> Effects {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => return Self::fail(state, GridError::ReservationFailed(error.to_string())),
        };

        tracing::info!(raffle = %state.raffle_id, reserved = outcome.reserved.len(), "random reservation applied");

        if outcome.reserved.is_empty() {
            state.notices.push(Notice::NothingReserved);
        } else {
            state.merge_capped(outcome.reserved.iter().copied());
            state.notices.push(Notice::RandomReserved(outcome.reserved));
        }

        Self::refresh(state, env, RefreshOrigin::AfterMutation)
    }

    fn on_released(
        state: &mut GridState,
        env: &GridEnvironment,
        result: Result<ReleaseOutcome, StoreError>,
    ) -> Effects {
        match result {
            Ok(outcome) => {
                tracing::info!(raffle = %state.raffle_id, released = outcome.released.len(), "selection released");
                state.selected.clear();
                state.notices.push(Notice::Released);
                Self::refresh(state, env, RefreshOrigin::AfterMutation)
            },
            Err(error) => Self::fail(state, GridError::ReleaseFailed(error.to_string())),
        }
    }

    fn on_purchased(
        state: &mut GridState,
        env: &GridEnvironment,
        mode: PurchaseMode,
        result: Result<PurchaseOutcome, StoreError>,
    ) -> Effects {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => return Self::fail(state, GridError::PurchaseFailed(error.to_string())),
        };

        let succeeded = match mode {
            PurchaseMode::Selected { expected } => outcome.total() == expected,
            PurchaseMode::AllActive => outcome.total() > 0,
        };

        if succeeded {
            tracing::info!(raffle = %state.raffle_id, purchased = outcome.total(), "purchase confirmed");
            state.completed = true;
            state.selected.clear();
            state.notices.push(Notice::PurchaseConfirmed);
            return Self::refresh(state, env, RefreshOrigin::AfterMutation);
        }

        match mode {
            PurchaseMode::Selected { .. } => {
                tracing::warn!(raffle = %state.raffle_id, invalid = ?outcome.invalid, "purchase incomplete");
                state.notices.push(
                    GridError::PurchaseIncomplete {
                        invalid: outcome.invalid,
                    }
                    .into(),
                );
                Self::refresh(state, env, RefreshOrigin::AfterMutation)
            },
            PurchaseMode::AllActive => Self::fail(
                state,
                GridError::PurchaseFailed("no active reservations to confirm".to_string()),
            ),
        }
    }
}

impl Reducer for GridReducer {
    type State = GridState;
    type Action = GridAction;
    type Environment = GridEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.starts_round_trip() {
            if state.busy {
                tracing::debug!(?action, "ignored while a round trip is outstanding");
                return SmallVec::new();
            }
            if state.completed && is_purchase_command(&action) {
                tracing::debug!(?action, "ignored after the purchase completed");
                return SmallVec::new();
            }
            state.notices.clear();
        }

        match action {
            // ========== Commands ==========
            GridAction::Load => {
                state.busy = true;
                Self::fetch_raffle(state, env)
            },

            GridAction::Reload => {
                state.busy = true;
                if state.raffle.is_none() {
                    Self::fetch_raffle(state, env)
                } else {
                    Self::refresh(state, env, RefreshOrigin::User)
                }
            },

            GridAction::Toggle(numero) => {
                state.toggle(numero, env.clock.now());
                SmallVec::new()
            },

            GridAction::NextPage => {
                state.page = state.page.saturating_add(1);
                clamp_page(state);
                SmallVec::new()
            },

            GridAction::PreviousPage => {
                state.page = state.page.saturating_sub(1);
                clamp_page(state);
                SmallVec::new()
            },

            GridAction::GoToPage(page) => {
                state.page = page;
                clamp_page(state);
                SmallVec::new()
            },

            GridAction::ReserveSelected => Self::reserve_selected(state, env),

            GridAction::ReserveRandom => Self::reserve_random(state, env),

            GridAction::ClearSelection => Self::clear_selection(state, env),

            GridAction::ConfirmSelected => {
                let expected = state.selected.len();
                Self::confirm(state, env, PurchaseMode::Selected { expected })
            },

            GridAction::ConfirmAllActive => Self::confirm(state, env, PurchaseMode::AllActive),

            // ========== Events ==========
            GridAction::RaffleLoaded(Ok(raffle)) => {
                state.raffle = Some(raffle);
                clamp_page(state);
                Self::refresh(state, env, RefreshOrigin::Load)
            },

            GridAction::RaffleLoaded(Err(error)) => Self::fail(state, GridError::LoadFailed(error.to_string())),

            GridAction::Refreshed { origin, result } => match result {
                Ok(tickets) => {
                    let dropped = state.apply_snapshot(tickets, env.clock.now());
                    tracing::debug!(
                        raffle = %state.raffle_id,
                        ?origin,
                        kept = state.selected.len(),
                        dropped = dropped.len(),
                        "selection reconciled"
                    );
                    if !dropped.is_empty() {
                        state.notices.push(Notice::PartialUnavailable(dropped));
                    }
                    state.busy = false;
                    SmallVec::new()
                },
                Err(error) => Self::fail(state, GridError::LoadFailed(error.to_string())),
            },

            GridAction::Reserved(result) => Self::on_reserved(state, env, result),

            GridAction::RandomReserved(result) => Self::on_random_reserved(state, env, result),

            GridAction::Released(result) => Self::on_released(state, env, result),

            GridAction::Purchased { mode, result } => Self::on_purchased(state, env, mode, result),
        }
    }
}

fn clamp_page(state: &mut GridState) {
    let total = state.raffle.as_ref().map_or(1, paging::total_pages);
    state.page = state.page.clamp(1, total);
}

const fn is_purchase_command(action: &GridAction) -> bool {
    matches!(
        action,
        GridAction::ReserveSelected
            | GridAction::ReserveRandom
            | GridAction::ConfirmSelected
            | GridAction::ConfirmAllActive
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rifas_core::memory::InMemoryTicketStore;
    use rifas_core::ticket::{Ticket, TicketStatus};
    use rifas_core::types::{
        Money, ParticipantId, ProductId, Raffle, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
    };
    use rifas_testing::reducer_test::assertions;
    use rifas_testing::{FixedClock, ReducerTest, test_time};

    const ME: ParticipantId = ParticipantId::new(1);
    const OTHER: ParticipantId = ParticipantId::new(2);

    fn env() -> GridEnvironment {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(test_time()));
        GridEnvironment::new(Arc::new(InMemoryTicketStore::new(Arc::clone(&clock))), clock)
    }

    fn raffle(max: i32) -> Raffle {
        Raffle {
            id: RaffleId::new(1),
            titulo: "Moto".to_string(),
            producto_id: ProductId::new(1),
            rango_min: TicketNumber::new(1),
            rango_max: TicketNumber::new(max),
            precio_numero: Money::from_cents(500),
            estado: RaffleStatus::Abierta,
        }
    }

    fn loaded(quantity: u32, max: i32) -> GridState {
        let mut state = GridState::new(RaffleId::new(1), ME, quantity, ReservationTtl::default());
        state.raffle = Some(raffle(max));
        let tickets = (1..=max).map(|n| Ticket::available(TicketNumber::new(n))).collect();
        state.apply_snapshot(tickets, test_time());
        state
    }

    fn numbers(values: &[i32]) -> Vec<TicketNumber> {
        values.iter().copied().map(TicketNumber::new).collect()
    }

    #[test]
    fn toggle_is_local() {
        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(loaded(2, 10))
            .when_action(GridAction::Toggle(TicketNumber::new(3)))
            .when_action(GridAction::Toggle(TicketNumber::new(4)))
            .when_action(GridAction::Toggle(TicketNumber::new(5)))
            .then_state(|state| {
                assert_eq!(state.selected.iter().copied().collect::<Vec<_>>(), numbers(&[3, 4]));
                assert!(state.reached_max());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn commands_are_ignored_while_busy() {
        let mut state = loaded(1, 10);
        state.busy = true;
        state.selected.insert(TicketNumber::new(1));

        for action in [
            GridAction::ReserveSelected,
            GridAction::ReserveRandom,
            GridAction::ClearSelection,
            GridAction::ConfirmSelected,
            GridAction::ConfirmAllActive,
            GridAction::Reload,
        ] {
            ReducerTest::new(GridReducer::new())
                .with_env(env())
                .given_state(state.clone())
                .when_action(action)
                .then_state(|state| assert!(state.busy))
                .then_effects(assertions::assert_no_effects)
                .run();
        }
    }

    #[test]
    fn toggle_still_works_while_busy() {
        let mut state = loaded(2, 10);
        state.busy = true;

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Toggle(TicketNumber::new(7)))
            .then_state(|state| assert!(state.is_selected(TicketNumber::new(7))))
            .run();
    }

    #[test]
    fn reserving_nothing_reports_empty_selection() {
        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(loaded(2, 10))
            .when_action(GridAction::ReserveSelected)
            .then_state(|state| {
                assert!(!state.busy);
                assert_eq!(state.notices, vec![Notice::Failed(GridError::NothingSelected)]);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn random_with_full_quota_skips_the_call() {
        let mut state = loaded(1, 10);
        state.selected.insert(TicketNumber::new(4));

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::ReserveRandom)
            .then_state(|state| assert_eq!(state.notices, vec![Notice::QuantityComplete]))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn confirm_requires_the_full_quantity() {
        let mut state = loaded(3, 10);
        state.selected.insert(TicketNumber::new(4));

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::ConfirmSelected)
            .then_state(|state| {
                assert_eq!(
                    state.notices,
                    vec![Notice::Failed(GridError::SelectionIncomplete {
                        selected: 1,
                        required: 3
                    })]
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn partial_reservation_keeps_only_acquired_numbers() {
        let mut state = loaded(3, 10);
        state.busy = true;
        state.selected.extend(numbers(&[5, 6, 7]));

        let outcome = ReservationOutcome {
            reserved: numbers(&[5, 7]),
            already_mine: vec![],
            unavailable: numbers(&[6]),
        };

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Reserved(Ok(outcome)))
            .then_state(|state| {
                assert!(state.busy);
                assert_eq!(state.selected.iter().copied().collect::<Vec<_>>(), numbers(&[5, 7]));
                assert_eq!(
                    state.notices,
                    vec![
                        Notice::Reserved(numbers(&[5, 7])),
                        Notice::PartialUnavailable(numbers(&[6]))
                    ]
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn failed_reservation_leaves_selection_untouched() {
        let mut state = loaded(2, 10);
        state.busy = true;
        state.selected.extend(numbers(&[1, 2]));

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Reserved(Err(StoreError::Unavailable("timeout".to_string()))))
            .then_state(|state| {
                assert!(!state.busy);
                assert_eq!(state.selected.len(), 2);
                assert!(matches!(
                    state.notices.as_slice(),
                    [Notice::Failed(GridError::ReservationFailed(_))]
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn incomplete_purchase_lists_invalid_numbers_and_refreshes() {
        let mut state = loaded(2, 10);
        state.busy = true;
        state.selected.extend(numbers(&[1, 2]));

        let outcome = PurchaseOutcome {
            purchased: numbers(&[1]),
            invalid: numbers(&[2]),
        };

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Purchased {
                mode: PurchaseMode::Selected { expected: 2 },
                result: Ok(outcome),
            })
            .then_state(|state| {
                assert!(!state.completed);
                assert_eq!(
                    state.notices,
                    vec![Notice::Failed(GridError::PurchaseIncomplete {
                        invalid: numbers(&[2])
                    })]
                );
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn confirm_all_with_nothing_eligible_is_a_failure() {
        let mut state = loaded(2, 10);
        state.busy = true;

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Purchased {
                mode: PurchaseMode::AllActive,
                result: Ok(PurchaseOutcome::default()),
            })
            .then_state(|state| {
                assert!(!state.busy);
                assert!(!state.completed);
                assert!(matches!(
                    state.notices.as_slice(),
                    [Notice::Failed(GridError::PurchaseFailed(_))]
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn post_mutation_refresh_keeps_notices_and_reports_lost_numbers() {
        let mut state = loaded(2, 10);
        state.busy = true;
        state.selected.extend(numbers(&[3, 4]));
        state.notices.push(Notice::Reserved(numbers(&[3, 4])));

        let mut snapshot: Vec<Ticket> = (1..=10).map(|n| Ticket::available(TicketNumber::new(n))).collect();
        snapshot[3] = Ticket {
            numero: TicketNumber::new(4),
            status: TicketStatus::Reserved {
                holder: OTHER,
                until: Some(test_time() + Duration::minutes(5)),
            },
            updated_at: None,
        };

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(GridAction::Refreshed {
                origin: RefreshOrigin::AfterMutation,
                result: Ok(snapshot),
            })
            .then_state(|state| {
                assert!(!state.busy);
                assert_eq!(state.selected.iter().copied().collect::<Vec<_>>(), numbers(&[3]));
                assert_eq!(
                    state.notices,
                    vec![
                        Notice::Reserved(numbers(&[3, 4])),
                        Notice::PartialUnavailable(numbers(&[4]))
                    ]
                );
            })
            .run();
    }

    #[test]
    fn paging_is_clamped_to_the_range() {
        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(loaded(1, 250))
            .when_action(GridAction::GoToPage(7))
            .then_state(|state| assert_eq!(state.page, 3))
            .run();

        ReducerTest::new(GridReducer::new())
            .with_env(env())
            .given_state(loaded(1, 250))
            .when_action(GridAction::PreviousPage)
            .then_state(|state| assert_eq!(state.page, 1))
            .run();
    }

    #[tokio::test]
    async fn load_chains_raffle_then_snapshot() {
        let env = env();
        let created = rifas_testing::fixtures::open_raffle(env.store.as_ref(), 1, 20).await.unwrap();
        let mut state = GridState::new(created.id, ME, 2, ReservationTtl::default());
        let reducer = GridReducer::new();

        let mut effects = reducer.reduce(&mut state, GridAction::Load, &env);
        assert!(state.busy);
        let loaded = assertions::resolve(effects.remove(0)).await.unwrap();
        assert!(matches!(loaded, GridAction::RaffleLoaded(Ok(_))));

        let mut effects = reducer.reduce(&mut state, loaded, &env);
        let refreshed = assertions::resolve(effects.remove(0)).await.unwrap();
        let effects = reducer.reduce(&mut state, refreshed, &env);

        assertions::assert_no_effects(&effects);
        assert!(!state.busy);
        assert_eq!(state.tickets.len(), 20);
        assert!(state.tickets.keys().all(|numero| state.is_selectable(*numero, test_time())));
    }

    #[test]
    fn completed_purchase_ignores_further_commands() {
        for action in [
            GridAction::ReserveSelected,
            GridAction::ReserveRandom,
            GridAction::ConfirmSelected,
            GridAction::ConfirmAllActive,
        ] {
            let mut state = loaded(2, 10);
            state.completed = true;
            state.selected.insert(TicketNumber::new(5));
            state.notices.push(Notice::PurchaseConfirmed);

            ReducerTest::new(GridReducer::new())
                .with_env(env())
                .given_state(state)
                .when_action(action)
                .then_state(|state| {
                    assert!(!state.busy);
                    assert!(state.completed);
                    assert_eq!(state.selected.len(), 1);
                    assert_eq!(state.notices, vec![Notice::PurchaseConfirmed]);
                })
                .then_effects(assertions::assert_no_effects)
                .run();
        }
    }

    proptest! {
        #[test]
        fn toggles_never_exceed_quota(
            quantity in 0u32..6,
            toggles in proptest::collection::vec(1i32..=30, 0..80),
        ) {
            let reducer = GridReducer::new();
            let env = env();
            let mut state = loaded(quantity, 30);

            for numero in toggles {
                let _ = reducer.reduce(&mut state, GridAction::Toggle(TicketNumber::new(numero)), &env);
                prop_assert!(state.selected.len() <= state.quota() as usize);
            }
        }
    }
}
