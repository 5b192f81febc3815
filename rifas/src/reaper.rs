//! Background release of lapsed reservations.

use rifas_core::store::{StoreError, TicketStore};
use rifas_core::types::RaffleStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs `release_expired` once for every open raffle; returns the total released
///
/// A failing raffle is logged and skipped so one bad raffle does not stall the rest.
///
/// # Errors
///
/// Only listing the open raffles can fail the sweep.
pub async fn sweep(store: &dyn TicketStore) -> Result<u32, StoreError> {
    let raffles = store.list_raffles(Some(RaffleStatus::Abierta)).await?;
    let mut total = 0;

    for raffle in raffles {
        match store.release_expired(raffle.id).await {
            Ok(released) => total += released,
            Err(error) => tracing::warn!(raffle = %raffle.id, %error, "Expiry sweep failed"),
        }
    }

    if total > 0 {
        tracing::info!(released = total, "Expiry sweep released reservations");
    }
    Ok(total)
}

/// Spawns a task that sweeps every `interval` until aborted
#[must_use]
pub fn spawn(store: Arc<dyn TicketStore>, interval: Duration) -> JoinHandle<()> {
    tracing::info!(interval_secs = interval.as_secs(), "Expiry reaper started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = sweep(store.as_ref()).await {
                tracing::warn!(%error, "Could not list raffles for expiry sweep");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rifas_core::environment::Clock;
    use rifas_core::memory::InMemoryTicketStore;
    use rifas_core::types::{ReservationTtl, TicketNumber};
    use rifas_testing::{ManualClock, fixtures, test_time};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn sweep_releases_only_open_raffles() {
        let clock = Arc::new(ManualClock::new(test_time()));
        let as_clock: Arc<dyn Clock> = clock.clone();
        let store = InMemoryTicketStore::new(as_clock);

        let open = fixtures::open_raffle(&store, 1, 10).await.unwrap();
        let paused = fixtures::open_raffle(&store, 1, 10).await.unwrap();
        let ana = fixtures::participant(&store, &open, "Ana", 2).await.unwrap();
        let luis = fixtures::participant(&store, &paused, "Luis", 2).await.unwrap();
        let numbers: BTreeSet<TicketNumber> = [TicketNumber::new(1), TicketNumber::new(2)].into();
        let ttl = ReservationTtl::from_minutes(1);

        store.reserve_explicit(open.id, ana.id, &numbers, ttl).await.unwrap();
        store.reserve_explicit(paused.id, luis.id, &numbers, ttl).await.unwrap();
        store.set_raffle_status(paused.id, RaffleStatus::Pausada).await.unwrap();

        assert_eq!(sweep(&store).await.unwrap(), 0);

        clock.advance(ChronoDuration::minutes(2));
        assert_eq!(sweep(&store).await.unwrap(), 2);
        assert_eq!(store.release_expired(paused.id).await.unwrap(), 2);
    }
}
