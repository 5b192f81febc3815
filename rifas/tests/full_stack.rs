//! Grid sessions driving a live server through the HTTP ticket store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rifas::{StorageConfig, build_store};
use rifas_client::HttpTicketStore;
use rifas_core::environment::Clock;
use rifas_core::store::TicketStore;
use rifas_core::types::TicketNumber;
use rifas_grid::{Notice, RaffleGrid};
use rifas_testing::{ManualClock, fixtures, test_time};
use rifas_web::AppState;
use std::sync::Arc;

async fn remote_store(clock: Arc<dyn Clock>) -> Arc<dyn TicketStore> {
    let config = StorageConfig {
        database_url: None,
        max_connections: 1,
    };
    let backend = build_store(&config, clock).await.unwrap();
    let app = rifas_web::router(AppState::new(backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Arc::new(HttpTicketStore::new(format!("http://{addr}")))
}

#[tokio::test]
async fn two_visitors_compete_over_http() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(test_time()));
    let store = remote_store(clock.clone()).await;

    let raffle = fixtures::open_raffle(store.as_ref(), 1, 50).await.unwrap();
    let ana = fixtures::participant(store.as_ref(), &raffle, "Ana", 2).await.unwrap();
    let luis = fixtures::participant(store.as_ref(), &raffle, "Luis", 2).await.unwrap();

    let ana_grid = RaffleGrid::render(store.clone(), clock.clone(), raffle.id, ana.id, 2, 10)
        .await
        .unwrap();
    let luis_grid = RaffleGrid::render(store.clone(), clock.clone(), raffle.id, luis.id, 2, 10)
        .await
        .unwrap();

    // Both pick 5 before either reserves
    ana_grid.toggle(TicketNumber::new(5)).await.unwrap();
    ana_grid.toggle(TicketNumber::new(6)).await.unwrap();
    luis_grid.toggle(TicketNumber::new(5)).await.unwrap();
    luis_grid.toggle(TicketNumber::new(7)).await.unwrap();

    let view = ana_grid.reserve_selected().await.unwrap();
    assert_eq!(view.selected, 2);
    assert!(view.notices.iter().all(|n| n.notice.error().is_none()));

    let view = luis_grid.reserve_selected().await.unwrap();
    assert_eq!(view.selected, 1);
    assert!(
        view.notices
            .iter()
            .any(|n| n.notice == Notice::PartialUnavailable(vec![TicketNumber::new(5)]))
    );

    let view = ana_grid.confirm_selected().await.unwrap();
    assert!(view.completed);

    let view = luis_grid.reserve_random().await.unwrap();
    assert_eq!(view.selected, 2);
    let view = luis_grid.confirm_all_active().await.unwrap();
    assert!(view.completed);

    let ana_numbers = store.tickets_of_participant(raffle.id, ana.id).await.unwrap();
    assert_eq!(ana_numbers, vec![TicketNumber::new(5), TicketNumber::new(6)]);
    let luis_numbers = store.tickets_of_participant(raffle.id, luis.id).await.unwrap();
    assert_eq!(luis_numbers.len(), 2);
    assert!(!luis_numbers.contains(&TicketNumber::new(5)));
}
