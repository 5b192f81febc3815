//! REST API over a raffle [`TicketStore`](rifas_core::store::TicketStore).
//!
//! The handlers are a thin shell: decode the JSON body, call the store, encode
//! the reply. Concurrency between visitors is resolved inside the store.
//!
//! # Routes
//!
//! ```text
//! GET    /health
//! GET    /health/ready
//! GET    /rifas                       ?estado=
//! POST   /rifas
//! GET    /rifas/:id
//! PATCH  /rifas/:id                   {titulo?, precio_numero?, estado?, rango_min?, ...}
//! DELETE /rifas/:id
//! GET    /rifas/:id/numeros           ?desde=&hasta=
//! GET    /rifas/:id/payment_options
//! GET    /admin/rifas/:id/payment_options
//! POST   /rifas/:id/reservas          {participanteId, numeros, minutosReserva}
//! DELETE /rifas/:id/reservas          {participanteId, numeros}
//! POST   /rifas/:id/reservas/aleatorias {participanteId, cantidad, minutosReserva}
//! POST   /rifas/:id/compras           {rifaId, participanteId, numeros}
//! POST   /rifas/:id/liberar-vencidas
//! GET    /rifas/:id/participantes/:pid/tickets
//! POST   /participantes
//! GET    /participantes/:id
//! PUT    /admin/participantes/:id/estado {nuevo_estado}
//! ```
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryTicketStore::new(Arc::new(SystemClock)));
//! let app = rifas_web::router(AppState::new(store));
//! axum::serve(listener, app).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};
use handlers::{participants, raffles, reservations};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use extractors::ApiJson;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id};
pub use rifas_core::wire::ErrorBody;
pub use state::AppState;

/// Builds the full API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/rifas", get(raffles::list_raffles).post(raffles::create_raffle))
        .route(
            "/rifas/:id",
            get(raffles::get_raffle)
                .patch(raffles::update_raffle)
                .delete(raffles::delete_raffle),
        )
        .route("/rifas/:id/numeros", get(raffles::list_tickets))
        .route("/rifas/:id/payment_options", get(raffles::payment_options))
        .route("/admin/rifas/:id/payment_options", get(raffles::all_payment_options))
        .route(
            "/rifas/:id/reservas",
            post(reservations::reserve).delete(reservations::release),
        )
        .route("/rifas/:id/reservas/aleatorias", post(reservations::reserve_random))
        .route("/rifas/:id/compras", post(reservations::purchase))
        .route("/rifas/:id/liberar-vencidas", post(reservations::release_expired))
        .route(
            "/rifas/:id/participantes/:pid/tickets",
            get(reservations::participant_tickets),
        )
        .route("/participantes", post(participants::register))
        .route("/participantes/:id", get(participants::get))
        .route("/admin/participantes/:id/estado", put(participants::review))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(correlation_id))
        .with_state(state)
}
