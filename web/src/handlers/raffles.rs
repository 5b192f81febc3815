//! Raffle and ticket listing routes.

use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rifas_core::types::{NewRaffle, PaymentOption, Raffle, RaffleId, RafflePatch};
use rifas_core::wire::{MessageReply, RaffleFilter, RangeQuery, WireTicket};

/// `GET /rifas?estado=ABIERTA`
///
/// # Errors
///
/// Store failures, see [`AppError`].
#[tracing::instrument(skip(state))]
pub async fn list_raffles(
    State(state): State<AppState>,
    Query(filter): Query<RaffleFilter>,
) -> Result<Json<Vec<Raffle>>, AppError> {
    Ok(Json(state.store.list_raffles(filter.estado).await?))
}

/// `POST /rifas`
///
/// The raffle starts as `CREADA` with every number available.
///
/// # Errors
///
/// 422 when the range, price or title is invalid.
#[tracing::instrument(skip(state, raffle), fields(titulo = %raffle.titulo))]
pub async fn create_raffle(
    State(state): State<AppState>,
    ApiJson(raffle): ApiJson<NewRaffle>,
) -> Result<(StatusCode, Json<Raffle>), AppError> {
    let raffle = state.store.create_raffle(raffle).await?;
    tracing::info!(raffle = %raffle.id, total = raffle.total_numbers(), "Raffle created");
    Ok((StatusCode::CREATED, Json(raffle)))
}

/// `GET /rifas/:id`
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn get_raffle(State(state): State<AppState>, Path(id): Path<RaffleId>) -> Result<Json<Raffle>, AppError> {
    Ok(Json(state.store.get_raffle(id).await?))
}

/// `PATCH /rifas/:id` with any subset of the raffle fields
///
/// # Errors
///
/// 404 for an unknown raffle, 422 when the result is invalid, 409 when the
/// range moves while numbers are reserved or sold.
#[tracing::instrument(skip(state, patch))]
pub async fn update_raffle(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    ApiJson(patch): ApiJson<RafflePatch>,
) -> Result<Json<Raffle>, AppError> {
    let raffle = state.store.update_raffle(id, patch).await?;
    tracing::info!(raffle = %raffle.id, estado = %raffle.estado, "Raffle updated");
    Ok(Json(raffle))
}

/// `DELETE /rifas/:id`
///
/// Tickets, participants and payment options go with the raffle.
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn delete_raffle(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
) -> Result<Json<MessageReply>, AppError> {
    state.store.delete_raffle(id).await?;
    Ok(Json(MessageReply {
        msg: format!("Rifa {id} eliminada"),
    }))
}

/// `GET /rifas/:id/payment_options`, the options a visitor may choose
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn payment_options(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
) -> Result<Json<Vec<PaymentOption>>, AppError> {
    let mut options = state.store.list_payment_options(id).await?;
    options.retain(|option| option.is_active);
    Ok(Json(options))
}

/// `GET /admin/rifas/:id/payment_options`, inactive options included
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn all_payment_options(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
) -> Result<Json<Vec<PaymentOption>>, AppError> {
    Ok(Json(state.store.list_payment_options(id).await?))
}

/// `GET /rifas/:id/numeros?desde=1&hasta=100`
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn list_tickets(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<WireTicket>>, AppError> {
    let tickets = state.store.list_tickets(id, range.range()).await?;
    Ok(Json(tickets.iter().map(|t| WireTicket::from_ticket(id, t)).collect()))
}
