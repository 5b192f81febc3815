//! Reservation, purchase and expiry routes.

use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use rifas_core::types::{ParticipantId, RaffleId, TicketNumber};
use rifas_core::wire::{
    ExpiredReply, PurchaseReply, PurchaseRequest, RandomReserveRequest, ReleaseReply, ReleaseRequest,
    ReservationReply, ReserveRequest,
};
use std::collections::BTreeSet;

/// `POST /rifas/:id/reservas`
///
/// # Errors
///
/// 404 for an unknown raffle, 409 `RAFFLE_NOT_OPEN` outside `ABIERTA`.
#[tracing::instrument(skip(state, request), fields(participant = %request.participante_id))]
pub async fn reserve(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    ApiJson(request): ApiJson<ReserveRequest>,
) -> Result<Json<ReservationReply>, AppError> {
    let outcome = state
        .store
        .reserve_explicit(id, request.participante_id, &request.numbers(), request.ttl())
        .await?;
    Ok(Json(ReservationReply::new(id, outcome)))
}

/// `POST /rifas/:id/reservas/aleatorias`
///
/// # Errors
///
/// 404 for an unknown raffle, 409 `RAFFLE_NOT_OPEN` outside `ABIERTA`.
#[tracing::instrument(skip(state, request), fields(participant = %request.participante_id, cantidad = request.cantidad))]
pub async fn reserve_random(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    ApiJson(request): ApiJson<RandomReserveRequest>,
) -> Result<Json<ReservationReply>, AppError> {
    let outcome = state
        .store
        .reserve_random(id, request.participante_id, request.cantidad, request.ttl())
        .await?;
    Ok(Json(ReservationReply::new(id, outcome)))
}

/// `DELETE /rifas/:id/reservas`
///
/// Only the caller's own holds are released.
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state, request), fields(participant = %request.participante_id))]
pub async fn release(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    ApiJson(request): ApiJson<ReleaseRequest>,
) -> Result<Json<ReleaseReply>, AppError> {
    let numbers: BTreeSet<_> = request.numeros.iter().copied().collect();
    let outcome = state
        .store
        .release_reservations(id, request.participante_id, &numbers)
        .await?;
    Ok(Json(ReleaseReply::new(id, outcome)))
}

/// `POST /rifas/:id/compras`
///
/// An empty `numeros` list confirms every vigente reservation of the caller.
///
/// # Errors
///
/// 400 when the body names another raffle, 409 `RAFFLE_NOT_OPEN` outside
/// `ABIERTA`.
#[tracing::instrument(skip(state, request), fields(participant = %request.participante_id))]
pub async fn purchase(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
    ApiJson(request): ApiJson<PurchaseRequest>,
) -> Result<Json<PurchaseReply>, AppError> {
    if let Some(body_id) = request.rifa_id.filter(|body_id| *body_id != id) {
        return Err(AppError::bad_request(format!(
            "rifaId {body_id} does not match raffle {id}"
        )));
    }

    let outcome = state
        .store
        .confirm_purchase(id, request.participante_id, &request.selection())
        .await?;
    Ok(Json(PurchaseReply::new(id, outcome)))
}

/// `POST /rifas/:id/liberar-vencidas`
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn release_expired(
    State(state): State<AppState>,
    Path(id): Path<RaffleId>,
) -> Result<Json<ExpiredReply>, AppError> {
    let liberadas = state.store.release_expired(id).await?;
    Ok(Json(ExpiredReply { rifa_id: id, liberadas }))
}

/// `GET /rifas/:id/participantes/:pid/tickets`, a bare array of numbers
///
/// # Errors
///
/// 404 for an unknown raffle.
#[tracing::instrument(skip(state))]
pub async fn participant_tickets(
    State(state): State<AppState>,
    Path((id, participant)): Path<(RaffleId, ParticipantId)>,
) -> Result<Json<Vec<TicketNumber>>, AppError> {
    Ok(Json(state.store.tickets_of_participant(id, participant).await?))
}
