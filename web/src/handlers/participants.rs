//! Participant registration and review routes.

use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rifas_core::types::{NewParticipant, Participant, ParticipantId};
use rifas_core::wire::ParticipantStatusUpdate;

/// `POST /participantes`
///
/// Approval starts as `pendiente`.
///
/// # Errors
///
/// 404 for an unknown raffle, 422 for missing identity fields or a payment
/// option the raffle does not offer.
#[tracing::instrument(skip(state, participant), fields(raffle = %participant.rifa_id))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(participant): ApiJson<NewParticipant>,
) -> Result<(StatusCode, Json<Participant>), AppError> {
    let participant = state.store.register_participant(participant).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

/// `GET /participantes/:id`
///
/// # Errors
///
/// 404 for an unknown participant.
#[tracing::instrument(skip(state))]
pub async fn get(State(state): State<AppState>, Path(id): Path<ParticipantId>) -> Result<Json<Participant>, AppError> {
    Ok(Json(state.store.get_participant(id).await?))
}

/// `PUT /admin/participantes/:id/estado` with `{"nuevo_estado": "aprobado"}`
///
/// Replies with the reviewed participant.
///
/// # Errors
///
/// 404 for an unknown participant, 422 for an unknown status.
#[tracing::instrument(skip(state))]
pub async fn review(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
    ApiJson(update): ApiJson<ParticipantStatusUpdate>,
) -> Result<Json<Participant>, AppError> {
    let participant = state.store.set_participant_status(id, update.nuevo_estado).await?;
    tracing::info!(participant = %id, estado = participant.estado.as_str(), "Participant reviewed");
    Ok(Json(participant))
}
