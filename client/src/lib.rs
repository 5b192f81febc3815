//! # Rifas Client
//!
//! [`HttpTicketStore`] implements [`TicketStore`] against the raffle REST
//! API, so a grid or any other consumer can run against a remote server with
//! the same contract as the in-memory and Postgres stores.
//!
//! Error replies carry a `code` that is mapped back onto [`StoreError`];
//! transport failures become [`StoreError::Unavailable`].
//!
//! ```ignore
//! let store = HttpTicketStore::new("http://localhost:8000").with_token(token);
//! let raffle = store.get_raffle(RaffleId::new(1)).await?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rifas_core::ledger::{PurchaseOutcome, PurchaseSelection, ReleaseOutcome, ReservationOutcome};
use rifas_core::store::{StoreError, TicketStore};
use rifas_core::ticket::Ticket;
use rifas_core::types::{
    ApprovalStatus, NewParticipant, NewRaffle, NumberRange, Participant, ParticipantId, PaymentOption, Raffle,
    RafflePatch, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
};
use rifas_core::wire::{
    ErrorBody, ExpiredReply, MessageReply, ParticipantStatusUpdate, PurchaseReply, PurchaseRequest, RaffleFilter,
    RandomReserveRequest, RangeQuery, ReleaseReply, ReleaseRequest, ReservationReply, ReserveRequest, WireTicket,
    error_codes,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

/// Ticket store backed by the REST API
#[derive(Clone, Debug)]
pub struct HttpTicketStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTicketStore {
    /// Client for the API rooted at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Reuses an existing `reqwest` client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Sends `Authorization: Bearer <token>` on every call
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// API root this client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        tracing::debug!(%status, body = %text, "API call failed");
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => map_error(status, body),
            Err(_) => fallback_error(status, text),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotOpenDetails {
    rifa_id: RaffleId,
    estado: RaffleStatus,
}

/// Maps an API error body back onto the store taxonomy
fn map_error(status: StatusCode, body: ErrorBody) -> StoreError {
    match body.code.as_str() {
        error_codes::NOT_FOUND => StoreError::NotFound(body.message),
        error_codes::RAFFLE_NOT_OPEN => body
            .details
            .and_then(|details| serde_json::from_value::<NotOpenDetails>(details).ok())
            .map_or(StoreError::Conflict(body.message), |d| StoreError::RaffleNotOpen {
                raffle: d.rifa_id,
                status: d.estado,
            }),
        error_codes::CONFLICT => StoreError::Conflict(body.message),
        error_codes::VALIDATION_ERROR | error_codes::BAD_REQUEST => StoreError::Validation(body.message),
        error_codes::DECODE_ERROR => StoreError::Decode(body.message),
        error_codes::SERVICE_UNAVAILABLE => StoreError::Unavailable(body.message),
        _ => fallback_error(status, body.message),
    }
}

fn fallback_error(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(message),
        _ => StoreError::Unavailable(format!("{status}: {message}")),
    }
}

#[async_trait]
impl TicketStore for HttpTicketStore {
    #[tracing::instrument(skip(self, raffle))]
    async fn create_raffle(&self, raffle: NewRaffle) -> Result<Raffle, StoreError> {
        self.send(self.request(Method::POST, "/rifas").json(&raffle)).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_raffles(&self, status: Option<RaffleStatus>) -> Result<Vec<Raffle>, StoreError> {
        let filter = RaffleFilter { estado: status };
        self.send(self.request(Method::GET, "/rifas").query(&filter)).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_raffle(&self, id: RaffleId) -> Result<Raffle, StoreError> {
        self.send(self.request(Method::GET, &format!("/rifas/{id}"))).await
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update_raffle(&self, id: RaffleId, patch: RafflePatch) -> Result<Raffle, StoreError> {
        self.send(self.request(Method::PATCH, &format!("/rifas/{id}")).json(&patch))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_raffle(&self, id: RaffleId) -> Result<(), StoreError> {
        let reply: MessageReply = self
            .send(self.request(Method::DELETE, &format!("/rifas/{id}")))
            .await?;
        tracing::debug!(msg = %reply.msg, "Raffle deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_payment_options(&self, raffle: RaffleId) -> Result<Vec<PaymentOption>, StoreError> {
        self.send(self.request(Method::GET, &format!("/admin/rifas/{raffle}/payment_options")))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn list_tickets(&self, raffle: RaffleId, range: Option<NumberRange>) -> Result<Vec<Ticket>, StoreError> {
        let rows: Vec<WireTicket> = self
            .send(
                self.request(Method::GET, &format!("/rifas/{raffle}/numeros"))
                    .query(&RangeQuery::from(range)),
            )
            .await?;

        rows.into_iter()
            .map(|row| Ticket::try_from(row).map_err(StoreError::from))
            .collect()
    }

    #[tracing::instrument(skip(self, numbers), fields(requested = numbers.len()))]
    async fn reserve_explicit(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let body = ReserveRequest {
            participante_id: participant,
            numeros: numbers.iter().copied().collect(),
            minutos_reserva: Some(i64::from(ttl.minutes())),
        };
        let reply: ReservationReply = self
            .send(self.request(Method::POST, &format!("/rifas/{raffle}/reservas")).json(&body))
            .await?;
        Ok(reply.into())
    }

    #[tracing::instrument(skip(self))]
    async fn reserve_random(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        count: u32,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let body = RandomReserveRequest {
            participante_id: participant,
            cantidad: count,
            minutos_reserva: Some(i64::from(ttl.minutes())),
        };
        let reply: ReservationReply = self
            .send(
                self.request(Method::POST, &format!("/rifas/{raffle}/reservas/aleatorias"))
                    .json(&body),
            )
            .await?;
        Ok(reply.into())
    }

    #[tracing::instrument(skip(self, numbers))]
    async fn release_reservations(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
    ) -> Result<ReleaseOutcome, StoreError> {
        let body = ReleaseRequest {
            participante_id: participant,
            numeros: numbers.iter().copied().collect(),
        };
        let reply: ReleaseReply = self
            .send(self.request(Method::DELETE, &format!("/rifas/{raffle}/reservas")).json(&body))
            .await?;
        Ok(ReleaseOutcome {
            released: reply.liberados,
        })
    }

    #[tracing::instrument(skip(self, selection))]
    async fn confirm_purchase(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        selection: &PurchaseSelection,
    ) -> Result<PurchaseOutcome, StoreError> {
        let body = PurchaseRequest {
            rifa_id: Some(raffle),
            participante_id: participant,
            numeros: selection.to_numbers(),
        };
        let reply: PurchaseReply = self
            .send(self.request(Method::POST, &format!("/rifas/{raffle}/compras")).json(&body))
            .await?;
        Ok(reply.into())
    }

    #[tracing::instrument(skip(self))]
    async fn release_expired(&self, raffle: RaffleId) -> Result<u32, StoreError> {
        let reply: ExpiredReply = self
            .send(self.request(Method::POST, &format!("/rifas/{raffle}/liberar-vencidas")))
            .await?;
        Ok(reply.liberadas)
    }

    #[tracing::instrument(skip(self))]
    async fn tickets_of_participant(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
    ) -> Result<Vec<TicketNumber>, StoreError> {
        self.send(self.request(
            Method::GET,
            &format!("/rifas/{raffle}/participantes/{participant}/tickets"),
        ))
        .await
    }

    #[tracing::instrument(skip(self, participant), fields(raffle = %participant.rifa_id))]
    async fn register_participant(&self, participant: NewParticipant) -> Result<Participant, StoreError> {
        self.send(self.request(Method::POST, "/participantes").json(&participant))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        self.send(self.request(Method::GET, &format!("/participantes/{id}"))).await
    }

    #[tracing::instrument(skip(self))]
    async fn set_participant_status(
        &self,
        id: ParticipantId,
        status: ApprovalStatus,
    ) -> Result<Participant, StoreError> {
        let update = ParticipantStatusUpdate { nuevo_estado: status };
        self.send(
            self.request(Method::PUT, &format!("/admin/participantes/{id}/estado"))
                .json(&update),
        )
        .await
    }
}
