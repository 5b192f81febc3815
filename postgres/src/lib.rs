//! `PostgreSQL` ticket store for Rifas.
//!
//! [`PostgresTicketStore`] implements [`TicketStore`] on top of sqlx. Every
//! mutating call runs in one transaction:
//!
//! - the raffle row is locked `FOR SHARE` (raffle updates take it `FOR UPDATE`,
//!   so the sales gate cannot change mid-operation)
//! - the ticket rows involved are locked `FOR UPDATE` in number order
//! - the same [`RaffleBook`] rules as the in-memory store are applied
//! - only the rows the book reports as changed are written back
//!
//! Random reservations pick candidates with `ORDER BY random()` and
//! `FOR UPDATE SKIP LOCKED`, so concurrent random requests never wait on each
//! other's rows.
//!
//! # Example
//!
//! ```ignore
//! use rifas_postgres::PostgresTicketStore;
//!
//! let store = PostgresTicketStore::connect("postgres://localhost/rifas", 10, Arc::new(SystemClock)).await?;
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod schema;

pub use schema::MIGRATIONS;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rifas_core::environment::Clock;
use rifas_core::ledger::{PurchaseOutcome, PurchaseSelection, RaffleBook, ReleaseOutcome, ReservationOutcome};
use rifas_core::store::{StoreError, TicketStore, check_payment_option};
use rifas_core::ticket::{Ticket, TicketState};
use rifas_core::types::{
    ApprovalStatus, NewParticipant, NewPaymentOption, NewRaffle, NumberRange, Participant, ParticipantId,
    PaymentOption, Raffle, RafflePatch, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
};
use rifas_core::wire::WireTicket;
use rows::{
    PARTICIPANT_COLUMNS, PAYMENT_OPTION_COLUMNS, RAFFLE_COLUMNS, TICKET_COLUMNS, db_error, participant_from_row,
    payment_option_from_row, raffle_from_row, ticket_from_row, to_cents,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How a raffle row is locked for the rest of a transaction
#[derive(Clone, Copy, Debug)]
enum RaffleLock {
    /// Ticket operations; blocks raffle updates only
    Share,
    /// Raffle updates
    Update,
}

impl RaffleLock {
    const fn clause(self) -> &'static str {
        match self {
            Self::Share => "FOR SHARE",
            Self::Update => "FOR UPDATE",
        }
    }
}

/// Ticket store persisted in `PostgreSQL`
pub struct PostgresTicketStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresTicketStore {
    /// Opens a connection pool
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool, clock))
    }

    /// Wraps an existing pool
    #[must_use]
    pub fn from_pool(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the raffle, ticket, participant and payment option tables if missing
    ///
    /// # Errors
    ///
    /// Propagates the first failing statement.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        }
        tracing::info!(statements = MIGRATIONS.len(), "Schema up to date");
        Ok(())
    }
}

async fn lock_raffle(conn: &mut PgConnection, id: RaffleId, lock: RaffleLock) -> Result<Raffle, StoreError> {
    let sql = format!("SELECT {RAFFLE_COLUMNS} FROM rifas WHERE id = $1 {}", lock.clause());
    let row = sqlx::query(&sql)
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound(format!("raffle {id}")))?;
    raffle_from_row(&row)
}

fn decode_tickets(raffle: RaffleId, rows: &[PgRow]) -> Result<Vec<Ticket>, StoreError> {
    rows.iter().map(|row| ticket_from_row(raffle, row)).collect()
}

fn number_values(numbers: &BTreeSet<TicketNumber>) -> Vec<i32> {
    numbers.iter().map(|n| n.value()).collect()
}

/// Locks the listed numbers of a raffle, lowest first
async fn lock_numbers(
    conn: &mut PgConnection,
    raffle: RaffleId,
    numbers: &BTreeSet<TicketNumber>,
) -> Result<Vec<Ticket>, StoreError> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM numeros WHERE rifa_id = $1 AND numero = ANY($2) ORDER BY numero FOR UPDATE"
    );
    let rows = sqlx::query(&sql)
        .bind(raffle.value())
        .bind(number_values(numbers))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;
    decode_tickets(raffle, &rows)
}

/// One available row per number of the raffle's range
async fn seed_numbers(conn: &mut PgConnection, raffle: &Raffle) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO numeros (rifa_id, numero, estado) SELECT $1, n, $4 FROM generate_series($2::int, $3::int) AS n")
        .bind(raffle.id.value())
        .bind(raffle.rango_min.value())
        .bind(raffle.rango_max.value())
        .bind(TicketState::Available.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Replaces every payment option of a raffle
async fn replace_payment_options(
    conn: &mut PgConnection,
    raffle: RaffleId,
    options: &[NewPaymentOption],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM rifa_payment_options WHERE raffle_id = $1")
        .bind(raffle.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

    for option in options {
        sqlx::query(
            r"
            INSERT INTO rifa_payment_options
                (raffle_id, payment_method_id, instructions, min_centavos, max_centavos, sort_order, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(raffle.value())
        .bind(option.payment_method_id)
        .bind(&option.instructions)
        .bind(option.min_amount.map(to_cents).transpose()?)
        .bind(option.max_amount.map(to_cents).transpose()?)
        .bind(option.sort_order)
        .bind(option.is_active)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }
    Ok(())
}

async fn payment_options_of(conn: &mut PgConnection, raffle: RaffleId) -> Result<Vec<PaymentOption>, StoreError> {
    let sql = format!(
        "SELECT {PAYMENT_OPTION_COLUMNS} FROM rifa_payment_options WHERE raffle_id = $1 ORDER BY sort_order, id"
    );
    let rows = sqlx::query(&sql)
        .bind(raffle.value())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;
    rows.iter().map(payment_option_from_row).collect()
}

/// Writes the rows the book changed; returns how many
async fn write_back(conn: &mut PgConnection, book: &mut RaffleBook) -> Result<usize, StoreError> {
    let raffle = book.raffle().id;
    let changes = book.take_changes();

    for ticket in &changes {
        let row = WireTicket::from_ticket(raffle, ticket);
        sqlx::query(
            r"
            UPDATE numeros
            SET estado = $3, reservado_por_id = $4, comprado_por_id = $5,
                reservado_hasta = $6, actualizado_en = $7
            WHERE rifa_id = $1 AND numero = $2
            ",
        )
        .bind(raffle.value())
        .bind(ticket.numero.value())
        .bind(&row.estado)
        .bind(row.reservado_por_id.map(|p| p.value()))
        .bind(row.comprado_por_id.map(|p| p.value()))
        .bind(row.reservado_hasta)
        .bind(row.actualizado_en)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    }

    Ok(changes.len())
}

#[async_trait]
impl TicketStore for PostgresTicketStore {
    #[tracing::instrument(skip(self, raffle), fields(titulo = %raffle.titulo))]
    async fn create_raffle(&self, raffle: NewRaffle) -> Result<Raffle, StoreError> {
        raffle.validate().map_err(StoreError::Validation)?;
        let cents = to_cents(raffle.precio_numero)?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let sql = format!(
            "INSERT INTO rifas (titulo, producto_id, rango_min, rango_max, precio_centavos, estado) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RAFFLE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(raffle.titulo.trim())
            .bind(raffle.producto_id.value())
            .bind(raffle.rango_min.value())
            .bind(raffle.rango_max.value())
            .bind(cents)
            .bind(RaffleStatus::Creada.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        let created = raffle_from_row(&row)?;
        seed_numbers(&mut tx, &created).await?;
        replace_payment_options(&mut tx, created.id, &raffle.payment_options).await?;

        tx.commit().await.map_err(db_error)?;

        tracing::info!(raffle = %created.id, numbers = created.total_numbers(), "Raffle created");
        Ok(created)
    }

    async fn list_raffles(&self, status: Option<RaffleStatus>) -> Result<Vec<Raffle>, StoreError> {
        let sql = format!("SELECT {RAFFLE_COLUMNS} FROM rifas WHERE ($1::text IS NULL OR estado = $1) ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(raffle_from_row).collect()
    }

    async fn get_raffle(&self, id: RaffleId) -> Result<Raffle, StoreError> {
        let sql = format!("SELECT {RAFFLE_COLUMNS} FROM rifas WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("raffle {id}")))?;
        raffle_from_row(&row)
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update_raffle(&self, id: RaffleId, patch: RafflePatch) -> Result<Raffle, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let current = lock_raffle(&mut tx, id, RaffleLock::Update).await?;
        let next = patch.apply(&current).map_err(StoreError::Validation)?;

        let moved = next.rango_min != current.rango_min || next.rango_max != current.rango_max;
        if moved {
            let sql = format!(
                "SELECT {TICKET_COLUMNS} FROM numeros WHERE rifa_id = $1 AND estado <> $2 ORDER BY numero FOR UPDATE"
            );
            let rows = sqlx::query(&sql)
                .bind(id.value())
                .bind(TicketState::Available.as_str())
                .fetch_all(&mut *tx)
                .await
                .map_err(db_error)?;
            RaffleBook::from_parts(current, decode_tickets(id, &rows)?).revise(next.clone(), now)?;

            sqlx::query("DELETE FROM numeros WHERE rifa_id = $1")
                .bind(id.value())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            seed_numbers(&mut tx, &next).await?;
        }

        let sql = format!(
            "UPDATE rifas SET titulo = $2, producto_id = $3, rango_min = $4, rango_max = $5, \
             precio_centavos = $6, estado = $7 WHERE id = $1 RETURNING {RAFFLE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.value())
            .bind(next.titulo.trim())
            .bind(next.producto_id.value())
            .bind(next.rango_min.value())
            .bind(next.rango_max.value())
            .bind(to_cents(next.precio_numero)?)
            .bind(next.estado.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        let updated = raffle_from_row(&row)?;

        if let Some(options) = &patch.payment_options {
            replace_payment_options(&mut tx, id, options).await?;
        }
        tx.commit().await.map_err(db_error)?;

        tracing::info!(estado = %updated.estado, reseeded = moved, "Raffle updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_raffle(&self, id: RaffleId) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM rifas WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("raffle {id}")));
        }

        tracing::info!("Raffle deleted");
        Ok(())
    }

    async fn list_payment_options(&self, raffle: RaffleId) -> Result<Vec<PaymentOption>, StoreError> {
        self.get_raffle(raffle).await?;
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        payment_options_of(&mut conn, raffle).await
    }

    async fn list_tickets(&self, raffle: RaffleId, range: Option<NumberRange>) -> Result<Vec<Ticket>, StoreError> {
        self.get_raffle(raffle).await?;

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM numeros \
             WHERE rifa_id = $1 AND ($2::int IS NULL OR numero >= $2) AND ($3::int IS NULL OR numero <= $3) \
             ORDER BY numero"
        );
        let rows = sqlx::query(&sql)
            .bind(raffle.value())
            .bind(range.map(|r| r.desde.value()))
            .bind(range.map(|r| r.hasta.value()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        decode_tickets(raffle, &rows)
    }

    #[tracing::instrument(skip(self, numbers), fields(requested = numbers.len()))]
    async fn reserve_explicit(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let meta = lock_raffle(&mut tx, raffle, RaffleLock::Share).await?;
        let tickets = lock_numbers(&mut tx, raffle, numbers).await?;

        let mut book = RaffleBook::from_parts(meta, tickets);
        let outcome = book.reserve_explicit(participant, numbers, ttl, now)?;
        write_back(&mut tx, &mut book).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::info!(
            reserved = outcome.reserved.len(),
            already_mine = outcome.already_mine.len(),
            unavailable = outcome.unavailable.len(),
            "Explicit reservation applied"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    async fn reserve_random(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        count: u32,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let meta = lock_raffle(&mut tx, raffle, RaffleLock::Share).await?;
        if !meta.estado.accepts_sales() {
            return Err(StoreError::RaffleNotOpen {
                raffle,
                status: meta.estado,
            });
        }

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM numeros \
             WHERE rifa_id = $1 \
               AND (estado = $2 OR (estado = $3 AND reservado_hasta IS NOT NULL AND reservado_hasta <= $4)) \
             ORDER BY random() LIMIT $5 \
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&sql)
            .bind(raffle.value())
            .bind(TicketState::Available.as_str())
            .bind(TicketState::Reserved.as_str())
            .bind(now)
            .bind(i64::from(count))
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

        let mut book = RaffleBook::from_parts(meta, decode_tickets(raffle, &rows)?);
        let mut rng = StdRng::from_entropy();
        let outcome = book.reserve_random(participant, count, ttl, now, &mut rng)?;
        write_back(&mut tx, &mut book).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::info!(reserved = outcome.reserved.len(), "Random reservation applied");
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, numbers), fields(requested = numbers.len()))]
    async fn release_reservations(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
    ) -> Result<ReleaseOutcome, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let meta = lock_raffle(&mut tx, raffle, RaffleLock::Share).await?;
        let tickets = lock_numbers(&mut tx, raffle, numbers).await?;

        let mut book = RaffleBook::from_parts(meta, tickets);
        let outcome = book.release(participant, numbers, now);
        write_back(&mut tx, &mut book).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::info!(released = outcome.released.len(), "Reservations released");
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, selection))]
    async fn confirm_purchase(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        selection: &PurchaseSelection,
    ) -> Result<PurchaseOutcome, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let meta = lock_raffle(&mut tx, raffle, RaffleLock::Share).await?;

        let tickets = match selection {
            PurchaseSelection::Numbers(numbers) => lock_numbers(&mut tx, raffle, numbers).await?,
            PurchaseSelection::AllActive => {
                let sql = format!(
                    "SELECT {TICKET_COLUMNS} FROM numeros \
                     WHERE rifa_id = $1 AND estado = $2 AND reservado_por_id = $3 \
                     ORDER BY numero FOR UPDATE"
                );
                let rows = sqlx::query(&sql)
                    .bind(raffle.value())
                    .bind(TicketState::Reserved.as_str())
                    .bind(participant.value())
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(db_error)?;
                decode_tickets(raffle, &rows)?
            }
        };

        let mut book = RaffleBook::from_parts(meta, tickets);
        let outcome = book.confirm(participant, selection, now)?;
        write_back(&mut tx, &mut book).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::info!(
            purchased = outcome.purchased.len(),
            invalid = outcome.invalid.len(),
            "Purchase confirmed"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    async fn release_expired(&self, raffle: RaffleId) -> Result<u32, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let meta = lock_raffle(&mut tx, raffle, RaffleLock::Share).await?;

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM numeros \
             WHERE rifa_id = $1 AND estado = $2 AND reservado_hasta <= $3 \
             ORDER BY numero FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query(&sql)
            .bind(raffle.value())
            .bind(TicketState::Reserved.as_str())
            .bind(now)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;

        let mut book = RaffleBook::from_parts(meta, decode_tickets(raffle, &rows)?);
        let released = book.release_expired(now);
        write_back(&mut tx, &mut book).await?;
        tx.commit().await.map_err(db_error)?;

        if released > 0 {
            tracing::info!(released, "Expired reservations released");
        }
        Ok(released)
    }

    async fn tickets_of_participant(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
    ) -> Result<Vec<TicketNumber>, StoreError> {
        let now = self.clock.now();
        let meta = self.get_raffle(raffle).await?;

        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM numeros \
             WHERE rifa_id = $1 AND (reservado_por_id = $2 OR comprado_por_id = $2) \
             ORDER BY numero"
        );
        let rows = sqlx::query(&sql)
            .bind(raffle.value())
            .bind(participant.value())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let book = RaffleBook::from_parts(meta, decode_tickets(raffle, &rows)?);
        Ok(book.numbers_of(participant, now))
    }

    #[tracing::instrument(skip(self, participant), fields(raffle = %participant.rifa_id))]
    async fn register_participant(&self, participant: NewParticipant) -> Result<Participant, StoreError> {
        let participant = participant.normalized().map_err(StoreError::Validation)?;
        let cantidad = i32::try_from(participant.cantidad_numeros)
            .map_err(|_| StoreError::Validation("cantidad_numeros out of range".to_string()))?;
        let options = self.list_payment_options(participant.rifa_id).await?;
        check_payment_option(&participant, &options)?;

        let sql = format!(
            "INSERT INTO participantes \
             (rifa_id, nombre, apellido, numero_telefono, numero_referencia, email, \
              cantidad_numeros, comprobante, payment_option_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {PARTICIPANT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(participant.rifa_id.value())
            .bind(&participant.nombre)
            .bind(&participant.apellido)
            .bind(&participant.numero_telefono)
            .bind(&participant.numero_referencia)
            .bind(&participant.email)
            .bind(cantidad)
            .bind(&participant.comprobante)
            .bind(participant.payment_option_id.map(|p| p.value()))
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        let registered = participant_from_row(&row)?;

        tracing::info!(participant = %registered.id, "Participant registered");
        Ok(registered)
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participantes WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))?;
        participant_from_row(&row)
    }

    #[tracing::instrument(skip(self))]
    async fn set_participant_status(
        &self,
        id: ParticipantId,
        status: ApprovalStatus,
    ) -> Result<Participant, StoreError> {
        let sql = format!("UPDATE participantes SET estado = $2 WHERE id = $1 RETURNING {PARTICIPANT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.value())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))?;

        tracing::info!(estado = status.as_str(), "Participant reviewed");
        participant_from_row(&row)
    }
}
