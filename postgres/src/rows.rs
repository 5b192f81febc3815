//! Conversions between database rows and domain types.
//!
//! Ticket rows go through [`WireTicket`] so stored records are canonicalized by
//! the same rules as records received over HTTP.

use rifas_core::store::StoreError;
use rifas_core::ticket::Ticket;
use rifas_core::types::{
    ApprovalStatus, Money, Participant, ParticipantId, PaymentOption, PaymentOptionId, ProductId, Raffle, RaffleId,
    RaffleStatus, TicketNumber,
};
use rifas_core::wire::WireTicket;
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Columns selected for every ticket query
pub const TICKET_COLUMNS: &str =
    "numero, estado, reservado_por_id, comprado_por_id, reservado_hasta, actualizado_en";

/// Columns selected for every raffle query
pub const RAFFLE_COLUMNS: &str = "id, titulo, producto_id, rango_min, rango_max, precio_centavos, estado";

/// Columns selected for every participant query
pub const PARTICIPANT_COLUMNS: &str = "id, rifa_id, nombre, apellido, numero_telefono, numero_referencia, \
     email, cantidad_numeros, comprobante, payment_option_id, estado";

/// Columns selected for every payment option query
pub const PAYMENT_OPTION_COLUMNS: &str =
    "id, raffle_id, payment_method_id, instructions, min_centavos, max_centavos, sort_order, is_active";

/// Maps a driver error onto the store taxonomy
pub fn db_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::RowNotFound => StoreError::NotFound(error.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // serialization_failure, deadlock_detected, lock_not_available
            Some("40001" | "40P01" | "55P03") => {
                metrics::counter!("rifas.postgres.conflicts").increment(1);
                StoreError::Conflict(db.message().to_string())
            }
            // foreign_key_violation
            Some("23503") => StoreError::NotFound(db.message().to_string()),
            // check_violation, not_null_violation
            Some("23514" | "23502") => StoreError::Validation(db.message().to_string()),
            _ => StoreError::Unavailable(error.to_string()),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(error.to_string())
        }
        _ => StoreError::Unavailable(error.to_string()),
    }
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(db_error)
}

/// Decodes a `numeros` row
pub fn ticket_from_row(raffle: RaffleId, row: &PgRow) -> Result<Ticket, StoreError> {
    let wire = WireTicket {
        numero: TicketNumber::new(decode(row, "numero")?),
        rifa_id: Some(raffle),
        estado: decode(row, "estado")?,
        reservado_por_id: decode::<Option<i64>>(row, "reservado_por_id")?.map(ParticipantId::new),
        comprado_por_id: decode::<Option<i64>>(row, "comprado_por_id")?.map(ParticipantId::new),
        participante_id: None,
        reservado_hasta: decode(row, "reservado_hasta")?,
        actualizado_en: decode(row, "actualizado_en")?,
    };
    Ok(Ticket::try_from(wire)?)
}

/// Money as a `BIGINT` of cents
pub fn to_cents(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.cents()).map_err(|_| StoreError::Validation(format!("amount {amount} out of range")))
}

fn from_cents(cents: i64) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Decode(format!("negative amount {cents}")))
}

/// Decodes a `rifas` row
pub fn raffle_from_row(row: &PgRow) -> Result<Raffle, StoreError> {
    let estado: String = decode(row, "estado")?;

    Ok(Raffle {
        id: RaffleId::new(decode(row, "id")?),
        titulo: decode(row, "titulo")?,
        producto_id: ProductId::new(decode(row, "producto_id")?),
        rango_min: TicketNumber::new(decode(row, "rango_min")?),
        rango_max: TicketNumber::new(decode(row, "rango_max")?),
        precio_numero: from_cents(decode(row, "precio_centavos")?)?,
        estado: estado.parse::<RaffleStatus>().map_err(StoreError::Decode)?,
    })
}

/// Decodes a `participantes` row
pub fn participant_from_row(row: &PgRow) -> Result<Participant, StoreError> {
    let estado: String = decode(row, "estado")?;
    let cantidad: i32 = decode(row, "cantidad_numeros")?;

    Ok(Participant {
        id: ParticipantId::new(decode(row, "id")?),
        rifa_id: RaffleId::new(decode(row, "rifa_id")?),
        nombre: decode(row, "nombre")?,
        apellido: decode(row, "apellido")?,
        numero_telefono: decode(row, "numero_telefono")?,
        numero_referencia: decode(row, "numero_referencia")?,
        email: decode(row, "email")?,
        cantidad_numeros: u32::try_from(cantidad)
            .map_err(|_| StoreError::Decode(format!("negative cantidad_numeros {cantidad}")))?,
        comprobante: decode(row, "comprobante")?,
        payment_option_id: decode::<Option<i64>>(row, "payment_option_id")?.map(PaymentOptionId::new),
        estado: estado.parse::<ApprovalStatus>().map_err(StoreError::Decode)?,
    })
}

/// Decodes a `rifa_payment_options` row
pub fn payment_option_from_row(row: &PgRow) -> Result<PaymentOption, StoreError> {
    Ok(PaymentOption {
        id: PaymentOptionId::new(decode(row, "id")?),
        raffle_id: RaffleId::new(decode(row, "raffle_id")?),
        payment_method_id: decode(row, "payment_method_id")?,
        instructions: decode(row, "instructions")?,
        min_amount: decode::<Option<i64>>(row, "min_centavos")?.map(from_cents).transpose()?,
        max_amount: decode::<Option<i64>>(row, "max_centavos")?.map(from_cents).transpose()?,
        sort_order: decode(row, "sort_order")?,
        is_active: decode(row, "is_active")?,
    })
}
