//! Domain types for raffles.
//!
//! Identifiers, ticket numbers, money, raffle and participant entities. Ticket state
//! lives in [`crate::ticket`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a raffle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaffleId(i64);

impl RaffleId {
    /// Creates a `RaffleId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RaffleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participant (a visitor's registration in one raffle)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(i64);

impl ParticipantId {
    /// Creates a `ParticipantId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a raffle payment option chosen by a participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentOptionId(i64);

impl PaymentOptionId {
    /// Creates a `PaymentOptionId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

/// Identifier of the product a raffle is tied to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Creates a `ProductId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// Ticket numbers
// ============================================================================

/// One sellable integer inside a raffle's range
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(i32);

impl TicketNumber {
    /// Creates a `TicketNumber`
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the integer value
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl From<i32> for TicketNumber {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive window of ticket numbers (`desde`..=`hasta`) used by listing queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRange {
    /// First number in the window
    pub desde: TicketNumber,
    /// Last number in the window
    pub hasta: TicketNumber,
}

impl NumberRange {
    /// Creates a range; bounds are swapped if given in reverse order
    #[must_use]
    pub fn new(desde: TicketNumber, hasta: TicketNumber) -> Self {
        if desde <= hasta {
            Self { desde, hasta }
        } else {
            Self {
                desde: hasta,
                hasta: desde,
            }
        }
    }

    /// Whether `numero` lies inside the window
    #[must_use]
    pub fn contains(&self, numero: TicketNumber) -> bool {
        self.desde <= numero && numero <= self.hasta
    }
}

// ============================================================================
// Reservation TTL
// ============================================================================

/// How long a reservation stays vigente, clamped to 1..=60 minutes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct ReservationTtl(u8);

impl ReservationTtl {
    /// Shortest allowed hold
    pub const MIN_MINUTES: u8 = 1;
    /// Longest allowed hold
    pub const MAX_MINUTES: u8 = 60;
    /// Hold used when the caller does not choose one
    pub const DEFAULT_MINUTES: u8 = 10;

    /// Clamps any requested number of minutes into the allowed window
    #[must_use]
    pub fn from_minutes(minutes: i64) -> Self {
        let clamped = minutes.clamp(i64::from(Self::MIN_MINUTES), i64::from(Self::MAX_MINUTES));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(clamped as u8)
    }

    /// Minutes of validity
    #[must_use]
    pub const fn minutes(&self) -> u8 {
        self.0
    }

    /// Validity as a chrono duration
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.0))
    }
}

impl Default for ReservationTtl {
    fn default() -> Self {
        Self(Self::DEFAULT_MINUTES)
    }
}

impl From<i64> for ReservationTtl {
    fn from(minutes: i64) -> Self {
        Self::from_minutes(minutes)
    }
}

impl From<ReservationTtl> for i64 {
    fn from(ttl: ReservationTtl) -> Self {
        Self::from(ttl.0)
    }
}

// ============================================================================
// Money (cents-based to avoid floating point errors)
// ============================================================================

/// Price of one ticket number, stored in cents
///
/// Serialized as a decimal string (`"12.50"`); deserializes from either a JSON
/// number or a decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Error parsing a decimal price
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid price '{0}'")]
pub struct ParseMoneyError(String);

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ParseMoneyError(s.to_string());
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Raffle
// ============================================================================

/// Raffle lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RaffleStatus {
    /// Configured but not yet selling
    Creada,
    /// Selling numbers
    Abierta,
    /// Temporarily not selling
    Pausada,
    /// Finished
    Cerrada,
}

impl RaffleStatus {
    /// Whether reservations and purchases are accepted
    #[must_use]
    pub const fn accepts_sales(&self) -> bool {
        matches!(self, Self::Abierta)
    }

    /// Wire/database spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creada => "CREADA",
            Self::Abierta => "ABIERTA",
            Self::Pausada => "PAUSADA",
            Self::Cerrada => "CERRADA",
        }
    }
}

impl fmt::Display for RaffleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaffleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREADA" => Ok(Self::Creada),
            "ABIERTA" => Ok(Self::Abierta),
            "PAUSADA" => Ok(Self::Pausada),
            "CERRADA" => Ok(Self::Cerrada),
            other => Err(format!("unknown raffle status '{other}'")),
        }
    }
}

/// A raffle: a product, a numbered range and a price per number
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raffle {
    /// Raffle identifier
    pub id: RaffleId,
    /// Title shown to visitors
    pub titulo: String,
    /// Product being raffled
    pub producto_id: ProductId,
    /// First number (inclusive)
    pub rango_min: TicketNumber,
    /// Last number (inclusive)
    pub rango_max: TicketNumber,
    /// Price of one number
    pub precio_numero: Money,
    /// Lifecycle status
    pub estado: RaffleStatus,
}

impl Raffle {
    /// Largest range a raffle may span; every number becomes a stored ticket
    pub const MAX_NUMBERS: u64 = 100_000;

    /// Number of tickets in the range (`rango_max - rango_min + 1`)
    #[must_use]
    pub fn total_numbers(&self) -> u64 {
        range_len(self.rango_min, self.rango_max)
    }

    /// Whether `numero` belongs to this raffle
    #[must_use]
    pub fn contains(&self, numero: TicketNumber) -> bool {
        self.rango_min <= numero && numero <= self.rango_max
    }

    /// Iterates every number of the range in ascending order
    pub fn numbers(&self) -> impl Iterator<Item = TicketNumber> {
        (self.rango_min.value()..=self.rango_max.value()).map(TicketNumber::new)
    }
}

/// Inclusive count of `min..=max`, zero when inverted
fn range_len(min: TicketNumber, max: TicketNumber) -> u64 {
    let span = i64::from(max.value()) - i64::from(min.value()) + 1;
    u64::try_from(span).unwrap_or(0)
}

fn validate_range(min: TicketNumber, max: TicketNumber) -> Result<(), String> {
    if max < min {
        return Err(format!(
            "rango_max ({max}) must be greater than or equal to rango_min ({min})"
        ));
    }
    let total = range_len(min, max);
    if total > Raffle::MAX_NUMBERS {
        return Err(format!(
            "range {min}..={max} spans {total} numbers, more than the {} allowed",
            Raffle::MAX_NUMBERS
        ));
    }
    Ok(())
}

/// Input for creating a raffle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRaffle {
    /// Title shown to visitors
    pub titulo: String,
    /// Product being raffled
    pub producto_id: ProductId,
    /// First number (inclusive)
    pub rango_min: TicketNumber,
    /// Last number (inclusive)
    pub rango_max: TicketNumber,
    /// Price of one number
    pub precio_numero: Money,
    /// Payment options offered to participants
    #[serde(default)]
    pub payment_options: Vec<NewPaymentOption>,
}

impl NewRaffle {
    /// Checks the range and price rules
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.titulo.trim().is_empty() {
            return Err("Title must not be empty".to_string());
        }
        validate_range(self.rango_min, self.rango_max)?;
        if self.precio_numero.is_zero() {
            return Err("precio_numero must be positive".to_string());
        }
        self.payment_options.iter().try_for_each(NewPaymentOption::validate)
    }
}

/// Partial update of a raffle; absent fields keep their value
///
/// `payment_options`, when present, replaces the whole list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RafflePatch {
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    /// New product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto_id: Option<ProductId>,
    /// New first number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rango_min: Option<TicketNumber>,
    /// New last number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rango_max: Option<TicketNumber>,
    /// New price per number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precio_numero: Option<Money>,
    /// New lifecycle status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<RaffleStatus>,
    /// Replacement payment options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_options: Option<Vec<NewPaymentOption>>,
}

impl RafflePatch {
    /// Patch that only moves the raffle to `estado`
    #[must_use]
    pub fn status(estado: RaffleStatus) -> Self {
        Self {
            estado: Some(estado),
            ..Self::default()
        }
    }

    /// Whether the patch moves either end of the range
    #[must_use]
    pub const fn changes_range(&self) -> bool {
        self.rango_min.is_some() || self.rango_max.is_some()
    }

    /// Applies the patch to a copy of `current` and validates the result
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated rule.
    pub fn apply(&self, current: &Raffle) -> Result<Raffle, String> {
        let mut next = current.clone();
        if let Some(titulo) = &self.titulo {
            if titulo.trim().is_empty() {
                return Err("Title must not be empty".to_string());
            }
            next.titulo.clone_from(titulo);
        }
        if let Some(producto_id) = self.producto_id {
            next.producto_id = producto_id;
        }
        if let Some(precio) = self.precio_numero {
            if precio.is_zero() {
                return Err("precio_numero must be positive".to_string());
            }
            next.precio_numero = precio;
        }
        if let Some(estado) = self.estado {
            next.estado = estado;
        }
        next.rango_min = self.rango_min.unwrap_or(current.rango_min);
        next.rango_max = self.rango_max.unwrap_or(current.rango_max);
        validate_range(next.rango_min, next.rango_max)?;
        if let Some(options) = &self.payment_options {
            options.iter().try_for_each(NewPaymentOption::validate)?;
        }
        Ok(next)
    }
}

// ============================================================================
// Payment options
// ============================================================================

/// How a raffle accepts payment with one of the organizer's methods
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOption {
    /// Option identifier, referenced by participants
    pub id: PaymentOptionId,
    /// Raffle offering the option
    pub raffle_id: RaffleId,
    /// Organizer payment method behind the option
    pub payment_method_id: i64,
    /// Text shown to the payer
    pub instructions: Option<String>,
    /// Smallest accepted amount
    pub min_amount: Option<Money>,
    /// Largest accepted amount
    pub max_amount: Option<Money>,
    /// Display position, ascending
    pub sort_order: i32,
    /// Whether participants may choose it
    pub is_active: bool,
}

/// Input for attaching a payment option to a raffle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPaymentOption {
    /// Organizer payment method behind the option
    pub payment_method_id: i64,
    /// Text shown to the payer
    #[serde(default)]
    pub instructions: Option<String>,
    /// Smallest accepted amount
    #[serde(default)]
    pub min_amount: Option<Money>,
    /// Largest accepted amount
    #[serde(default)]
    pub max_amount: Option<Money>,
    /// Display position, ascending
    #[serde(default)]
    pub sort_order: i32,
    /// Whether participants may choose it
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl NewPaymentOption {
    /// Checks the amount bounds
    ///
    /// # Errors
    ///
    /// Returns a message when `min_amount` exceeds `max_amount`.
    pub fn validate(&self) -> Result<(), String> {
        match (self.min_amount, self.max_amount) {
            (Some(min), Some(max)) if min > max => Err(format!(
                "payment option {}: min_amount ({min}) exceeds max_amount ({max})",
                self.payment_method_id
            )),
            _ => Ok(()),
        }
    }

    /// Builds the stored option once an id is assigned
    #[must_use]
    pub fn into_option(self, id: PaymentOptionId, raffle_id: RaffleId) -> PaymentOption {
        PaymentOption {
            id,
            raffle_id,
            payment_method_id: self.payment_method_id,
            instructions: self.instructions,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            sort_order: self.sort_order,
            is_active: self.is_active,
        }
    }
}

// ============================================================================
// Participant
// ============================================================================

/// Admin approval of a participant's payment proof
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Waiting for review
    Pendiente,
    /// Payment accepted
    Aprobado,
    /// Payment rejected
    Rechazado,
}

impl ApprovalStatus {
    /// Wire/database spelling
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Aprobado => "aprobado",
            Self::Rechazado => "rechazado",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pendiente" => Ok(Self::Pendiente),
            "aprobado" => Ok(Self::Aprobado),
            "rechazado" => Ok(Self::Rechazado),
            other => Err(format!("unknown approval status '{other}'")),
        }
    }
}

/// A visitor's registration against one raffle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier
    pub id: ParticipantId,
    /// Raffle the participant registered for
    pub rifa_id: RaffleId,
    /// First name
    pub nombre: String,
    /// Last name
    pub apellido: String,
    /// Phone number
    pub numero_telefono: String,
    /// Payment reference given by the participant
    pub numero_referencia: String,
    /// Optional contact email
    pub email: Option<String>,
    /// How many numbers the participant wants (the quota N)
    pub cantidad_numeros: u32,
    /// Reference to the uploaded payment proof
    pub comprobante: Option<String>,
    /// Chosen payment option
    pub payment_option_id: Option<PaymentOptionId>,
    /// Admin approval
    pub estado: ApprovalStatus,
}

/// Input for registering a participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    /// Raffle to register for
    pub rifa_id: RaffleId,
    /// First name
    pub nombre: String,
    /// Last name
    pub apellido: String,
    /// Phone number
    pub numero_telefono: String,
    /// Payment reference
    pub numero_referencia: String,
    /// Optional contact email
    #[serde(default)]
    pub email: Option<String>,
    /// How many numbers the participant wants
    pub cantidad_numeros: u32,
    /// Reference to the uploaded payment proof
    #[serde(default)]
    pub comprobante: Option<String>,
    /// Chosen payment option
    #[serde(default)]
    pub payment_option_id: Option<PaymentOptionId>,
}

impl NewParticipant {
    /// Trims text fields and checks the required ones
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violated rule.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.nombre = self.nombre.trim().to_string();
        self.apellido = self.apellido.trim().to_string();
        self.numero_telefono = self.numero_telefono.trim().to_string();
        self.numero_referencia = self.numero_referencia.trim().to_string();
        self.email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        if self.nombre.is_empty() || self.apellido.is_empty() {
            return Err("nombre and apellido are required".to_string());
        }
        if self.numero_telefono.is_empty() {
            return Err("numero_telefono is required".to_string());
        }
        if self.cantidad_numeros == 0 {
            return Err("cantidad_numeros must be at least 1".to_string());
        }
        Ok(self)
    }

    /// Builds the stored participant once an id is assigned
    #[must_use]
    pub fn into_participant(self, id: ParticipantId) -> Participant {
        Participant {
            id,
            rifa_id: self.rifa_id,
            nombre: self.nombre,
            apellido: self.apellido,
            numero_telefono: self.numero_telefono,
            numero_referencia: self.numero_referencia,
            email: self.email,
            cantidad_numeros: self.cantidad_numeros,
            comprobante: self.comprobante,
            payment_option_id: self.payment_option_id,
            estado: ApprovalStatus::Pendiente,
        }
    }
}
