//! # Rifas Testing
//!
//! Testing utilities for raffle stores and reducer-driven sessions.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - The [`ReducerTest`] Given/When/Then harness
//! - Raffle fixtures for store-level tests
//!
//! ## Example
//!
//! ```ignore
//! use rifas_testing::{ManualClock, fixtures};
//!
//! #[tokio::test]
//! async fn holds_lapse() {
//!     let clock = Arc::new(ManualClock::new(test_time()));
//!     let store = InMemoryTicketStore::new(clock.clone());
//!     let raffle = fixtures::open_raffle(&store, 1, 100).await;
//!
//!     clock.advance(chrono::Duration::minutes(11));
//!     assert_eq!(store.release_expired(raffle.id).await?, 0);
//! }
//! ```

use chrono::{DateTime, Utc};
use rifas_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Shared between a store and a test through `Arc`, so a test can let
    /// reservations lapse without sleeping.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        /// Starts the clock at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                millis: AtomicI64::new(time.timestamp_millis()),
            }
        }

        /// Moves the clock forward (or back, for a negative delta)
        pub fn advance(&self, by: chrono::Duration) {
            self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        /// Jumps to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            self.millis.store(time.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }

    /// Reference instant used across the test suites (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests at [`test_time`]
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

/// Raffle fixtures for store-level tests
pub mod fixtures {
    use rifas_core::store::{StoreError, TicketStore};
    use rifas_core::types::{Money, NewParticipant, NewRaffle, Participant, ProductId, Raffle, RaffleStatus, TicketNumber};

    /// Input for a raffle over `min..=max` at 5.00 per number
    #[must_use]
    pub fn new_raffle(min: i32, max: i32) -> NewRaffle {
        NewRaffle {
            titulo: format!("Rifa {min}-{max}"),
            producto_id: ProductId::new(1),
            rango_min: TicketNumber::new(min),
            rango_max: TicketNumber::new(max),
            precio_numero: Money::from_cents(500),
            payment_options: Vec::new(),
        }
    }

    /// Creates a raffle over `min..=max` and opens it for sales
    ///
    /// # Errors
    ///
    /// Propagates any store failure.
    pub async fn open_raffle<S>(store: &S, min: i32, max: i32) -> Result<Raffle, StoreError>
    where
        S: TicketStore + ?Sized,
    {
        let raffle = store.create_raffle(new_raffle(min, max)).await?;
        store.set_raffle_status(raffle.id, RaffleStatus::Abierta).await
    }

    /// Registers a participant who wants `cantidad` numbers
    ///
    /// # Errors
    ///
    /// Propagates any store failure.
    pub async fn participant<S>(store: &S, raffle: &Raffle, nombre: &str, cantidad: u32) -> Result<Participant, StoreError>
    where
        S: TicketStore + ?Sized,
    {
        store
            .register_participant(NewParticipant {
                rifa_id: raffle.id,
                nombre: nombre.to_string(),
                apellido: "Prueba".to_string(),
                numero_telefono: "0412-0000000".to_string(),
                numero_referencia: format!("REF-{nombre}"),
                email: None,
                cantidad_numeros: cantidad,
                comprobante: None,
                payment_option_id: None,
            })
            .await
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_time};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), test_time());
    }

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::new(test_time());
        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(clock.now(), test_time() + chrono::Duration::minutes(10));

        clock.set(test_time());
        assert_eq!(clock.now(), test_time());
    }
}
