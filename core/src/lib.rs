//! # Rifas Core
//!
//! Core types, rules and contracts for selling raffle ticket numbers.
//!
//! ## Core Concepts
//!
//! - **Ticket**: one number of a raffle, `AVAILABLE → RESERVED → PURCHASED`
//! - **Ledger**: per-raffle rules for reserving, buying, releasing and expiring
//! - **Store**: the [`store::TicketStore`] contract every backend implements
//! - **Reducer/Effect**: the pattern client-side sessions are written in
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! ## Example
//!
//! ```ignore
//! use rifas_core::memory::InMemoryTicketStore;
//! use rifas_core::store::TicketStore;
//!
//! let store = InMemoryTicketStore::new(Arc::new(SystemClock));
//! let outcome = store
//!     .reserve_explicit(raffle_id, participant_id, &numbers, ReservationTtl::default())
//!     .await?;
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Domain types: identifiers, ticket numbers, money, raffles, participants
pub mod types;

/// Ticket state machine
pub mod ticket;

/// Reservation and purchase rules applied to one raffle's tickets
pub mod ledger;

/// Store contract and its error type
pub mod store;

/// In-memory store backed by [`ledger::RaffleBook`]
pub mod memory;

/// JSON bodies exchanged with the HTTP API
pub mod wire;

/// The reducer contract client-side sessions are written against
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic of a session as `(state, action, environment) -> effects`
    ///
    /// `reduce` mutates the state in place and must not perform I/O itself;
    /// anything that talks to a [`crate::store::TicketStore`] is returned as an
    /// [`Effect`] for the runtime to run.
    pub trait Reducer {
        /// Session state
        type State;

        /// Commands and store results the reducer handles
        type Action;

        /// Injected collaborators
        type Environment;

        /// Applies `action` and returns the effects to run; most actions return
        /// zero or one.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effects returned by reducers
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// A side effect for the runtime to run
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// An async computation; a `Some` result is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => f.write_str("Effect::None"),
                Effect::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wraps an async block that yields the follow-up action
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(fut))
        }

        /// Whether this is [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of "now" for every expiry decision
    ///
    /// Reservation expiry is always judged against [`Clock::now`], never the
    /// wall clock directly.
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
