//! HTTP request handlers, one module per resource.

pub mod health;
pub mod participants;
pub mod raffles;
pub mod reservations;

pub use health::{health_check, readiness_check};
