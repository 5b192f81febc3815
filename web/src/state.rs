//! Application state for Axum handlers.

use rifas_core::store::TicketStore;
use std::sync::Arc;

/// State shared by every handler
///
/// The API is backend-agnostic: any [`TicketStore`] can be served.
#[derive(Clone)]
pub struct AppState {
    /// Ticket store all requests go to
    pub store: Arc<dyn TicketStore>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }
}
