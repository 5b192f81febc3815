//! Fixed-size page window over a raffle's number range.
//!
//! Paging is presentation only; selection always covers the whole range.

use rifas_core::types::{Raffle, TicketNumber};
use serde::Serialize;

/// Numbers shown per page
pub const PAGE_SIZE: u32 = 100;

/// The visible slice of the number range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// Current page, 1-based
    pub page: u32,
    /// Page count, at least 1
    pub total_pages: u32,
    /// First visible number
    pub desde: TicketNumber,
    /// Last visible number
    pub hasta: TicketNumber,
}

impl PageWindow {
    /// Window for `page` of `raffle`, clamping the page into range
    #[must_use]
    pub fn new(raffle: &Raffle, page: u32) -> Self {
        let total_pages = total_pages(raffle);
        let page = page.clamp(1, total_pages);

        let offset = i64::from(page - 1) * i64::from(PAGE_SIZE);
        let desde = i64::from(raffle.rango_min.value()) + offset;
        let hasta = (desde + i64::from(PAGE_SIZE) - 1).min(i64::from(raffle.rango_max.value()));

        Self {
            page,
            total_pages,
            desde: TicketNumber::new(i32::try_from(desde).unwrap_or(i32::MAX)),
            hasta: TicketNumber::new(i32::try_from(hasta).unwrap_or(i32::MAX)),
        }
    }

    /// Whether `numero` is on this page
    #[must_use]
    pub fn contains(&self, numero: TicketNumber) -> bool {
        self.desde <= numero && numero <= self.hasta
    }

    /// Whether navigation controls are needed at all
    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        self.total_pages > 1
    }

    /// Whether a previous page exists
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Whether a next page exists
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// `ceil(total / PAGE_SIZE)`, at least 1
#[must_use]
pub fn total_pages(raffle: &Raffle) -> u32 {
    let pages = raffle.total_numbers().div_ceil(u64::from(PAGE_SIZE));
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
}
