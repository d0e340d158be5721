//! Pagination cursor for the channel feed
//!
//! Tracks the next page to request, whether a request is outstanding and
//! whether the listing has run dry. `exhausted` never resets for the lifetime
//! of one cursor.

use crate::error::CursorError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    next_page_index: u32,
    exhausted: bool,
    in_flight: bool,
}

impl PaginationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_page_index(&self) -> u32 {
        self.next_page_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn can_fetch(&self) -> bool {
        !self.exhausted && !self.in_flight
    }

    /// Mark a fetch as outstanding and return the page index to request
    pub fn begin_fetch(&mut self) -> Result<u32, CursorError> {
        if self.exhausted {
            return Err(CursorError::Exhausted);
        }
        if self.in_flight {
            return Err(CursorError::InFlight);
        }
        self.in_flight = true;
        Ok(self.next_page_index)
    }

    /// Record a successful fetch. Zero items exhausts the cursor.
    pub fn complete_fetch(&mut self, items_returned: usize) {
        self.in_flight = false;
        if items_returned == 0 {
            self.exhausted = true;
        } else {
            self.next_page_index += 1;
        }
    }

    /// Record a failed fetch; the same page is requested next time.
    pub fn fail_fetch(&mut self) {
        self.in_flight = false;
    }
}
