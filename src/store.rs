// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Booking repository and the append-only status-change log.
//!
//! Each booking row sits behind its own [`parking_lot::Mutex`]. Holding the
//! guard across a whole transition serializes operations on the same booking
//! while letting different bookings proceed fully concurrently.

use crate::base::{BookingCode, BookingId};
use crate::booking::{Booking, StatusLogEntry};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// A booking row behind its exclusive row lock.
#[derive(Debug)]
pub struct BookingRecord {
    inner: Mutex<Booking>,
}

impl BookingRecord {
    fn new(booking: Booking) -> Self {
        Self {
            inner: Mutex::new(booking),
        }
    }

    /// Takes the exclusive row lock. The second of two concurrent
    /// transition attempts observes the first one's committed result.
    pub fn lock(&self) -> MutexGuard<'_, Booking> {
        self.inner.lock()
    }

    /// Clones the row under a short-lived lock.
    pub fn snapshot(&self) -> Booking {
        self.inner.lock().clone()
    }
}

/// Persistent store of booking rows, indexed by ID and by booking code.
pub struct BookingStore {
    bookings: DashMap<BookingId, BookingRecord>,
    by_code: DashMap<BookingCode, BookingId>,
    next_id: AtomicU64,
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_code: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> BookingId {
        BookingId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts a freshly created booking row. Codes are generated unique,
    /// so a code collision here is a bug.
    pub fn insert(&self, booking: Booking) {
        debug_assert!(
            !self.by_code.contains_key(&booking.code),
            "booking code collision: {}",
            booking.code
        );
        self.by_code.insert(booking.code.clone(), booking.id);
        self.bookings.insert(booking.id, BookingRecord::new(booking));
    }

    pub fn get(
        &self,
        id: &BookingId,
    ) -> Option<dashmap::mapref::one::Ref<'_, BookingId, BookingRecord>> {
        self.bookings.get(id)
    }

    pub fn resolve_code(&self, code: &str) -> Option<BookingId> {
        self.by_code
            .get(&BookingCode(code.to_string()))
            .map(|entry| *entry.value())
    }

    /// Snapshots every booking row. Used by the admin listing surface.
    pub fn snapshots(&self) -> Vec<Booking> {
        self.bookings
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only audit ledger of status changes.
///
/// Entries are created, never mutated or deleted; the per-booking view
/// reconstructs the full history of any booking in insertion order.
#[derive(Debug, Default)]
pub struct StatusLog {
    entries: Mutex<Vec<StatusLogEntry>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: StatusLogEntry) {
        self.entries.lock().push(entry);
    }

    /// Full history of one booking, oldest first.
    pub fn for_booking(&self, id: BookingId) -> Vec<StatusLogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.booking_id == id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
