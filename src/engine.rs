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

//! Reservation engine: booking creation and the transition state machine.
//!
//! A transition is one atomic block. The exclusive row lock taken at the top
//! of [`ReservationEngine::transition`] is held across validate → quota →
//! booking-field updates → log append, so quota and booking status are never
//! observably inconsistent with each other. A failed step before the first
//! mutation simply returns, which rolls the whole operation back.
//!
//! # Quota handling
//!
//! | edge | effect |
//! |------|--------|
//! | non-reserving → reserving | conditional `quota -= pax`, fails closed |
//! | reserving → cancelled | unconditional `quota += pax` |
//! | anything else | none |
//!
//! Creation only checks capacity advisorily and does **not** decrement;
//! authoritative reservation happens at the first reserving transition.

use crate::base::{BookingCode, BookingId, PackageId};
use crate::booking::{
    ActorIdentity, Booking, BookingStatus, ChangeSource, CustomerIdentity, PaymentMetadata,
    PaymentStatus, QuotaEffect, StatusLogEntry, TierQuantities, quota_effect,
};
use crate::catalog::PackageCatalog;
use crate::error::BookingError;
use crate::store::{BookingStore, StatusLog};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw creation input, as submitted by the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub package_id: PackageId,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    #[serde(flatten)]
    pub quantities: TierQuantities,
}

/// What the customer gets back after a successful creation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookingSummary {
    pub id: BookingId,
    pub code: BookingCode,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_pax: u32,
    pub total_price: Decimal,
}

/// The reservation state machine over the shared transactional store.
pub struct ReservationEngine {
    catalog: PackageCatalog,
    bookings: BookingStore,
    log: StatusLog,
}

impl ReservationEngine {
    pub fn new() -> Self {
        Self::with_catalog(PackageCatalog::new())
    }

    pub fn with_catalog(catalog: PackageCatalog) -> Self {
        Self {
            catalog,
            bookings: BookingStore::new(),
            log: StatusLog::new(),
        }
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &BookingStore {
        &self.bookings
    }

    pub fn status_log(&self) -> &StatusLog {
        &self.log
    }

    /// Creates a booking in `pending`/`unpaid`.
    ///
    /// Validation is fail-fast with no partial effects: identity fields,
    /// then quantities, then package existence and open/closed flag, then a
    /// non-locking capacity check. `total_price` is computed once from the
    /// tier prices at this moment and never recomputed, preserving
    /// historical pricing.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] - malformed identity, zero pax, or a
    ///   passenger sum that does not fit in `u32`.
    /// - [`BookingError::PackageNotFound`] / [`BookingError::PackageClosed`].
    /// - [`BookingError::QuotaExhausted`] - advisory capacity check failed.
    pub fn create_booking(&self, request: CreateBooking) -> Result<BookingSummary, BookingError> {
        let customer = CustomerIdentity::parse(
            &request.customer_name,
            &request.customer_phone,
            request.customer_email.as_deref(),
        )?;

        let quantities = request.quantities;
        let total_pax = quantities
            .total_pax()
            .ok_or(BookingError::Validation("passenger count is out of range"))?;
        if total_pax == 0 {
            return Err(BookingError::Validation("at least one passenger is required"));
        }

        let package = self
            .catalog
            .get(&request.package_id)
            .ok_or(BookingError::PackageNotFound)?;
        let snapshot = package.snapshot();
        if snapshot.closed {
            return Err(BookingError::PackageClosed);
        }
        // Advisory only; the authoritative conditional decrement happens at
        // the first reserving transition.
        if total_pax > snapshot.quota {
            return Err(BookingError::QuotaExhausted);
        }

        let total_price = Decimal::from(quantities.quad) * snapshot.prices.quad
            + Decimal::from(quantities.triple) * snapshot.prices.triple
            + Decimal::from(quantities.double) * snapshot.prices.double;

        let now = Utc::now();
        let id = self.bookings.allocate_id();
        let code = BookingCode::generate();
        let booking = Booking {
            id,
            code: code.clone(),
            package_id: snapshot.id,
            package_title: snapshot.title,
            customer,
            quantities,
            total_pax,
            total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment: PaymentMetadata::default(),
            admin_note: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.bookings.insert(booking);

        self.log.append(StatusLogEntry {
            booking_id: id,
            from_status: None,
            to_status: BookingStatus::Pending,
            source: ChangeSource::Customer,
            actor: None,
            note: Some("booking created by customer".to_string()),
            created_at: now,
        });

        info!(booking = %code, pax = total_pax, "booking created");

        Ok(BookingSummary {
            id,
            code,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            total_pax,
            total_price,
        })
    }

    /// Applies an admin-driven status transition as one atomic block.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - no such booking.
    /// - [`BookingError::IllegalTransition`] - edge not in the table.
    /// - [`BookingError::QuotaExhausted`] - conditional reservation failed;
    ///   the booking is left untouched.
    pub fn transition(
        &self,
        booking_id: BookingId,
        target: BookingStatus,
        actor: ActorIdentity,
        note: Option<String>,
    ) -> Result<(), BookingError> {
        let record = self.bookings.get(&booking_id).ok_or(BookingError::NotFound)?;
        // Exclusive row lock, held until the log entry is appended.
        let mut row = record.lock();

        let from = row.status;
        if !from.allows(target) {
            return Err(BookingError::IllegalTransition { from, to: target });
        }

        match quota_effect(from, target) {
            QuotaEffect::Reserve => {
                let package = self
                    .catalog
                    .get(&row.package_id)
                    .ok_or(BookingError::PackageNotFound)?;
                if !package.try_reserve(row.total_pax) {
                    warn!(booking = %row.code, pax = row.total_pax, "quota exhausted");
                    return Err(BookingError::QuotaExhausted);
                }
            }
            QuotaEffect::Release => {
                if let Some(package) = self.catalog.get(&row.package_id) {
                    package.release(row.total_pax);
                }
            }
            QuotaEffect::None => {}
        }

        let now = Utc::now();
        row.status = target;
        if target == BookingStatus::Paid {
            row.payment_status = PaymentStatus::Paid;
            if row.paid_at.is_none() {
                row.paid_at = Some(now);
            }
        }
        // Cancelling a paid booking keeps payment_status=paid: cancellation
        // is a refund-adjacent fact, not an erasure of payment history.
        if target == BookingStatus::Cancelled && row.payment_status != PaymentStatus::Paid {
            row.payment_status = PaymentStatus::Failed;
        }
        row.admin_note = note.clone();
        row.updated_at = now;

        self.log.append(StatusLogEntry {
            booking_id,
            from_status: Some(from),
            to_status: target,
            source: ChangeSource::Admin,
            actor: Some(actor),
            note,
            created_at: now,
        });

        info!(booking = %row.code, %from, to = %target, "status transition");
        Ok(())
    }

    /// Snapshot of a booking row.
    pub fn get_booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings.get(&id).map(|record| record.snapshot())
    }

    /// Snapshot of a booking row, looked up by its booking code.
    pub fn find_by_code(&self, code: &str) -> Option<Booking> {
        let id = self.bookings.resolve_code(code)?;
        self.get_booking(id)
    }

    /// Full status history of a booking, oldest first.
    pub fn booking_logs(&self, id: BookingId) -> Vec<StatusLogEntry> {
        self.log.for_booking(id)
    }

    /// Snapshots of all bookings, in no particular order.
    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.snapshots()
    }
}

impl Default for ReservationEngine {
    fn default() -> Self {
        Self::new()
    }
}
