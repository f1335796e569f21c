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

//! # Booking Engine
//!
//! This library provides a reservation engine for travel-package bookings:
//! a finite, shared seat quota per package, a payment lifecycle driven by
//! customers, admins, and an external payment gateway, and an append-only
//! audit log of every status change.
//!
//! ## Core Components
//!
//! - [`ReservationEngine`]: creation and the status state machine
//! - [`PackageCatalog`]: package rows owning the quota ledger
//! - [`WebhookProcessor`]: idempotent application of gateway notifications
//! - [`CreationRateLimiter`]: sliding-window admission guard
//! - [`BookingError`]: error taxonomy shared by every surface
//!
//! ## Example
//!
//! ```
//! use booking_engine_rs::{
//!     BookingStatus, CreateBooking, PaymentStatus, ReservationEngine, TierPrices,
//!     TierQuantities,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = ReservationEngine::new();
//! let package = engine.catalog().insert(
//!     "Umrah 9 Days",
//!     TierPrices { quad: dec!(100), triple: dec!(80), double: dec!(60) },
//!     10,
//!     false,
//! );
//!
//! let summary = engine
//!     .create_booking(CreateBooking {
//!         package_id: package,
//!         customer_name: "Siti Rahma".into(),
//!         customer_phone: "081234567890".into(),
//!         customer_email: None,
//!         quantities: TierQuantities { quad: 2, triple: 1, double: 0 },
//!     })
//!     .unwrap();
//!
//! assert_eq!(summary.status, BookingStatus::Pending);
//! assert_eq!(summary.payment_status, PaymentStatus::Unpaid);
//! assert_eq!(summary.total_pax, 3);
//! assert_eq!(summary.total_price, dec!(280));
//! ```
//!
//! ## Concurrency
//!
//! Every booking row sits behind its own exclusive lock; operations on the
//! same booking are strictly serialized while different bookings proceed
//! fully concurrently. Quota mutation is always performed under the booking
//! row lock via atomic conditional (decrement) or unconditional (increment)
//! updates, so inventory can never be oversold or lost.

pub mod base;
pub mod booking;
mod catalog;
mod engine;
pub mod error;
pub mod http;
mod rate_limit;
mod store;
pub mod webhook;

pub use base::{BookingCode, BookingId, PackageId};
pub use booking::{
    ActorIdentity, Booking, BookingStatus, ChangeSource, CustomerIdentity, PaymentMetadata,
    PaymentStatus, QuotaEffect, StatusLogEntry, TierQuantities, quota_effect,
};
pub use catalog::{PackageCatalog, PackageRecord, PackageSnapshot, TierPrices};
pub use engine::{BookingSummary, CreateBooking, ReservationEngine};
pub use error::BookingError;
pub use rate_limit::{
    CREATE_CAP, CREATE_WINDOW, CounterStore, CreationRateLimiter, InMemoryCounterStore,
};
pub use store::{BookingRecord, BookingStore, StatusLog};
pub use webhook::{AppliedEvent, SIGNATURE_HEADER, WebhookProcessor};
