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

//! Error types for reservation and webhook processing.

use crate::booking::BookingStatus;
use thiserror::Error;

/// Reservation processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Input rejected before any transaction was opened
    #[error("invalid input: {0}")]
    Validation(&'static str),

    /// Referenced booking does not exist
    #[error("booking not found")]
    NotFound,

    /// Referenced package does not exist
    #[error("package not found")]
    PackageNotFound,

    /// Package is administratively closed for new bookings
    #[error("package is closed")]
    PackageClosed,

    /// Requested status change is not an edge of the transition table
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// Conditional quota decrement found insufficient remaining inventory
    #[error("insufficient remaining quota")]
    QuotaExhausted,

    /// Webhook signature verification failed; deliberately carries no detail
    #[error("authentication failed")]
    Authentication,

    /// Webhook event type is not part of the supported vocabulary
    #[error("unsupported webhook event: {0}")]
    UnsupportedEvent(String),

    /// Creation attempt rejected by the sliding-window limiter
    #[error("too many booking attempts, retry shortly")]
    RateLimited,
}
