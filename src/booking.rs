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

//! Booking domain types and the status state machine.
//!
//! Status lifecycle:
//!
//! ```text
//! pending ──► confirmed ──► paid ──► cancelled
//!    │             │          ▲          ▲
//!    │             └──────────┼──────────┤
//!    └────────────────────────┴──────────┘
//! ```
//!
//! `confirmed` and `paid` are the reserving states: a booking in either of
//! them holds `total_pax` seats of its package quota.

use crate::base::{BookingCode, BookingId, PackageId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BookingError;

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold inventory against the package quota.
    pub fn is_reserving(self) -> bool {
        matches!(self, Self::Confirmed | Self::Paid)
    }

    /// Transition table. A self-transition is a permitted no-op
    /// acknowledgment; `cancelled` is terminal.
    pub fn allows(self, to: BookingStatus) -> bool {
        if self == to {
            return true;
        }
        match self {
            Self::Pending => matches!(to, Self::Confirmed | Self::Paid | Self::Cancelled),
            Self::Confirmed => matches!(to, Self::Paid | Self::Cancelled),
            Self::Paid => matches!(to, Self::Cancelled),
            Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle status, tracked independently of the booking status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota effect of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaEffect {
    /// Conditional decrement; fails closed when remaining quota is short.
    Reserve,
    /// Unconditional increment; returning inventory cannot fail.
    Release,
    None,
}

/// Computes the quota effect of moving a booking from one status to another.
///
/// Inventory is reserved on the first entry into a reserving state and
/// released when a reserving booking is cancelled. Every other edge leaves
/// the quota untouched.
pub fn quota_effect(from: BookingStatus, to: BookingStatus) -> QuotaEffect {
    if !from.is_reserving() && to.is_reserving() {
        QuotaEffect::Reserve
    } else if from.is_reserving() && to == BookingStatus::Cancelled {
        QuotaEffect::Release
    } else {
        QuotaEffect::None
    }
}

/// Who caused a status change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Customer,
    Admin,
    Webhook,
}

/// Acting identity supplied by the auth layer for admin transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: Option<u64>,
    pub role: Option<String>,
}

/// Per-tier seat counts for the three room tiers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierQuantities {
    #[serde(default)]
    pub quad: u32,
    #[serde(default)]
    pub triple: u32,
    #[serde(default)]
    pub double: u32,
}

impl TierQuantities {
    /// Total passengers across the three tiers. Quantities arrive verbatim
    /// from the wire, so the sum is widened before it is checked; `None`
    /// when it does not fit in `u32`.
    pub fn total_pax(self) -> Option<u32> {
        let total = u64::from(self.quad) + u64::from(self.triple) + u64::from(self.double);
        u32::try_from(total).ok()
    }
}

/// Customer identity snapshot, validated and normalized at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl CustomerIdentity {
    /// Validates raw identity fields in order: name, phone, email.
    ///
    /// The name is trimmed and must be 3-120 characters. The phone is
    /// normalized by stripping spaces and hyphens and must then be 9-15
    /// digits with an optional leading `+`. The email is optional; when
    /// present it must have a `local@domain.tld` shape with no whitespace.
    pub fn parse(
        name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> Result<CustomerIdentity, BookingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BookingError::Validation("name and phone are required"));
        }
        if name.chars().count() < 3 || name.chars().count() > 120 {
            return Err(BookingError::Validation("name must be 3-120 characters"));
        }

        let phone = normalize_phone(phone);
        if phone.is_empty() {
            return Err(BookingError::Validation("name and phone are required"));
        }
        if !is_valid_phone(&phone) {
            return Err(BookingError::Validation(
                "phone must be 9-15 digits with optional leading +",
            ));
        }

        let email = match email.map(str::trim) {
            None | Some("") => None,
            Some(e) => {
                if !is_valid_email(e) {
                    return Err(BookingError::Validation("email format is invalid"));
                }
                Some(e.to_string())
            }
        };

        Ok(CustomerIdentity {
            name: name.to_string(),
            phone,
            email,
        })
    }
}

fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// External payment metadata reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub method: Option<String>,
    pub provider: Option<String>,
    pub external_txn_id: Option<String>,
}

/// A booking row. Created once in `pending`/`unpaid`, mutated only through
/// validated transitions, never deleted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub code: BookingCode,
    pub package_id: PackageId,
    /// Package title snapshot taken at creation.
    pub package_title: String,
    pub customer: CustomerIdentity,
    pub quantities: TierQuantities,
    pub total_pax: u32,
    /// Computed once at creation from the tier prices at that moment,
    /// never recomputed.
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment: PaymentMetadata,
    pub admin_note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only audit ledger. Never updated or deleted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusLogEntry {
    pub booking_id: BookingId,
    /// `None` only for the creation event.
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub source: ChangeSource,
    pub actor: Option<ActorIdentity>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
