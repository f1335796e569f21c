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

//! Payment webhook processor.
//!
//! Ingests at-least-once notifications from the payment gateway and applies
//! each logical event's effect exactly once. Signature verification runs over
//! the raw payload bytes and precedes any parsing or business logic; a
//! mismatch reports nothing about why it failed.
//!
//! Idempotency relies on state guards, not a processed-event ledger: quota,
//! `paid_at`, and the status log are each guarded by the current booking
//! state, while payment metadata is last-write-wins on redelivery.

use crate::base::BookingId;
use crate::booking::{BookingStatus, ChangeSource, PaymentStatus, StatusLogEntry};
use crate::engine::ReservationEngine;
use crate::error::BookingError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw payload.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const DEFAULT_PROVIDER: &str = "gateway";

/// Webhook event successfully applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedEvent {
    PaymentPaid,
    PaymentFailed,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: Option<String>,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    booking_id: Option<u64>,
    booking_code: Option<String>,
    payment_method: Option<String>,
    payment_provider: Option<String>,
    external_txn_id: Option<String>,
    #[allow(dead_code)]
    amount: Option<Decimal>,
}

/// Authenticates and applies gateway notifications against the engine.
pub struct WebhookProcessor {
    engine: Arc<ReservationEngine>,
    secret: Vec<u8>,
}

impl WebhookProcessor {
    pub fn new(engine: Arc<ReservationEngine>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            engine,
            secret: secret.into(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of a payload. Used by the payment-intent
    /// surface to hand out example signatures, and by tests.
    pub fn sign(&self, raw: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(raw);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time signature check. Any failure, including malformed hex,
    /// collapses into the same opaque error.
    fn verify(&self, raw: &[u8], signature: &str) -> Result<(), BookingError> {
        let supplied = hex::decode(signature).map_err(|_| BookingError::Authentication)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(raw);
        mac.verify_slice(&supplied)
            .map_err(|_| BookingError::Authentication)
    }

    /// Processes one delivery: authenticate, parse, apply. Every branch is
    /// atomic with respect to the booking row; a failure leaves no partial
    /// effect.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Authentication`] - bad signature, zero state change.
    /// - [`BookingError::Validation`] - malformed payload, no state change.
    /// - [`BookingError::NotFound`] - unknown booking reference.
    /// - [`BookingError::UnsupportedEvent`] - recognized payload, unknown event.
    /// - [`BookingError::QuotaExhausted`] - paid event could not reserve seats.
    pub fn process(&self, raw: &[u8], signature: &str) -> Result<AppliedEvent, BookingError> {
        self.verify(raw, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(raw)
            .map_err(|_| BookingError::Validation("webhook payload is not valid JSON"))?;
        let event = match envelope.event.as_deref() {
            Some(event) if !event.is_empty() => event.to_string(),
            _ => return Err(BookingError::Validation("webhook event type is missing")),
        };
        let data = envelope.data;

        let booking_id = self.resolve_booking(&data)?;

        match event.as_str() {
            "payment.paid" => self.apply_paid(booking_id, &data),
            "payment.failed" => self.apply_failed(booking_id, &data),
            _ => {
                warn!(%event, "unsupported webhook event");
                Err(BookingError::UnsupportedEvent(event))
            }
        }
    }

    fn resolve_booking(&self, data: &WebhookData) -> Result<BookingId, BookingError> {
        if let Some(id) = data.booking_id.filter(|id| *id > 0) {
            let id = BookingId(id);
            return if self.engine.store().get(&id).is_some() {
                Ok(id)
            } else {
                Err(BookingError::NotFound)
            };
        }
        match data.booking_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => self
                .engine
                .store()
                .resolve_code(code)
                .ok_or(BookingError::NotFound),
            _ => Err(BookingError::Validation(
                "webhook data must reference a booking id or code",
            )),
        }
    }

    /// `payment.paid`: reserve quota if the booking is not already holding
    /// inventory, then mark it paid. Cancellation wins over a late success:
    /// a cancelled booking only records the payment metadata.
    fn apply_paid(&self, booking_id: BookingId, data: &WebhookData) -> Result<AppliedEvent, BookingError> {
        let record = self
            .engine
            .store()
            .get(&booking_id)
            .ok_or(BookingError::NotFound)?;
        let mut row = record.lock();
        let current = row.status;
        let now = Utc::now();

        if current == BookingStatus::Cancelled {
            row.payment.method = data.payment_method.clone();
            row.payment.provider = Some(
                data.payment_provider
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            );
            row.payment.external_txn_id = data.external_txn_id.clone();
            row.updated_at = now;
            info!(booking = %row.code, "paid webhook on cancelled booking, metadata recorded");
            return Ok(AppliedEvent::PaymentPaid);
        }

        if !current.is_reserving() {
            let package = self
                .engine
                .catalog()
                .get(&row.package_id)
                .ok_or(BookingError::PackageNotFound)?;
            if !package.try_reserve(row.total_pax) {
                warn!(booking = %row.code, pax = row.total_pax, "quota exhausted on paid webhook");
                return Err(BookingError::QuotaExhausted);
            }
        }

        row.status = BookingStatus::Paid;
        row.payment_status = PaymentStatus::Paid;
        row.payment.method = data.payment_method.clone();
        row.payment.provider = Some(
            data.payment_provider
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
        );
        row.payment.external_txn_id = data.external_txn_id.clone();
        if row.paid_at.is_none() {
            row.paid_at = Some(now);
        }
        row.updated_at = now;

        // Redelivery of an identical event on an already-paid booking must
        // not append a second entry describing the same transition.
        if current != BookingStatus::Paid {
            self.engine.status_log().append(StatusLogEntry {
                booking_id,
                from_status: Some(current),
                to_status: BookingStatus::Paid,
                source: ChangeSource::Webhook,
                actor: None,
                note: Some(format!(
                    "payment paid, external txn {}",
                    data.external_txn_id.as_deref().unwrap_or("-")
                )),
                created_at: now,
            });
        }

        info!(booking = %row.code, from = %current, "paid webhook applied");
        Ok(AppliedEvent::PaymentPaid)
    }

    /// `payment.failed`: booking status is left unchanged; only the payment
    /// fields move. The log entry is guarded so redelivery stays silent.
    fn apply_failed(
        &self,
        booking_id: BookingId,
        data: &WebhookData,
    ) -> Result<AppliedEvent, BookingError> {
        let record = self
            .engine
            .store()
            .get(&booking_id)
            .ok_or(BookingError::NotFound)?;
        let mut row = record.lock();
        let current = row.status;
        let already_failed = row.payment_status == PaymentStatus::Failed;
        let now = Utc::now();

        if !already_failed {
            row.payment_status = PaymentStatus::Failed;
        }
        row.payment.provider = Some(
            data.payment_provider
                .clone()
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
        );
        row.payment.external_txn_id = data.external_txn_id.clone();
        row.updated_at = now;

        if !already_failed {
            self.engine.status_log().append(StatusLogEntry {
                booking_id,
                from_status: Some(current),
                to_status: current,
                source: ChangeSource::Webhook,
                actor: None,
                note: Some(format!(
                    "payment failed, external txn {}",
                    data.external_txn_id.as_deref().unwrap_or("-")
                )),
                created_at: now,
            });
        }

        info!(booking = %row.code, "failed webhook applied");
        Ok(AppliedEvent::PaymentFailed)
    }
}
