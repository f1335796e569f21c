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

//! Payment webhook integration tests: authenticity, idempotency, and the
//! interplay with quota reservation.

use booking_engine_rs::{
    ActorIdentity, AppliedEvent, BookingError, BookingStatus, BookingSummary, CreateBooking,
    PackageId, PaymentStatus, ReservationEngine, TierPrices, TierQuantities, WebhookProcessor,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "test-webhook-secret";

struct Harness {
    engine: Arc<ReservationEngine>,
    processor: WebhookProcessor,
    package: PackageId,
}

fn harness(quota: u32) -> Harness {
    let engine = Arc::new(ReservationEngine::new());
    let package = engine.catalog().insert(
        "Umrah 12 Days",
        TierPrices {
            quad: dec!(100),
            triple: dec!(80),
            double: dec!(60),
        },
        quota,
        false,
    );
    let processor = WebhookProcessor::new(Arc::clone(&engine), SECRET);
    Harness {
        engine,
        processor,
        package,
    }
}

impl Harness {
    fn booking(&self, quad: u32) -> BookingSummary {
        self.engine
            .create_booking(CreateBooking {
                package_id: self.package,
                customer_name: "Budi Santoso".into(),
                customer_phone: "081298765432".into(),
                customer_email: None,
                quantities: TierQuantities {
                    quad,
                    triple: 0,
                    double: 0,
                },
            })
            .unwrap()
    }

    fn deliver(&self, payload: &serde_json::Value) -> Result<AppliedEvent, BookingError> {
        let raw = serde_json::to_vec(payload).unwrap();
        let signature = self.processor.sign(&raw);
        self.processor.process(&raw, &signature)
    }

    fn quota(&self) -> u32 {
        self.engine.catalog().get(&self.package).unwrap().quota()
    }
}

fn paid_event(booking_id: u64) -> serde_json::Value {
    json!({
        "event": "payment.paid",
        "data": {
            "booking_id": booking_id,
            "payment_method": "va_transfer",
            "payment_provider": "midtrans",
            "external_txn_id": "TXN-001",
            "amount": "300",
        },
    })
}

// === payment.paid ===

#[test]
fn paid_event_reserves_and_marks_paid() {
    let h = harness(10);
    let booking = h.booking(3);

    let outcome = h.deliver(&paid_event(booking.id.0)).unwrap();
    assert_eq!(outcome, AppliedEvent::PaymentPaid);

    assert_eq!(h.quota(), 7);
    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Paid);
    assert_eq!(row.payment_status, PaymentStatus::Paid);
    assert_eq!(row.payment.method.as_deref(), Some("va_transfer"));
    assert_eq!(row.payment.provider.as_deref(), Some("midtrans"));
    assert_eq!(row.payment.external_txn_id.as_deref(), Some("TXN-001"));
    assert!(row.paid_at.is_some());
}

#[test]
fn paid_event_resolves_booking_by_code() {
    let h = harness(10);
    let booking = h.booking(2);

    let payload = json!({
        "event": "payment.paid",
        "data": {
            "booking_code": booking.code.as_str(),
            "external_txn_id": "TXN-002",
        },
    });
    h.deliver(&payload).unwrap();

    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Paid);
    assert_eq!(h.quota(), 8);
}

#[test]
fn paid_event_is_idempotent() {
    let h = harness(10);
    let booking = h.booking(3);

    h.deliver(&paid_event(booking.id.0)).unwrap();
    let after_first = h.engine.get_booking(booking.id).unwrap();
    let logs_after_first = h.engine.booking_logs(booking.id).len();

    // At-least-once delivery: the gateway sends the same event again.
    h.deliver(&paid_event(booking.id.0)).unwrap();
    let after_second = h.engine.get_booking(booking.id).unwrap();

    // Quota decremented once, paid_at set once, no duplicate log entry.
    assert_eq!(h.quota(), 7);
    assert_eq!(after_second.paid_at, after_first.paid_at);
    assert_eq!(after_second.status, BookingStatus::Paid);
    assert_eq!(h.engine.booking_logs(booking.id).len(), logs_after_first);
}

#[test]
fn paid_event_on_confirmed_booking_does_not_reserve_again() {
    let h = harness(10);
    let booking = h.booking(3);
    h.engine
        .transition(
            booking.id,
            BookingStatus::Confirmed,
            ActorIdentity::default(),
            None,
        )
        .unwrap();
    assert_eq!(h.quota(), 7);

    h.deliver(&paid_event(booking.id.0)).unwrap();

    // Inventory already held by the confirmed state.
    assert_eq!(h.quota(), 7);
    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Paid);
}

#[test]
fn cancellation_wins_over_late_paid_event() {
    let h = harness(10);
    let booking = h.booking(3);
    h.engine
        .transition(
            booking.id,
            BookingStatus::Cancelled,
            ActorIdentity::default(),
            None,
        )
        .unwrap();
    let logs_before = h.engine.booking_logs(booking.id).len();

    h.deliver(&paid_event(booking.id.0)).unwrap();

    let row = h.engine.get_booking(booking.id).unwrap();
    // Status is not forced back to paid; only the metadata is recorded.
    assert_eq!(row.status, BookingStatus::Cancelled);
    assert_eq!(row.payment_status, PaymentStatus::Failed);
    assert_eq!(row.payment.external_txn_id.as_deref(), Some("TXN-001"));
    assert!(row.paid_at.is_none());
    assert_eq!(h.quota(), 10);
    assert_eq!(h.engine.booking_logs(booking.id).len(), logs_before);
}

#[test]
fn paid_event_aborts_on_exhausted_quota() {
    let h = harness(2);
    let booking = h.booking(2);
    // Another sale drains the quota before the webhook arrives.
    assert!(h.engine.catalog().get(&h.package).unwrap().try_reserve(1));

    let result = h.deliver(&paid_event(booking.id.0));
    assert_eq!(result, Err(BookingError::QuotaExhausted));

    // Whole branch rolled back: booking untouched, no log entry.
    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Pending);
    assert_eq!(row.payment_status, PaymentStatus::Unpaid);
    assert_eq!(row.payment.external_txn_id, None);
    assert_eq!(h.quota(), 1);
    assert_eq!(h.engine.booking_logs(booking.id).len(), 1);
}

#[test]
fn paid_event_provider_defaults_to_gateway() {
    let h = harness(10);
    let booking = h.booking(1);
    let payload = json!({
        "event": "payment.paid",
        "data": { "booking_id": booking.id.0 },
    });
    h.deliver(&payload).unwrap();

    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.payment.provider.as_deref(), Some("gateway"));
}

// === payment.failed ===

#[test]
fn failed_event_keeps_booking_status() {
    let h = harness(10);
    let booking = h.booking(2);

    let payload = json!({
        "event": "payment.failed",
        "data": {
            "booking_id": booking.id.0,
            "payment_provider": "midtrans",
            "external_txn_id": "TXN-F1",
        },
    });
    let outcome = h.deliver(&payload).unwrap();
    assert_eq!(outcome, AppliedEvent::PaymentFailed);

    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Pending);
    assert_eq!(row.payment_status, PaymentStatus::Failed);
    assert_eq!(row.payment.external_txn_id.as_deref(), Some("TXN-F1"));
    assert_eq!(h.quota(), 10);

    let logs = h.engine.booking_logs(booking.id);
    let last = logs.last().unwrap();
    // The failure is logged as a self-edge so the walk stays valid.
    assert_eq!(last.from_status, Some(BookingStatus::Pending));
    assert_eq!(last.to_status, BookingStatus::Pending);
}

#[test]
fn failed_event_redelivery_appends_no_duplicate_log() {
    let h = harness(10);
    let booking = h.booking(2);
    let payload = json!({
        "event": "payment.failed",
        "data": { "booking_id": booking.id.0, "external_txn_id": "TXN-F1" },
    });

    h.deliver(&payload).unwrap();
    let logs_after_first = h.engine.booking_logs(booking.id).len();
    h.deliver(&payload).unwrap();

    assert_eq!(h.engine.booking_logs(booking.id).len(), logs_after_first);
    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.payment_status, PaymentStatus::Failed);
}

// === Rejections ===

#[test]
fn tampered_signature_produces_zero_writes() {
    let h = harness(10);
    let booking = h.booking(3);
    let before = h.engine.get_booking(booking.id).unwrap();
    let logs_before = h.engine.status_log().len();

    let raw = serde_json::to_vec(&paid_event(booking.id.0)).unwrap();
    let mut signature = h.processor.sign(&raw);
    // Flip one nibble.
    let tampered = if signature.ends_with('0') { "1" } else { "0" };
    signature.truncate(signature.len() - 1);
    signature.push_str(tampered);

    let result = h.processor.process(&raw, &signature);
    assert_eq!(result, Err(BookingError::Authentication));

    assert_eq!(h.engine.get_booking(booking.id).unwrap(), before);
    assert_eq!(h.quota(), 10);
    assert_eq!(h.engine.status_log().len(), logs_before);
}

#[test]
fn unsupported_event_leaves_no_partial_effect() {
    let h = harness(10);
    let booking = h.booking(3);
    let payload = json!({
        "event": "payment.refunded",
        "data": { "booking_id": booking.id.0 },
    });

    let result = h.deliver(&payload);
    assert_eq!(
        result,
        Err(BookingError::UnsupportedEvent("payment.refunded".into()))
    );

    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(row.status, BookingStatus::Pending);
    assert_eq!(row.payment_status, PaymentStatus::Unpaid);
    assert_eq!(h.quota(), 10);
}

#[test]
fn unknown_booking_reference_is_not_found() {
    let h = harness(10);
    let result = h.deliver(&paid_event(4242));
    assert_eq!(result, Err(BookingError::NotFound));

    let payload = json!({
        "event": "payment.paid",
        "data": { "booking_code": "BK-does-not-exist" },
    });
    assert_eq!(h.deliver(&payload), Err(BookingError::NotFound));
}

#[test]
fn malformed_payload_is_rejected_after_auth() {
    let h = harness(10);
    let raw = b"{\"event\":";
    let signature = h.processor.sign(raw);
    let result = h.processor.process(raw, &signature);
    assert_eq!(
        result,
        Err(BookingError::Validation("webhook payload is not valid JSON"))
    );
}

#[test]
fn missing_event_type_is_rejected() {
    let h = harness(10);
    let booking = h.booking(1);
    let payload = json!({ "data": { "booking_id": booking.id.0 } });
    let result = h.deliver(&payload);
    assert_eq!(
        result,
        Err(BookingError::Validation("webhook event type is missing"))
    );
}

// === End-to-end lifecycle ===

#[test]
fn cancel_after_webhook_paid_refunds_inventory_keeps_payment() {
    let h = harness(10);
    let booking = h.booking(3);

    h.deliver(&paid_event(booking.id.0)).unwrap();
    assert_eq!(h.quota(), 7);

    h.engine
        .transition(
            booking.id,
            BookingStatus::Cancelled,
            ActorIdentity {
                user_id: Some(7),
                role: Some("admin".into()),
            },
            Some("customer requested refund".into()),
        )
        .unwrap();

    let row = h.engine.get_booking(booking.id).unwrap();
    assert_eq!(h.quota(), 10);
    assert_eq!(row.status, BookingStatus::Cancelled);
    assert_eq!(row.payment_status, PaymentStatus::Paid);
}
