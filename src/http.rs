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

//! REST surface for the reservation engine.
//!
//! The router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()` so the creation
//! rate limiter can key on the client address.
//!
//! ## Endpoints
//!
//! - `POST /bookings` - customer booking creation (rate limited)
//! - `GET /bookings` - admin listing with filters and pagination
//! - `GET /bookings/{id}` - booking detail
//! - `GET /bookings/{id}/logs` - status history, newest first
//! - `PATCH /bookings/{id}/status` - admin transition
//! - `POST /bookings/{id}/payment-intent` - mock signed payment intent
//! - `POST /payments/webhook` - gateway notifications
//! - `POST /packages`, `GET /packages/{id}` - minimal catalog seeding

use crate::base::{BookingId, PackageId};
use crate::booking::{ActorIdentity, Booking, BookingStatus, PaymentStatus, StatusLogEntry};
use crate::catalog::TierPrices;
use crate::engine::{BookingSummary, CreateBooking, ReservationEngine};
use crate::error::BookingError;
use crate::rate_limit::CreationRateLimiter;
use crate::webhook::{SIGNATURE_HEADER, WebhookProcessor};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// === Application State ===

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub webhook: Arc<WebhookProcessor>,
    pub limiter: Arc<CreationRateLimiter>,
}

impl AppState {
    pub fn new(engine: Arc<ReservationEngine>, webhook_secret: &str) -> Self {
        let webhook = Arc::new(WebhookProcessor::new(Arc::clone(&engine), webhook_secret));
        Self {
            engine,
            webhook,
            limiter: Arc::new(CreationRateLimiter::new()),
        }
    }
}

// === Request/Response DTOs ===

/// Request body for creating a booking.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub package_id: u64,
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub qty_quad: u32,
    #[serde(default)]
    pub qty_triple: u32,
    #[serde(default)]
    pub qty_double: u32,
}

/// Request body for an admin status transition.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// Admin listing filters.
#[derive(Debug, Default, Deserialize)]
pub struct ListBookingsQuery {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub q: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub items: Vec<Booking>,
    pub pagination: Pagination,
}

/// Request body for seeding a package.
#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub title: String,
    pub price_quad: Decimal,
    pub price_triple: Decimal,
    pub price_double: Decimal,
    pub quota: u32,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatePackageResponse {
    pub id: PackageId,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Error Handling ===

/// Wrapper converting [`BookingError`] into HTTP responses.
pub struct AppError(BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            BookingError::NotFound => (StatusCode::NOT_FOUND, "BOOKING_NOT_FOUND"),
            BookingError::PackageNotFound => (StatusCode::NOT_FOUND, "PACKAGE_NOT_FOUND"),
            BookingError::PackageClosed => (StatusCode::BAD_REQUEST, "PACKAGE_CLOSED"),
            BookingError::IllegalTransition { .. } => {
                (StatusCode::BAD_REQUEST, "ILLEGAL_TRANSITION")
            }
            BookingError::QuotaExhausted => (StatusCode::UNPROCESSABLE_ENTITY, "QUOTA_EXHAUSTED"),
            BookingError::Authentication => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED"),
            BookingError::UnsupportedEvent(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_EVENT"),
            BookingError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /bookings - customer creation, shed by the sliding-window limiter.
async fn create_booking(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingSummary>), AppError> {
    state.limiter.check(&addr.ip().to_string())?;

    let summary = state.engine.create_booking(CreateBooking {
        package_id: PackageId(request.package_id),
        customer_name: request.customer_name,
        customer_phone: request.customer_phone,
        customer_email: request.customer_email,
        quantities: crate::booking::TierQuantities {
            quad: request.qty_quad,
            triple: request.qty_triple,
            double: request.qty_double,
        },
    })?;

    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /bookings - admin listing with filters and pagination.
async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Json<BookingListResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let needle = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| q.chars().take(80).collect::<String>().to_lowercase());

    let mut items: Vec<Booking> = state
        .engine
        .bookings()
        .into_iter()
        .filter(|booking| query.status.is_none_or(|s| booking.status == s))
        .filter(|booking| {
            query
                .payment_status
                .is_none_or(|s| booking.payment_status == s)
        })
        .filter(|booking| {
            needle.as_deref().is_none_or(|needle| {
                booking.code.as_str().to_lowercase().contains(needle)
                    || booking.customer.name.to_lowercase().contains(needle)
                    || booking.customer.phone.to_lowercase().contains(needle)
                    || booking.package_title.to_lowercase().contains(needle)
            })
        })
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = items.len();
    let total_pages = total.div_ceil(limit).max(1);
    // page is client-controlled and unbounded; the offset must not overflow.
    let items = items
        .into_iter()
        .skip(page.saturating_sub(1).saturating_mul(limit))
        .take(limit)
        .collect();

    Json(BookingListResponse {
        items,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages,
        },
    })
}

/// GET /bookings/{id} - booking detail.
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Booking>, AppError> {
    state
        .engine
        .get_booking(BookingId(id))
        .map(Json)
        .ok_or_else(|| AppError(BookingError::NotFound))
}

/// GET /bookings/{id}/logs - status history, newest first.
async fn get_booking_logs(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<StatusLogEntry>>, AppError> {
    if state.engine.get_booking(BookingId(id)).is_none() {
        return Err(AppError(BookingError::NotFound));
    }
    let mut logs = state.engine.booking_logs(BookingId(id));
    logs.reverse();
    Ok(Json(logs))
}

/// PATCH /bookings/{id}/status - admin transition. The acting identity
/// arrives in `x-admin-id` / `x-admin-role` headers from the auth layer.
async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let actor = actor_from_headers(&headers);
    state
        .engine
        .transition(BookingId(id), request.status, actor, request.note)?;
    Ok(Json(MessageResponse {
        message: "booking status updated",
    }))
}

/// POST /bookings/{id}/payment-intent - mock intent plus example signature.
async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let booking = state
        .engine
        .get_booking(BookingId(id))
        .ok_or(BookingError::NotFound)?;
    if booking.status == BookingStatus::Cancelled {
        return Err(AppError(BookingError::Validation(
            "booking is already cancelled",
        )));
    }
    if booking.payment_status == PaymentStatus::Paid {
        return Err(AppError(BookingError::Validation("booking is already paid")));
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let payload = json!({
        "event": "payment.requested",
        "data": {
            "booking_id": booking.id,
            "booking_code": booking.code,
            "amount": booking.total_price,
            "currency": "IDR",
            "external_ref": format!("PAY-{}-{millis}", booking.code),
        },
    });
    let raw = serde_json::to_vec(&payload)
        .map_err(|_| BookingError::Validation("payment intent could not be serialized"))?;
    let signature = state.webhook.sign(&raw);

    Ok(Json(json!({
        "payment_intent": payload,
        "webhook_signature_example": signature,
    })))
}

/// POST /payments/webhook - raw payload plus signature header.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(BookingError::Validation("webhook signature header is missing"))?;

    state.webhook.process(&body, signature)?;
    Ok(Json(MessageResponse {
        message: "webhook processed",
    }))
}

/// POST /packages - seed a package (catalog management stays external).
async fn create_package(
    State(state): State<AppState>,
    Json(request): Json<CreatePackageRequest>,
) -> (StatusCode, Json<CreatePackageResponse>) {
    let id = state.engine.catalog().insert(
        &request.title,
        TierPrices {
            quad: request.price_quad,
            triple: request.price_triple,
            double: request.price_double,
        },
        request.quota,
        request.closed,
    );
    (StatusCode::CREATED, Json(CreatePackageResponse { id }))
}

/// GET /packages/{id} - package snapshot (includes remaining quota).
async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<crate::catalog::PackageSnapshot>, AppError> {
    state
        .engine
        .catalog()
        .get(&PackageId(id))
        .map(|record| Json(record.snapshot()))
        .ok_or_else(|| AppError(BookingError::PackageNotFound))
}

fn actor_from_headers(headers: &HeaderMap) -> ActorIdentity {
    let user_id = headers
        .get("x-admin-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok());
    let role = headers
        .get("x-admin-role")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    ActorIdentity { user_id, role }
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/logs", get(get_booking_logs))
        .route("/bookings/{id}/status", patch(update_booking_status))
        .route("/bookings/{id}/payment-intent", post(create_payment_intent))
        .route("/payments/webhook", post(payment_webhook))
        .route("/packages", post(create_package))
        .route("/packages/{id}", get(get_package))
        .with_state(state)
}
