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

use booking_engine_rs::ReservationEngine;
use booking_engine_rs::http::{AppState, create_router};
use clap::Parser;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Booking Engine - travel-package reservation server
///
/// Serves booking creation, admin status transitions, and the payment
/// gateway webhook over HTTP.
#[derive(Parser, Debug)]
#[command(name = "booking-engine-rs")]
#[command(about = "A reservation server for travel-package bookings", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Shared secret for webhook signature verification
    ///
    /// Falls back to PAYMENT_WEBHOOK_SECRET, then to a development default.
    #[arg(long)]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let secret = args
        .webhook_secret
        .or_else(|| std::env::var("PAYMENT_WEBHOOK_SECRET").ok())
        .unwrap_or_else(|| "DEV_PAYMENT_WEBHOOK_SECRET".to_string());

    let state = AppState::new(Arc::new(ReservationEngine::new()), &secret);
    let app = create_router(state);

    let listener = match TcpListener::bind(args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding {}: {}", args.bind, e);
            process::exit(1);
        }
    };

    info!("booking server listening on http://{}", args.bind);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
