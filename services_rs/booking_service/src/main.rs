mod auth;
mod config;
mod dates;
mod db;
mod error;
mod gateway;
mod handlers;
mod lifecycle;
mod models;
mod payments;
mod pricing;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use axum::extract::MatchedPath;
use axum::http::{header::HeaderName, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use config::{Config, StoreKind};
use gateway::{HttpGateway, PaymentGateway};
use lifecycle::Bookings;
use models::Listing;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use store::{BookingStore, ListingStore, MemoryStore};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use wanderlust_common::request_id::{RequestIdLayer, REQUEST_ID_HEADER};
use wanderlust_common::upstream_auth::UpstreamAuthLayer;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let seed = match cfg.listings_seed.as_deref().map(load_listings_seed).transpose() {
        Ok(s) => s.unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "listings seed load failed");
            std::process::exit(2);
        }
    };

    let (booking_store, listing_store): (Arc<dyn BookingStore>, Arc<dyn ListingStore>) =
        match cfg.store {
            StoreKind::Postgres => {
                let pool = match db::connect(&cfg.db_url).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error = %e, "db connect failed");
                        std::process::exit(2);
                    }
                };
                if let Err(e) = db::ensure_schema(&pool, &cfg.db_schema).await {
                    tracing::error!(error = %e, "db ensure_schema failed");
                    std::process::exit(2);
                }
                let pg = Arc::new(db::PgStore::new(pool, cfg.db_schema.clone()));
                for listing in &seed {
                    if let Err(e) = pg.upsert_listing(listing).await {
                        tracing::error!(error = %e, listing_id = %listing.id, "listing seed failed");
                        std::process::exit(2);
                    }
                }
                (pg.clone() as Arc<dyn BookingStore>, pg as Arc<dyn ListingStore>)
            }
            StoreKind::Memory => {
                tracing::warn!("using in-memory booking store; data is lost on restart");
                let mem = Arc::new(MemoryStore::with_listings(seed));
                (mem.clone() as Arc<dyn BookingStore>, mem as Arc<dyn ListingStore>)
            }
        };

    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "http client init failed");
            std::process::exit(2);
        }
    };

    let gateway = cfg.gateway.as_ref().map(|g| {
        Arc::new(HttpGateway::new(
            http.clone(),
            &g.base_url,
            g.key_id.clone(),
            g.key_secret.clone(),
        )) as Arc<dyn PaymentGateway>
    });
    if gateway.is_none() {
        tracing::info!("payment gateway not configured; gateway orders are disabled");
    }

    let state = AppState {
        bookings: Bookings::new(booking_store, listing_store, gateway, cfg.currency.clone()),
        env_name: cfg.env_name.clone(),
    };

    let upstream = UpstreamAuthLayer::new(cfg.require_internal_secret, cfg.internal_secret.clone())
        .with_allowed_callers(cfg.internal_allowed_callers.clone());

    let app = build_app(state, upstream, cfg.max_body_bytes);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));
    tracing::info!(%addr, "starting wanderlust_booking_service");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "bind failed");
            std::process::exit(2);
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

fn load_listings_seed(path: &str) -> Result<Vec<Listing>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    serde_json::from_str(&raw).map_err(|e| format!("{path}: {e}"))
}

fn build_app(state: AppState, upstream: UpstreamAuthLayer, max_body_bytes: usize) -> Router {
    let authed = Router::new()
        .route("/bookings", get(handlers::list_bookings))
        .route(
            "/listings/:listing_id/book",
            get(handlers::booking_form).post(handlers::create_booking),
        )
        .route(
            "/listings/:listing_id/availability",
            get(handlers::availability),
        )
        .route(
            "/bookings/create/:listing_id",
            post(handlers::create_booking),
        )
        .route(
            "/bookings/:booking_id",
            get(handlers::get_booking).delete(handlers::cancel_booking),
        )
        .route(
            "/bookings/:booking_id/create-order",
            post(handlers::create_order),
        )
        .route(
            "/bookings/:booking_id/process-upi",
            post(handlers::process_upi),
        )
        .route(
            "/bookings/:booking_id/process-upi-app",
            post(handlers::process_upi_app),
        )
        .route(
            "/bookings/:booking_id/process-qr",
            post(handlers::process_qr),
        )
        .route(
            "/bookings/:booking_id/payment-success",
            post(handlers::payment_success),
        )
        .route("/bookings/:booking_id/payment", get(handlers::payment_page))
        .route(
            "/bookings/:booking_id/confirmation",
            get(handlers::confirmation),
        )
        .layer(upstream);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(authed)
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        // Route templates only; booking ids and query strings stay out of the logs.
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or_else(|| req.uri().path());
                tracing::span!(
                    tracing::Level::INFO,
                    "http_request",
                    method = %req.method(),
                    path = %path
                )
            }),
        )
        .layer(RequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
