use crate::auth::require_user;
use crate::error::ApiResult;
use crate::models::*;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use chrono::Utc;
use wanderlust_common::upstream_auth::UpstreamUser;

type User = Option<Extension<UpstreamUser>>;

pub async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        env: state.env_name.clone(),
        service: "Booking API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_bookings(
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<Vec<BookingView>>> {
    let user_id = require_user(user)?;
    Ok(Json(state.bookings.list_user_bookings(&user_id).await?))
}

pub async fn booking_form(
    Path(listing_id): Path<String>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<BookingFormOut>> {
    require_user(user)?;
    Ok(Json(state.bookings.booking_form(&listing_id).await?))
}

pub async fn create_booking(
    Path(listing_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> ApiResult<Json<CreateBookingOut>> {
    let user_id = require_user(user)?;
    let Json(body) = body?;
    let out = state
        .bookings
        .create_booking(&listing_id, body.into_inner(), &user_id, Utc::now())
        .await?;
    Ok(Json(out))
}

pub async fn availability(
    Path(listing_id): Path<String>,
    Query(params): Query<AvailabilityParams>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<AvailabilityOut>> {
    require_user(user)?;
    let out = state
        .bookings
        .check_availability(&listing_id, &params, Utc::now())
        .await?;
    Ok(Json(out))
}

pub async fn get_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<BookingView>> {
    let user_id = require_user(user)?;
    Ok(Json(state.bookings.get_booking(&booking_id, &user_id).await?))
}

pub async fn create_order(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<OrderOut>> {
    let user_id = require_user(user)?;
    Ok(Json(state.bookings.create_order(&booking_id, &user_id).await?))
}

pub async fn process_upi(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    body: Result<Json<UpiIn>, JsonRejection>,
) -> ApiResult<Json<PaymentOut>> {
    let user_id = require_user(user)?;
    let Json(body) = body?;
    let out = state
        .bookings
        .process_upi(&booking_id, &user_id, body, Utc::now())
        .await?;
    Ok(Json(out))
}

pub async fn process_upi_app(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    body: Result<Json<UpiAppIn>, JsonRejection>,
) -> ApiResult<Json<PaymentOut>> {
    let user_id = require_user(user)?;
    let Json(body) = body?;
    let out = state
        .bookings
        .process_upi_app(&booking_id, &user_id, body, Utc::now())
        .await?;
    Ok(Json(out))
}

pub async fn process_qr(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    body: Result<Json<QrIn>, JsonRejection>,
) -> ApiResult<Json<PaymentOut>> {
    let user_id = require_user(user)?;
    let Json(body) = body?;
    let out = state
        .bookings
        .process_qr(&booking_id, &user_id, body, Utc::now())
        .await?;
    Ok(Json(out))
}

/// The simulated checkout posts without a body; the gateway widget posts its callback fields.
pub async fn payment_success(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    body: Result<Json<PaymentSuccessIn>, JsonRejection>,
) -> ApiResult<Json<PaymentOut>> {
    let user_id = require_user(user)?;
    let body = match body {
        Ok(Json(b)) => b,
        Err(JsonRejection::MissingJsonContentType(_)) => PaymentSuccessIn::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let out = state
        .bookings
        .payment_success(&booking_id, &user_id, body, Utc::now())
        .await?;
    Ok(Json(out))
}

pub async fn payment_page(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<PricedBookingOut>> {
    let user_id = require_user(user)?;
    Ok(Json(state.bookings.payment_page(&booking_id, &user_id).await?))
}

pub async fn confirmation(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
) -> ApiResult<Json<PricedBookingOut>> {
    let user_id = require_user(user)?;
    Ok(Json(state.bookings.confirmation(&booking_id, &user_id).await?))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// API clients get `{success, status}`; browsers are sent back to their booking list.
pub async fn cancel_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    user: User,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user_id = require_user(user)?;
    let status = state.bookings.cancel_booking(&booking_id, &user_id).await?;
    if wants_json(&headers) {
        Ok(Json(CancelOut {
            success: true,
            status,
        })
        .into_response())
    } else {
        Ok(Redirect::to("/bookings").into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accept_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html, Application/JSON;q=0.9"),
        );
        assert!(wants_json(&headers));
    }
}
