//! Payment adapters. UPI, UPI-app and QR are accepted server side as reported by the client;
//! the gateway path creates an order first and confirms with the checkout callback.

use crate::error::{BookingError, BookingResult};
use crate::gateway::OrderRequest;
use crate::lifecycle::Bookings;
use crate::models::*;
use crate::pricing::to_minor_units;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Client-reported amounts may differ from the stored total by rounding.
pub const AMOUNT_TOLERANCE: f64 = 1.0;

/// Zero or blank amounts are treated as "not reported" and skip the check.
pub fn check_amount(amount: Option<&AmountIn>, total_price: f64) -> BookingResult<()> {
    let reported = match amount {
        None => return Ok(()),
        Some(AmountIn::Number(v)) if *v == 0.0 => return Ok(()),
        Some(AmountIn::Number(v)) => *v,
        Some(AmountIn::Text(s)) if s.trim().is_empty() => return Ok(()),
        Some(AmountIn::Text(s)) => s.trim().parse::<f64>().map_err(|_| {
            BookingError::ValidationFailure("amount must be numeric".to_string())
        })?,
    };
    if !reported.is_finite() || (reported - total_price).abs() > AMOUNT_TOLERANCE {
        return Err(BookingError::AmountMismatch);
    }
    Ok(())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Bookings {
    async fn payable_booking(&self, booking_id: &str, user_id: &str) -> BookingResult<Booking> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        if booking.payment_status == PaymentStatus::Refunded {
            return Err(BookingError::InvalidTransition("booking already refunded"));
        }
        Ok(booking)
    }

    async fn complete(&self, booking: &Booking, update: PaymentUpdate) -> BookingResult<PaymentOut> {
        if booking.payment_status == PaymentStatus::Completed {
            // Repeated confirmations overwrite the previous payment fields.
            tracing::warn!(
                booking_id = %booking.id,
                previous_payment_id = booking.payment_id.as_deref().unwrap_or(""),
                "payment recorded again on completed booking"
            );
        }
        let method = update.method;
        let saved = self
            .store
            .record_payment(&booking.id, update, &PaymentStatus::PAYABLE)
            .await?;
        let Some(saved) = saved else {
            return Err(self.lost_race(&booking.id).await);
        };
        tracing::info!(
            booking_id = %saved.id,
            method = method.as_str(),
            payment_id = saved.payment_id.as_deref().unwrap_or(""),
            "payment completed"
        );
        Ok(PaymentOut {
            success: true,
            booking_id: saved.id,
            payment_status: saved.payment_status,
            payment_id: saved.payment_id,
        })
    }

    pub async fn process_upi(
        &self,
        booking_id: &str,
        user_id: &str,
        input: UpiIn,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOut> {
        let booking = self.payable_booking(booking_id, user_id).await?;
        check_amount(input.amount.as_ref(), booking.total_price)?;
        let update = PaymentUpdate {
            payment_id: format!("upi_{}", now.timestamp_millis()),
            method: PaymentMethod::Upi,
            details: json!({
                "upi_id": non_empty(input.upi_id),
                "payer_name": non_empty(input.name),
                "payer_email": non_empty(input.email),
            }),
        };
        self.complete(&booking, update).await
    }

    pub async fn process_upi_app(
        &self,
        booking_id: &str,
        user_id: &str,
        input: UpiAppIn,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOut> {
        let booking = self.payable_booking(booking_id, user_id).await?;
        check_amount(input.amount.as_ref(), booking.total_price)?;
        let update = PaymentUpdate {
            payment_id: format!("upiapp_{}", now.timestamp_millis()),
            method: PaymentMethod::Upi,
            details: json!({
                "upi_app": non_empty(input.upi_app),
                "payer_name": non_empty(input.name),
                "payer_email": non_empty(input.email),
            }),
        };
        self.complete(&booking, update).await
    }

    pub async fn process_qr(
        &self,
        booking_id: &str,
        user_id: &str,
        input: QrIn,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOut> {
        let booking = self.payable_booking(booking_id, user_id).await?;
        check_amount(input.amount.as_ref(), booking.total_price)?;
        let update = PaymentUpdate {
            payment_id: format!("qr_{}", now.timestamp_millis()),
            method: PaymentMethod::Upi,
            details: json!({
                "payer_name": non_empty(input.name),
                "payer_email": non_empty(input.email),
            }),
        };
        self.complete(&booking, update).await
    }

    pub async fn create_order(&self, booking_id: &str, user_id: &str) -> BookingResult<OrderOut> {
        let booking = self.payable_booking(booking_id, user_id).await?;
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(BookingError::GatewayNotConfigured)?;

        let req = OrderRequest {
            amount: to_minor_units(booking.total_price),
            currency: self.currency.clone(),
            receipt: format!("booking_{}", booking.id),
        };
        let order = gateway.create_order(&req).await.map_err(|e| {
            tracing::error!(error = %e, booking_id = %booking.id, "gateway create_order failed");
            BookingError::Gateway(e.to_string())
        })?;

        tracing::info!(booking_id = %booking.id, order_id = %order.id, amount = order.amount, "gateway order created");
        Ok(OrderOut {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: gateway.key_id().to_string(),
        })
    }

    /// Confirms a gateway checkout. A signed callback is verified when the gateway is
    /// configured; an unsigned one is accepted as a simulated payment.
    pub async fn payment_success(
        &self,
        booking_id: &str,
        user_id: &str,
        input: PaymentSuccessIn,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOut> {
        let booking = self.payable_booking(booking_id, user_id).await?;
        let payment_id =
            non_empty(input.payment_id).unwrap_or_else(|| format!("pay_{}", now.timestamp_millis()));
        let order_id = non_empty(input.order_id);
        let signature = non_empty(input.signature);

        if let (Some(gateway), Some(order_id), Some(signature)) =
            (self.gateway.as_ref(), order_id.as_deref(), signature.as_deref())
        {
            if !gateway.verify_signature(order_id, &payment_id, signature) {
                tracing::warn!(booking_id = %booking.id, order_id, "gateway signature mismatch");
                // A booking paid or refunded meanwhile keeps its status.
                self.store
                    .transition(&booking.id, &[PaymentStatus::Pending], PaymentStatus::Failed)
                    .await?;
                return Err(BookingError::PaymentVerificationFailed);
            }
        }

        let update = PaymentUpdate {
            payment_id,
            method: PaymentMethod::Gateway,
            details: json!({ "order_id": order_id }),
        };
        self.complete(&booking, update).await
    }
}
