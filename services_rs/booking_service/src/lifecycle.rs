//! Booking lifecycle: creation in `pending`, reads, and cancellation.
//!
//! Payment transitions live in `payments.rs` as a second `impl Bookings` block.

use crate::dates::{nights_between, parse_stay_date, validate_stay};
use crate::error::{BookingError, BookingResult};
use crate::gateway::PaymentGateway;
use crate::models::*;
use crate::pricing::{price, to_minor_units};
use crate::store::{BookingStore, InsertOutcome, ListingStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Bookings {
    pub(crate) store: Arc<dyn BookingStore>,
    pub(crate) listings: Arc<dyn ListingStore>,
    pub(crate) gateway: Option<Arc<dyn PaymentGateway>>,
    pub(crate) currency: String,
}

/// `parseInt`-style reading of form input: leading sign and digits, anything unparsable is 1.
/// Digit runs too long for an `i64` saturate.
fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }
    // Only overflow can fail here; saturate so range checks reject it.
    Some(sign * digits.parse::<i64>().unwrap_or(i64::MAX))
}

/// Missing or zero means one guest; negatives are rejected.
pub fn normalize_guests(raw: Option<&GuestsIn>) -> BookingResult<i32> {
    let n = match raw {
        None => 0,
        Some(GuestsIn::Number(n)) => *n,
        Some(GuestsIn::Text(s)) => leading_int(s).unwrap_or(0),
    };
    match n {
        0 => Ok(1),
        n if n < 0 => Err(BookingError::ValidationFailure(
            "guests must be at least 1".to_string(),
        )),
        n => i32::try_from(n)
            .map_err(|_| BookingError::ValidationFailure("guests out of range".to_string())),
    }
}

impl Bookings {
    pub fn new(
        store: Arc<dyn BookingStore>,
        listings: Arc<dyn ListingStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            listings,
            gateway,
            currency: currency.into(),
        }
    }

    pub fn gateway_key_id(&self) -> Option<String> {
        self.gateway.as_ref().map(|g| g.key_id().to_string())
    }

    async fn listing(&self, listing_id: &str) -> BookingResult<Listing> {
        self.listings
            .find_listing(listing_id.trim())
            .await?
            .ok_or(BookingError::NotFound("listing"))
    }

    pub(crate) async fn owned_booking(
        &self,
        booking_id: &str,
        user_id: &str,
    ) -> BookingResult<Booking> {
        let booking = self
            .store
            .find_by_id(booking_id.trim())
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized);
        }
        Ok(booking)
    }

    /// Explains a conditional write that matched nothing: the booking was removed or its
    /// status moved on after it was read.
    pub(crate) async fn lost_race(&self, booking_id: &str) -> BookingError {
        match self.store.find_by_id(booking_id).await {
            Ok(None) => BookingError::NotFound("booking"),
            Ok(Some(b)) if b.payment_status == PaymentStatus::Refunded => {
                BookingError::InvalidTransition("booking already refunded")
            }
            Ok(Some(b)) => {
                tracing::info!(
                    booking_id,
                    status = b.payment_status.as_str(),
                    "booking status changed before write"
                );
                BookingError::InvalidTransition("booking status changed; reload and retry")
            }
            Err(e) => e.into(),
        }
    }

    async fn is_available(
        &self,
        listing_id: &str,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> BookingResult<bool> {
        let conflicts = self
            .store
            .find_overlapping(listing_id, check_in, check_out)
            .await?;
        Ok(conflicts.is_empty())
    }

    pub async fn booking_form(&self, listing_id: &str) -> BookingResult<BookingFormOut> {
        Ok(BookingFormOut {
            listing: self.listing(listing_id).await?,
        })
    }

    pub async fn check_availability(
        &self,
        listing_id: &str,
        params: &AvailabilityParams,
        now: DateTime<Utc>,
    ) -> BookingResult<AvailabilityOut> {
        let listing = self.listing(listing_id).await?;
        let check_in = parse_stay_date(&params.check_in, "check_in")?;
        let check_out = parse_stay_date(&params.check_out, "check_out")?;
        validate_stay(check_in, check_out, now)?;
        let available = self.is_available(&listing.id, check_in, check_out).await?;
        Ok(AvailabilityOut {
            listing_id: listing.id,
            check_in,
            check_out,
            available,
        })
    }

    pub async fn create_booking(
        &self,
        listing_id: &str,
        input: CreateBookingIn,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> BookingResult<CreateBookingOut> {
        let listing = self.listing(listing_id).await?;

        let check_in = parse_stay_date(&input.check_in, "check_in")?;
        let check_out = parse_stay_date(&input.check_out, "check_out")?;
        validate_stay(check_in, check_out, now)?;

        if !self.is_available(&listing.id, check_in, check_out).await? {
            return Err(BookingError::DatesUnavailable);
        }

        let guests = normalize_guests(input.guests.as_ref())?;
        let nights = nights_between(check_in, check_out);
        let pricing = price(listing.price, nights, guests);

        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            listing_id: listing.id.clone(),
            user_id: user_id.to_string(),
            check_in,
            check_out,
            number_of_nights: nights,
            guests,
            total_price: pricing.total_price,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            payment_method: None,
            payment_details: None,
            created_at: now,
        };

        let booking = match self.store.insert_if_available(booking).await? {
            InsertOutcome::Inserted(b) => b,
            InsertOutcome::Conflict => {
                tracing::info!(listing_id = %listing.id, "booking lost availability race");
                return Err(BookingError::DatesUnavailable);
            }
        };

        tracing::info!(
            booking_id = %booking.id,
            listing_id = %booking.listing_id,
            nights,
            total_price = booking.total_price,
            "booking created"
        );

        Ok(CreateBookingOut {
            success: true,
            redirect_url: format!("/bookings/{}/payment", booking.id),
            booking_id: booking.id,
        })
    }

    /// A paid booking becomes `refunded` and is kept; anything unpaid is removed.
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        user_id: &str,
    ) -> BookingResult<CancelOutcome> {
        let booking = self.owned_booking(booking_id, user_id).await?;

        match booking.payment_status {
            PaymentStatus::Refunded => Err(BookingError::InvalidTransition(
                "booking already refunded",
            )),
            PaymentStatus::Completed => {
                if self
                    .store
                    .transition(&booking.id, &[PaymentStatus::Completed], PaymentStatus::Refunded)
                    .await?
                    .is_none()
                {
                    return Err(self.lost_race(&booking.id).await);
                }
                if let Some(gateway) = &self.gateway {
                    gateway.refund_requested(
                        &booking.id,
                        booking.payment_id.as_deref(),
                        to_minor_units(booking.total_price),
                    );
                }
                tracing::info!(
                    booking_id = %booking.id,
                    payment_id = booking.payment_id.as_deref().unwrap_or(""),
                    amount = booking.total_price,
                    "booking cancelled; refund initiated"
                );
                Ok(CancelOutcome::Refunded)
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {
                if !self
                    .store
                    .delete_if(&booking.id, &PaymentStatus::DELETABLE)
                    .await?
                {
                    return Err(self.lost_race(&booking.id).await);
                }
                tracing::info!(booking_id = %booking.id, "unpaid booking cancelled");
                Ok(CancelOutcome::Deleted)
            }
        }
    }

    pub async fn get_booking(&self, booking_id: &str, user_id: &str) -> BookingResult<BookingView> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        let listing = self.listings.find_listing(&booking.listing_id).await?;
        Ok(BookingView { booking, listing })
    }

    pub async fn list_user_bookings(&self, user_id: &str) -> BookingResult<Vec<BookingView>> {
        let bookings = self.store.find_by_user(user_id).await?;
        let mut listings: HashMap<String, Option<Listing>> = HashMap::new();
        let mut out = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if !listings.contains_key(&booking.listing_id) {
                let l = self.listings.find_listing(&booking.listing_id).await?;
                listings.insert(booking.listing_id.clone(), l);
            }
            let listing = listings.get(&booking.listing_id).cloned().flatten();
            out.push(BookingView { booking, listing });
        }
        Ok(out)
    }

    /// Pricing is re-derived from the listing's current rate for display only.
    async fn priced(&self, booking: Booking, with_key: bool) -> BookingResult<PricedBookingOut> {
        let listing = self.listing(&booking.listing_id).await?;
        let pricing = price(listing.price, booking.number_of_nights, booking.guests);
        Ok(PricedBookingOut {
            booking,
            listing,
            pricing,
            gateway_key_id: if with_key { self.gateway_key_id() } else { None },
        })
    }

    pub async fn payment_page(
        &self,
        booking_id: &str,
        user_id: &str,
    ) -> BookingResult<PricedBookingOut> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        self.priced(booking, true).await
    }

    pub async fn confirmation(
        &self,
        booking_id: &str,
        user_id: &str,
    ) -> BookingResult<PricedBookingOut> {
        let booking = self.owned_booking(booking_id, user_id).await?;
        self.priced(booking, false).await
    }
}
