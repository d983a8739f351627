use crate::dates::overlaps;
use crate::error::StoreError;
use crate::models::{Booking, Listing, PaymentStatus, PaymentUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Booking),
    /// Another pending or completed booking already holds part of the range.
    Conflict,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError>;

    /// Newest first.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Pending or completed bookings on `listing_id` intersecting `[check_in, check_out)`.
    async fn find_overlapping(
        &self,
        listing_id: &str,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Re-checks overlap and inserts as one atomic step.
    async fn insert_if_available(&self, booking: Booking) -> Result<InsertOutcome, StoreError>;

    /// Marks the booking completed with the given payment fields, only while its status
    /// is one of `from`. `None` when the booking is gone or in another status.
    async fn record_payment(
        &self,
        id: &str,
        update: PaymentUpdate,
        from: &[PaymentStatus],
    ) -> Result<Option<Booking>, StoreError>;

    /// Moves the booking to `to` only while its status is one of `from`.
    async fn transition(
        &self,
        id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError>;

    /// Deletes the booking only while its status is one of `from`.
    async fn delete_if(&self, id: &str, from: &[PaymentStatus]) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find_listing(&self, id: &str) -> Result<Option<Listing>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    bookings: HashMap<String, Booking>,
    listings: HashMap<String, Listing>,
}

/// Process-local store for dev setups and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let store = Self::new();
        for l in listings {
            store.insert_listing(l);
        }
        store
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.lock().listings.insert(listing.id.clone(), listing);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn blocks(b: &Booking, listing_id: &str, check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> bool {
    b.listing_id == listing_id
        && PaymentStatus::BLOCKING.contains(&b.payment_status)
        && overlaps(b.check_in, b.check_out, check_in, check_out)
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.lock().bookings.get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let mut out: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn find_overlapping(
        &self,
        listing_id: &str,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|b| blocks(b, listing_id, check_in, check_out))
            .cloned()
            .collect())
    }

    async fn insert_if_available(&self, booking: Booking) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock();
        let taken = inner
            .bookings
            .values()
            .any(|b| blocks(b, &booking.listing_id, booking.check_in, booking.check_out));
        if taken {
            return Ok(InsertOutcome::Conflict);
        }
        inner.bookings.insert(booking.id.clone(), booking.clone());
        Ok(InsertOutcome::Inserted(booking))
    }

    async fn record_payment(
        &self,
        id: &str,
        update: PaymentUpdate,
        from: &[PaymentStatus],
    ) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.lock();
        let Some(b) = inner.bookings.get_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&b.payment_status) {
            return Ok(None);
        }
        b.payment_status = PaymentStatus::Completed;
        b.payment_id = Some(update.payment_id);
        b.payment_method = Some(update.method);
        b.payment_details = Some(update.details);
        Ok(Some(b.clone()))
    }

    async fn transition(
        &self,
        id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .bookings
            .get_mut(id)
            .filter(|b| from.contains(&b.payment_status))
            .map(|b| {
                b.payment_status = to;
                b.clone()
            }))
    }

    async fn delete_if(&self, id: &str, from: &[PaymentStatus]) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let held = inner
            .bookings
            .get(id)
            .is_some_and(|b| from.contains(&b.payment_status));
        if held {
            inner.bookings.remove(id);
        }
        Ok(held)
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn find_listing(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        Ok(self.lock().listings.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, d, 0, 0, 0).unwrap()
    }

    fn booking(id: &str, listing: &str, from: u32, to: u32, status: PaymentStatus) -> Booking {
        Booking {
            id: id.to_string(),
            listing_id: listing.to_string(),
            user_id: "u1".to_string(),
            check_in: at(from),
            check_out: at(to),
            number_of_nights: (to - from) as i32,
            guests: 1,
            total_price: 100.0,
            payment_status: status,
            payment_id: None,
            payment_method: None,
            payment_details: None,
            created_at: at(1),
        }
    }

    #[tokio::test]
    async fn overlap_ignores_other_listings_and_released_statuses() {
        let store = MemoryStore::new();
        for b in [
            booking("a", "l1", 10, 12, PaymentStatus::Pending),
            booking("b", "l2", 10, 12, PaymentStatus::Completed),
            booking("c", "l1", 10, 12, PaymentStatus::Refunded),
            booking("d", "l1", 10, 12, PaymentStatus::Failed),
        ] {
            store.lock().bookings.insert(b.id.clone(), b);
        }
        let hits = store.find_overlapping("l1", at(11), at(13)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn insert_if_available_refuses_overlaps_but_allows_adjacent() {
        let store = MemoryStore::new();
        let first = store
            .insert_if_available(booking("a", "l1", 10, 12, PaymentStatus::Pending))
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let clash = store
            .insert_if_available(booking("b", "l1", 11, 14, PaymentStatus::Pending))
            .await
            .unwrap();
        assert!(matches!(clash, InsertOutcome::Conflict));

        let adjacent = store
            .insert_if_available(booking("c", "l1", 12, 14, PaymentStatus::Pending))
            .await
            .unwrap();
        assert!(matches!(adjacent, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn find_by_user_is_newest_first() {
        let store = MemoryStore::new();
        let mut old = booking("old", "l1", 10, 11, PaymentStatus::Pending);
        old.created_at = at(2);
        let mut new = booking("new", "l1", 12, 13, PaymentStatus::Pending);
        new.created_at = at(3);
        let mut other = booking("other", "l1", 14, 15, PaymentStatus::Pending);
        other.user_id = "u2".to_string();
        for b in [old, new, other] {
            store.lock().bookings.insert(b.id.clone(), b);
        }
        let ids: Vec<String> = store
            .find_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn writes_only_apply_from_expected_statuses() {
        let store = MemoryStore::new();
        for b in [
            booking("paid", "l1", 10, 12, PaymentStatus::Completed),
            booking("gone", "l1", 12, 14, PaymentStatus::Refunded),
        ] {
            store.lock().bookings.insert(b.id.clone(), b);
        }

        assert!(!store.delete_if("paid", &PaymentStatus::DELETABLE).await.unwrap());
        assert!(store.find_by_id("paid").await.unwrap().is_some());

        let update = PaymentUpdate {
            payment_id: "upi_1".to_string(),
            method: crate::models::PaymentMethod::Upi,
            details: serde_json::json!({}),
        };
        let paid = store
            .record_payment("gone", update, &PaymentStatus::PAYABLE)
            .await
            .unwrap();
        assert!(paid.is_none());
        let gone = store.find_by_id("gone").await.unwrap().unwrap();
        assert_eq!(gone.payment_status, PaymentStatus::Refunded);
        assert!(gone.payment_id.is_none());

        let refunded = store
            .transition("paid", &[PaymentStatus::Completed], PaymentStatus::Refunded)
            .await
            .unwrap();
        assert_eq!(refunded.map(|b| b.payment_status), Some(PaymentStatus::Refunded));
        let again = store
            .transition("paid", &[PaymentStatus::Completed], PaymentStatus::Refunded)
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(store
            .transition("missing", &[PaymentStatus::Pending], PaymentStatus::Failed)
            .await
            .unwrap()
            .is_none());
    }
}
