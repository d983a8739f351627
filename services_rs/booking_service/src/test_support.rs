//! Fixtures shared by the unit tests.

use crate::gateway::{signature_hex, GatewayError, OrderRequest, OrderResponse, PaymentGateway};
use crate::lifecycle::Bookings;
use crate::error::StoreError;
use crate::models::{Booking, Listing, PaymentMethod, PaymentStatus, PaymentUpdate};
use crate::pricing::price;
use crate::store::{BookingStore, InsertOutcome, ListingStore, MemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const LISTING_ID: &str = "listing-1";
pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const FAKE_KEY_ID: &str = "rzp_live_fake";
pub const FAKE_SECRET: &str = "fake-gateway-secret";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
}

pub fn listing(id: &str, price: f64) -> Listing {
    Listing {
        id: id.to_string(),
        title: "Cozy Beachfront Cottage".to_string(),
        price,
        location: Some("Malibu".to_string()),
        country: Some("United States".to_string()),
        max_guests: Some(4),
        owner_id: Some("owner-1".to_string()),
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub orders: Mutex<Vec<OrderRequest>>,
    pub refunds: Mutex<Vec<(String, i64)>>,
    pub fail: bool,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        FAKE_KEY_ID
    }

    async fn create_order(&self, req: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        if self.fail {
            return Err(GatewayError::Status {
                status: 503,
                detail: "unavailable".to_string(),
            });
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(req.clone());
        Ok(OrderResponse {
            id: format!("order_{}", orders.len()),
            amount: req.amount,
            currency: req.currency.clone(),
        })
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature == signature_hex(FAKE_SECRET, order_id, payment_id)
    }

    fn refund_requested(&self, booking_id: &str, _payment_id: Option<&str>, amount_minor: i64) {
        self.refunds
            .lock()
            .unwrap()
            .push((booking_id.to_string(), amount_minor));
    }
}

/// Bookings over a memory store holding one listing priced 100 per night.
pub fn fixture(gateway: Option<Arc<FakeGateway>>) -> (Bookings, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_listings([listing(LISTING_ID, 100.0)]));
    let gateway = gateway.map(|g| g as Arc<dyn PaymentGateway>);
    let bookings = Bookings::new(store.clone(), store.clone(), gateway, "INR");
    (bookings, store)
}

/// Write that another request completes between a read and the next write.
#[derive(Clone, Copy, Debug)]
pub enum Competing {
    Payment,
    Refund,
}

/// Memory store that runs one competing write right before the next status write,
/// as if a second request got there first.
pub struct RacingStore {
    pub inner: Arc<MemoryStore>,
    competing: Mutex<Option<Competing>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryStore>, competing: Competing) -> Self {
        Self {
            inner,
            competing: Mutex::new(Some(competing)),
        }
    }

    async fn interleave(&self, id: &str) -> Result<(), StoreError> {
        let competing = self.competing.lock().unwrap().take();
        match competing {
            Some(Competing::Payment) => {
                let update = PaymentUpdate {
                    payment_id: "upi_competing".to_string(),
                    method: PaymentMethod::Upi,
                    details: serde_json::json!({}),
                };
                self.inner
                    .record_payment(id, update, &PaymentStatus::PAYABLE)
                    .await?;
            }
            Some(Competing::Refund) => {
                self.inner
                    .transition(id, &[PaymentStatus::Completed], PaymentStatus::Refunded)
                    .await?;
            }
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for RacingStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.inner.find_by_user(user_id).await
    }

    async fn find_overlapping(
        &self,
        listing_id: &str,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        self.inner.find_overlapping(listing_id, check_in, check_out).await
    }

    async fn insert_if_available(&self, booking: Booking) -> Result<InsertOutcome, StoreError> {
        self.inner.insert_if_available(booking).await
    }

    async fn record_payment(
        &self,
        id: &str,
        update: PaymentUpdate,
        from: &[PaymentStatus],
    ) -> Result<Option<Booking>, StoreError> {
        self.interleave(id).await?;
        self.inner.record_payment(id, update, from).await
    }

    async fn transition(
        &self,
        id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError> {
        self.interleave(id).await?;
        self.inner.transition(id, from, to).await
    }

    async fn delete_if(&self, id: &str, from: &[PaymentStatus]) -> Result<bool, StoreError> {
        self.interleave(id).await?;
        self.inner.delete_if(id, from).await
    }
}

/// Bookings whose next status write races against `competing`.
pub fn racing_fixture(
    competing: Competing,
    gateway: Option<Arc<FakeGateway>>,
) -> (Bookings, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_listings([listing(LISTING_ID, 100.0)]));
    let racing = Arc::new(RacingStore::new(store.clone(), competing));
    let gateway = gateway.map(|g| g as Arc<dyn PaymentGateway>);
    let bookings = Bookings::new(
        racing,
        store.clone() as Arc<dyn ListingStore>,
        gateway,
        "INR",
    );
    (bookings, store)
}

static SEED_SLOT: AtomicI64 = AtomicI64::new(0);

/// Inserts a two-night booking far enough in the future not to collide with other seeds.
pub async fn seed_booking(store: &MemoryStore, user_id: &str, status: PaymentStatus) -> String {
    let slot = SEED_SLOT.fetch_add(1, Ordering::Relaxed);
    let check_in = fixed_now() + Duration::days(60 + slot * 3);
    let pricing = price(100.0, 2, 1);
    let booking = Booking {
        id: format!("seed-{slot}"),
        listing_id: LISTING_ID.to_string(),
        user_id: user_id.to_string(),
        check_in,
        check_out: check_in + Duration::days(2),
        number_of_nights: 2,
        guests: 1,
        total_price: pricing.total_price,
        payment_status: status,
        payment_id: None,
        payment_method: None,
        payment_details: None,
        created_at: fixed_now() + Duration::seconds(slot),
    };
    match store.insert_if_available(booking).await {
        Ok(InsertOutcome::Inserted(b)) => b.id,
        Ok(InsertOutcome::Conflict) => panic!("seed slots overlap"),
        Err(e) => panic!("seed failed: {e}"),
    }
}

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// One-shot HTTP server answering a single request with `status_line` and `response_body`.
pub async fn spawn_mock_http_server(
    status_line: &str,
    response_body: &str,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let status_line = status_line.to_string();
    let response_body = response_body.to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf: Vec<u8> = Vec::new();
        let mut tmp = [0u8; 2048];
        let header_end = loop {
            let n = stream.read(&mut tmp).await.expect("read");
            if n == 0 {
                break None;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(i) = find_subsequence(&buf, b"\r\n\r\n") {
                break Some(i);
            }
        };
        let Some(header_end) = header_end else {
            return;
        };

        let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = header_text.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();

        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines {
            if let Some((k, v)) = line.split_once(':') {
                headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
            }
        }

        let content_len = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = buf[(header_end + 4)..].to_vec();
        while body.len() < content_len {
            let n = stream.read(&mut tmp).await.expect("read body");
            if n == 0 {
                break;
            }
            body.extend_from_slice(&tmp[..n]);
        }
        body.truncate(content_len);

        let _ = tx.send(CapturedRequest {
            method,
            path,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        });

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response_body.len(),
            response_body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.flush().await;
    });

    (format!("http://{addr}"), rx)
}
