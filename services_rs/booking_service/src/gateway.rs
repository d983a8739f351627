use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("gateway response invalid: {0}")]
    Decode(String),
}

/// External payment processor. Built once at startup and shared through `AppState`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, req: &OrderRequest) -> Result<OrderResponse, GatewayError>;

    /// Checks the checkout callback signature for `order_id|payment_id`.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Called when a paid booking is cancelled. Settlement is left to the processor's
    /// dashboard, so the default only records the request.
    fn refund_requested(&self, booking_id: &str, payment_id: Option<&str>, amount_minor: i64) {
        tracing::info!(
            booking_id,
            payment_id = payment_id.unwrap_or(""),
            amount_minor,
            "refund requested"
        );
    }
}

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGateway {
    pub fn new(http: reqwest::Client, base_url: &str, key_id: String, key_secret: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        }
    }
}

pub fn signature_hex(secret: &str, order_id: &str, payment_id: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, req: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url);
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            // Best-effort extraction of the gateway's error description.
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/description")
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(GatewayError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = signature_hex(&self.key_secret, order_id, payment_id);
        let provided = signature.trim().to_ascii_lowercase();
        !expected.is_empty()
            && provided.len() == expected.len()
            && provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
    }
}
