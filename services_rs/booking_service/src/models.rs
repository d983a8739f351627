use crate::pricing::Pricing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Statuses that hold a listing's dates.
    pub const BLOCKING: [PaymentStatus; 2] = [Self::Completed, Self::Pending];

    /// Statuses a payment may be recorded from.
    pub const PAYABLE: [PaymentStatus; 3] = [Self::Pending, Self::Failed, Self::Completed];

    /// Statuses whose cancellation removes the record.
    pub const DELETABLE: [PaymentStatus; 2] = [Self::Pending, Self::Failed];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Gateway,
    Upi,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Upi => "upi",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "gateway" => Some(Self::Gateway),
            "upi" => Some(Self::Upi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: String,
    pub listing_id: String,
    pub user_id: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub number_of_nights: i32,
    pub guests: i32,
    pub total_price: f64,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields written when a payment adapter accepts a payment.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment_id: String,
    pub method: PaymentMethod,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub max_guests: Option<i32>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// `guests` arrives as a number or as form text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GuestsIn {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingIn {
    #[serde(alias = "checkIn")]
    pub check_in: String,
    #[serde(alias = "checkOut")]
    pub check_out: String,
    #[serde(default)]
    pub guests: Option<GuestsIn>,
}

/// Form posts nest the fields under `booking`; API clients send them flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CreateBookingBody {
    Nested { booking: CreateBookingIn },
    Flat(CreateBookingIn),
}

impl CreateBookingBody {
    pub fn into_inner(self) -> CreateBookingIn {
        match self {
            Self::Nested { booking } => booking,
            Self::Flat(b) => b,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateBookingOut {
    pub success: bool,
    pub booking_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelOutcome {
    Refunded,
    Deleted,
}

#[derive(Debug, Serialize)]
pub struct CancelOut {
    pub success: bool,
    pub status: CancelOutcome,
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub listing: Option<Listing>,
}

#[derive(Debug, Serialize)]
pub struct PricedBookingOut {
    pub booking: Booking,
    pub listing: Listing,
    pub pricing: Pricing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_key_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingFormOut {
    pub listing: Listing,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub check_in: String,
    pub check_out: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityOut {
    pub listing_id: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub available: bool,
}

/// Client-reported amount; accepted as a JSON number or numeric text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountIn {
    Number(f64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct UpiIn {
    #[serde(default, alias = "upiId")]
    pub upi_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub amount: Option<AmountIn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpiAppIn {
    #[serde(default, alias = "upiApp")]
    pub upi_app: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub amount: Option<AmountIn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QrIn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub amount: Option<AmountIn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentSuccessIn {
    #[serde(default, alias = "razorpay_payment_id")]
    pub payment_id: Option<String>,
    #[serde(default, alias = "razorpay_order_id")]
    pub order_id: Option<String>,
    #[serde(default, alias = "razorpay_signature")]
    pub signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentOut {
    pub success: bool,
    pub booking_id: String,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderOut {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub env: String,
    pub service: &'static str,
    pub version: &'static str,
}
