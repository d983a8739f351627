use crate::error::StoreError;
use crate::models::{Booking, Listing, PaymentMethod, PaymentStatus, PaymentUpdate};
use crate::store::{BookingStore, InsertOutcome, ListingStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

const BOOKING_COLUMNS: &str = "id,listing_id,user_id,check_in,check_out,number_of_nights,guests,\
     total_price,payment_status,payment_id,payment_method,payment_details,created_at";

fn table_name(schema: &Option<String>, name: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

pub async fn connect(db_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool, db_schema: &Option<String>) -> Result<(), sqlx::Error> {
    if let Some(schema) = db_schema {
        let ddl = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
        sqlx::query(&ddl).execute(pool).await?;
    }

    let listings = table_name(db_schema, "listings");
    let bookings = table_name(db_schema, "bookings");

    let ddls = [
        format!(
            "CREATE TABLE IF NOT EXISTS {listings} (\
             id VARCHAR(64) PRIMARY KEY,\
             title VARCHAR(200) NOT NULL,\
             price DOUBLE PRECISION NOT NULL DEFAULT 0,\
             location VARCHAR(200),\
             country VARCHAR(100),\
             max_guests INTEGER,\
             owner_id VARCHAR(128)\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {bookings} (\
             id VARCHAR(36) PRIMARY KEY,\
             listing_id VARCHAR(64) NOT NULL,\
             user_id VARCHAR(128) NOT NULL,\
             check_in TIMESTAMPTZ NOT NULL,\
             check_out TIMESTAMPTZ NOT NULL,\
             number_of_nights INTEGER NOT NULL CHECK (number_of_nights >= 1),\
             guests INTEGER NOT NULL CHECK (guests >= 1),\
             total_price DOUBLE PRECISION NOT NULL,\
             payment_status VARCHAR(16) NOT NULL DEFAULT 'pending',\
             payment_id VARCHAR(128),\
             payment_method VARCHAR(16),\
             payment_details JSONB,\
             created_at TIMESTAMPTZ NOT NULL,\
             CHECK (check_out > check_in)\
             )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_bookings_listing_range ON {bookings}(listing_id, check_in, check_out)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_bookings_user_created ON {bookings}(user_id, created_at)"),
    ];

    for ddl in ddls {
        sqlx::query(&ddl).execute(pool).await?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    db_schema: Option<String>,
}

impl PgStore {
    pub fn new(pool: PgPool, db_schema: Option<String>) -> Self {
        Self { pool, db_schema }
    }

    fn table(&self, name: &str) -> String {
        table_name(&self.db_schema, name)
    }

    pub async fn upsert_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        let listings = self.table("listings");
        sqlx::query(&format!(
            "INSERT INTO {listings} (id,title,price,location,country,max_guests,owner_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (id) DO UPDATE SET title=EXCLUDED.title, price=EXCLUDED.price, \
             location=EXCLUDED.location, country=EXCLUDED.country, \
             max_guests=EXCLUDED.max_guests, owner_id=EXCLUDED.owner_id"
        ))
        .bind(&listing.id)
        .bind(&listing.title)
        .bind(listing.price)
        .bind(&listing.location)
        .bind(&listing.country)
        .bind(listing.max_guests)
        .bind(&listing.owner_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_booking(row: &PgRow) -> Result<Booking, StoreError> {
    let status_raw: String = row.try_get("payment_status")?;
    let payment_status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("payment_status={status_raw}")))?;
    let method_raw: Option<String> = row.try_get("payment_method")?;
    let payment_method = match method_raw {
        Some(m) => Some(
            PaymentMethod::parse(&m)
                .ok_or_else(|| StoreError::Corrupt(format!("payment_method={m}")))?,
        ),
        None => None,
    };

    Ok(Booking {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        user_id: row.try_get("user_id")?,
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        number_of_nights: row.try_get("number_of_nights")?,
        guests: row.try_get("guests")?,
        total_price: row.try_get("total_price")?,
        payment_status,
        payment_id: row.try_get("payment_id")?,
        payment_method,
        payment_details: row.try_get("payment_details")?,
        created_at: row.try_get("created_at")?,
    })
}

fn status_list(statuses: &[PaymentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn overlap_predicate() -> &'static str {
    "listing_id=$1 AND payment_status IN ('pending','completed') AND check_in < $2 AND check_out > $3"
}

#[async_trait]
impl BookingStore for PgStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, StoreError> {
        let bookings = self.table("bookings");
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM {bookings} WHERE id=$1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.table("bookings");
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM {bookings} WHERE user_id=$1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn find_overlapping(
        &self,
        listing_id: &str,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.table("bookings");
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM {bookings} WHERE {}",
            overlap_predicate()
        ))
        .bind(listing_id)
        .bind(check_out)
        .bind(check_in)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_booking).collect()
    }

    async fn insert_if_available(&self, booking: Booking) -> Result<InsertOutcome, StoreError> {
        let bookings = self.table("bookings");
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent creates for the same listing until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&booking.listing_id)
            .execute(&mut *tx)
            .await?;

        let clash = sqlx::query(&format!(
            "SELECT 1 FROM {bookings} WHERE {} LIMIT 1",
            overlap_predicate()
        ))
        .bind(&booking.listing_id)
        .bind(booking.check_out)
        .bind(booking.check_in)
        .fetch_optional(&mut *tx)
        .await?;
        if clash.is_some() {
            tx.rollback().await.ok();
            return Ok(InsertOutcome::Conflict);
        }

        sqlx::query(&format!(
            "INSERT INTO {bookings} ({BOOKING_COLUMNS}) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"
        ))
        .bind(&booking.id)
        .bind(&booking.listing_id)
        .bind(&booking.user_id)
        .bind(booking.check_in)
        .bind(booking.check_out)
        .bind(booking.number_of_nights)
        .bind(booking.guests)
        .bind(booking.total_price)
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_id)
        .bind(booking.payment_method.map(PaymentMethod::as_str))
        .bind(&booking.payment_details)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(booking))
    }

    async fn record_payment(
        &self,
        id: &str,
        update: PaymentUpdate,
        from: &[PaymentStatus],
    ) -> Result<Option<Booking>, StoreError> {
        let bookings = self.table("bookings");
        let row = sqlx::query(&format!(
            "UPDATE {bookings} SET payment_status='completed', payment_id=$2, payment_method=$3, \
             payment_details=$4 WHERE id=$1 AND payment_status = ANY($5) RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.payment_id)
        .bind(update.method.as_str())
        .bind(&update.details)
        .bind(status_list(from))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn transition(
        &self,
        id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError> {
        let bookings = self.table("bookings");
        let row = sqlx::query(&format!(
            "UPDATE {bookings} SET payment_status=$2 WHERE id=$1 AND payment_status = ANY($3) \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(status_list(from))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_booking).transpose()
    }

    async fn delete_if(&self, id: &str, from: &[PaymentStatus]) -> Result<bool, StoreError> {
        let bookings = self.table("bookings");
        let res = sqlx::query(&format!(
            "DELETE FROM {bookings} WHERE id=$1 AND payment_status = ANY($2)"
        ))
        .bind(id)
        .bind(status_list(from))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl ListingStore for PgStore {
    async fn find_listing(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        let listings = self.table("listings");
        let row = sqlx::query(&format!(
            "SELECT id,title,price,location,country,max_guests,owner_id FROM {listings} WHERE id=$1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Listing {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            price: row.try_get("price")?,
            location: row.try_get("location")?,
            country: row.try_get("country")?,
            max_guests: row.try_get("max_guests")?,
            owner_id: row.try_get("owner_id")?,
        }))
    }
}
