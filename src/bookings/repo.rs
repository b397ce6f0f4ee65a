use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::availability::{merge_unavailable, taken_dates};
use super::repo_types::{Booking, BookingFilter, BookingPatch, NewBooking, WriteOutcome};
use crate::posts::repo_types::ServiceListing;

/// Persistence for bookings and the listing availability they consume.
/// Every write that touches dates runs under a row lock on the listing.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_listing(&self, service_id: Uuid) -> anyhow::Result<Option<ServiceListing>>;
    async fn find_booking(&self, id: Uuid) -> anyhow::Result<Option<Booking>>;
    async fn insert_booking(&self, booking: NewBooking) -> anyhow::Result<WriteOutcome<Booking>>;
    async fn update_booking(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> anyhow::Result<WriteOutcome<Booking>>;
    /// Marks the booking approved and unions its dates into the listing.
    async fn approve_booking(&self, id: Uuid)
        -> anyhow::Result<Option<(Booking, ServiceListing)>>;
    async fn delete_booking(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Unapproved bookings on listings owned by `owner_id`, newest first.
    async fn pending_for_owner(&self, owner_id: Uuid) -> anyhow::Result<Vec<Booking>>;
    /// Approved bookings requested by `user_id`, newest first.
    async fn approved_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Booking>>;
    async fn list(&self, filter: BookingFilter) -> anyhow::Result<Vec<Booking>>;
}

const BOOKING_COLUMNS: &str = "b.id, b.service_id, b.user_id, b.animal_type, b.animal_size, \
     b.booking_dates, b.price, b.notes, b.is_approved, b.created_at";

const LISTING_SELECT: &str = r#"
    SELECT s.id, s.post_id, p.user_id AS owner_id, s.service_type, s.price, s.unavailable_dates
    FROM services s
    JOIN posts p ON p.id = s.post_id
    WHERE s.id = $1
"#;

#[derive(Clone)]
pub struct PgBookingStore {
    db: PgPool,
}

impl PgBookingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn lock_listing(
    conn: &mut PgConnection,
    service_id: Uuid,
) -> anyhow::Result<Option<ServiceListing>> {
    let listing = sqlx::query_as::<_, ServiceListing>(&format!("{LISTING_SELECT} FOR UPDATE OF s"))
        .bind(service_id)
        .fetch_optional(conn)
        .await
        .context("lock service listing")?;
    Ok(listing)
}

async fn lock_booking(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<Option<Booking>> {
    let booking = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("lock booking")?;
    Ok(booking)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_listing(&self, service_id: Uuid) -> anyhow::Result<Option<ServiceListing>> {
        let listing = sqlx::query_as::<_, ServiceListing>(LISTING_SELECT)
            .bind(service_id)
            .fetch_optional(&self.db)
            .await
            .context("find service listing")?;
        Ok(listing)
    }

    async fn find_booking(&self, id: Uuid) -> anyhow::Result<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find booking")?;
        Ok(booking)
    }

    async fn insert_booking(&self, new: NewBooking) -> anyhow::Result<WriteOutcome<Booking>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let Some(listing) = lock_listing(&mut tx, new.service_id).await? else {
            return Ok(WriteOutcome::Missing);
        };
        let taken = taken_dates(&new.booking_dates, &listing.unavailable_dates);
        if !taken.is_empty() {
            return Ok(WriteOutcome::DatesTaken(taken));
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings AS b
                (service_id, user_id, animal_type, animal_size, booking_dates, price, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(new.service_id)
        .bind(new.user_id)
        .bind(new.animal_type)
        .bind(new.animal_size)
        .bind(&new.booking_dates)
        .bind(listing.price)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await
        .context("insert booking")?;

        tx.commit().await.context("commit tx")?;
        Ok(WriteOutcome::Written(booking))
    }

    async fn update_booking(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> anyhow::Result<WriteOutcome<Booking>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let Some(mut booking) = lock_booking(&mut tx, id).await? else {
            return Ok(WriteOutcome::Missing);
        };

        if let Some(dates) = &patch.booking_dates {
            if booking.is_approved {
                return Ok(WriteOutcome::AlreadyApproved);
            }
            let Some(listing) = lock_listing(&mut tx, booking.service_id).await? else {
                return Ok(WriteOutcome::Missing);
            };
            let taken = taken_dates(dates, &listing.unavailable_dates);
            if !taken.is_empty() {
                return Ok(WriteOutcome::DatesTaken(taken));
            }
        }

        booking.apply(patch);
        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings AS b
            SET animal_type = $2, animal_size = $3, booking_dates = $4, notes = $5
            WHERE b.id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.id)
        .bind(booking.animal_type)
        .bind(booking.animal_size)
        .bind(&booking.booking_dates)
        .bind(&booking.notes)
        .fetch_one(&mut *tx)
        .await
        .context("update booking")?;

        tx.commit().await.context("commit tx")?;
        Ok(WriteOutcome::Written(booking))
    }

    async fn approve_booking(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<(Booking, ServiceListing)>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let Some(booking) = lock_booking(&mut tx, id).await? else {
            return Ok(None);
        };
        let Some(mut listing) = lock_listing(&mut tx, booking.service_id).await? else {
            return Ok(None);
        };

        listing.unavailable_dates =
            merge_unavailable(&listing.unavailable_dates, &booking.booking_dates);
        sqlx::query("UPDATE services SET unavailable_dates = $2 WHERE id = $1")
            .bind(listing.id)
            .bind(&listing.unavailable_dates)
            .execute(&mut *tx)
            .await
            .context("merge unavailable dates")?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings AS b SET is_approved = TRUE WHERE b.id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("approve booking")?;

        tx.commit().await.context("commit tx")?;
        Ok(Some((booking, listing)))
    }

    async fn delete_booking(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete booking")?;
        Ok(res.rows_affected() > 0)
    }

    async fn pending_for_owner(&self, owner_id: Uuid) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings b
            JOIN services s ON s.id = b.service_id
            JOIN posts p ON p.id = s.post_id
            WHERE p.user_id = $1 AND b.is_approved = FALSE
            ORDER BY b.created_at DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.db)
        .await
        .context("list pending bookings")?;
        Ok(rows)
    }

    async fn approved_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings b
            WHERE b.user_id = $1 AND b.is_approved = TRUE
            ORDER BY b.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list approved bookings")?;
        Ok(rows)
    }

    async fn list(&self, filter: BookingFilter) -> anyhow::Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings b
            WHERE ($1::uuid IS NULL OR b.service_id = $1)
              AND ($2::uuid IS NULL OR b.user_id = $2)
            ORDER BY b.created_at DESC
            "#
        ))
        .bind(filter.service_id)
        .bind(filter.user_id)
        .fetch_all(&self.db)
        .await
        .context("list bookings")?;
        Ok(rows)
    }
}
