use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::posts::repo_types::{AnimalSize, AnimalType};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub service_id: Uuid,
    pub user_id: Uuid,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    pub booking_dates: Vec<String>,
    /// Listing price at creation time.
    pub price: Decimal,
    pub notes: Option<String>,
    pub is_approved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Validated creation input. Price is taken from the listing under lock.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id: Uuid,
    pub user_id: Uuid,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    pub booking_dates: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub animal_type: Option<AnimalType>,
    pub animal_size: Option<AnimalSize>,
    pub booking_dates: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl Booking {
    /// Empty notes leave the existing note in place.
    pub fn apply(&mut self, patch: BookingPatch) {
        if let Some(t) = patch.animal_type {
            self.animal_type = t;
        }
        if let Some(s) = patch.animal_size {
            self.animal_size = s;
        }
        if let Some(dates) = patch.booking_dates {
            self.booking_dates = dates;
        }
        if let Some(notes) = patch.notes.filter(|n| !n.trim().is_empty()) {
            self.notes = Some(notes);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub service_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Result of a write that re-checks availability under the listing lock.
#[derive(Debug)]
pub enum WriteOutcome<T> {
    Written(T),
    Missing,
    /// Requested dates already in the listing's unavailable set.
    DatesTaken(Vec<String>),
    /// Dates of an approved booking are already merged and cannot move.
    AlreadyApproved,
}
