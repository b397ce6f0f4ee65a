use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Booking, BookingFilter, BookingPatch};
use crate::auth::dto::PublicUser;
use crate::posts::repo_types::{AnimalSize, AnimalType, ServiceListing};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub animal_type: AnimalType,
    pub animal_size: AnimalSize,
    pub booking_dates: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub animal_type: Option<AnimalType>,
    pub animal_size: Option<AnimalSize>,
    pub booking_dates: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl UpdateBookingRequest {
    /// Dates are expected to be normalized already.
    pub fn into_patch(self, booking_dates: Option<Vec<String>>) -> BookingPatch {
        BookingPatch {
            animal_type: self.animal_type,
            animal_size: self.animal_size,
            booking_dates,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub service_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl From<BookingListQuery> for BookingFilter {
    fn from(q: BookingListQuery) -> Self {
        BookingFilter {
            service_id: q.service_id,
            user_id: q.user_id,
        }
    }
}

/// Booking plus the listing it consumes and the requester's public fields.
#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub service: ServiceListing,
    pub user: Option<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
