use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::availability::{check_service_type, normalize_dates, taken_dates};
use super::dto::{BookingView, CreateBookingRequest, UpdateBookingRequest};
use super::repo::BookingStore;
use super::repo_types::{Booking, BookingFilter, NewBooking, WriteOutcome};
use crate::access::CurrentUser;
use crate::auth::dto::PublicUser;
use crate::auth::repo::UserStore;
use crate::error::{AppError, AppResult};
use crate::mail::{booking_request_email, BookingRequestMail, Mailer};
use crate::posts::repo_types::ServiceListing;

const DATES_UNAVAILABLE: &str = "One or more booking dates are unavailable";

/// Booking lifecycle: pending on creation, approved once, or deleted while pending.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    app_url: String,
}

fn booking_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Booking with ID {id} not found"))
}

fn service_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Service with ID {id} not found"))
}

fn validate_dates(listing: &ServiceListing, raw: &[String]) -> AppResult<Vec<String>> {
    let dates = normalize_dates(raw).map_err(AppError::Validation)?;
    check_service_type(listing.service_type, &dates).map_err(AppError::Validation)?;
    if !taken_dates(&dates, &listing.unavailable_dates).is_empty() {
        return Err(AppError::validation(DATES_UNAVAILABLE));
    }
    Ok(dates)
}

fn written(outcome: WriteOutcome<Booking>, id: Uuid) -> AppResult<Booking> {
    match outcome {
        WriteOutcome::Written(b) => Ok(b),
        WriteOutcome::Missing => Err(booking_not_found(id)),
        WriteOutcome::DatesTaken(taken) => {
            warn!(?taken, "dates taken while waiting for listing lock");
            Err(AppError::validation(DATES_UNAVAILABLE))
        }
        WriteOutcome::AlreadyApproved => Err(AppError::validation(
            "Dates of an approved booking cannot be changed",
        )),
    }
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            users,
            mailer,
            app_url: app_url.into(),
        }
    }

    pub fn approval_link(&self, booking_id: Uuid) -> String {
        format!(
            "{}/bookings/approve/{booking_id}",
            self.app_url.trim_end_matches('/')
        )
    }

    #[instrument(skip(self, req), fields(user_id = %requester.sub))]
    pub async fn create(
        &self,
        requester: &CurrentUser,
        req: CreateBookingRequest,
    ) -> AppResult<BookingView> {
        let listing = self
            .store
            .find_listing(req.service_id)
            .await?
            .ok_or_else(|| service_not_found(req.service_id))?;

        let dates = validate_dates(&listing, &req.booking_dates.unwrap_or_default())?;

        let outcome = self
            .store
            .insert_booking(NewBooking {
                service_id: listing.id,
                user_id: requester.sub,
                animal_type: req.animal_type,
                animal_size: req.animal_size,
                booking_dates: dates,
                notes: req.notes.filter(|n| !n.trim().is_empty()),
            })
            .await?;
        let booking = match outcome {
            WriteOutcome::Missing => return Err(service_not_found(listing.id)),
            other => written(other, listing.id)?,
        };

        info!(booking_id = %booking.id, service_id = %listing.id, "booking created");
        if !booking.is_approved {
            self.notify_owner(&booking, &listing).await;
        }

        let user = self.public_user(booking.user_id).await?;
        Ok(BookingView {
            booking,
            service: listing,
            user,
        })
    }

    /// Failures are logged; the booking stands either way.
    async fn notify_owner(&self, booking: &Booking, listing: &ServiceListing) {
        let lookup = async {
            let owner = self.users.find_by_id(listing.owner_id).await?;
            let requester = self.users.find_by_id(booking.user_id).await?;
            anyhow::Ok(owner.zip(requester))
        };
        let (owner, requester) = match lookup.await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                warn!(booking_id = %booking.id, "owner or requester missing; no notification");
                return;
            }
            Err(e) => {
                error!(error = %e, booking_id = %booking.id, "notification lookup failed");
                return;
            }
        };

        let mail = booking_request_email(BookingRequestMail {
            owner_email: &owner.email,
            requester_username: &requester.username,
            requester_email: &requester.email,
            dates: &booking.booking_dates,
            animal: format!("{} ({})", booking.animal_type, booking.animal_size),
            approval_link: self.approval_link(booking.id),
        });
        if let Err(e) = self.mailer.send_mail(mail).await {
            error!(error = %e, booking_id = %booking.id, "booking notification failed");
        }
    }

    #[instrument(skip(self, req))]
    pub async fn update(&self, id: Uuid, req: UpdateBookingRequest) -> AppResult<BookingView> {
        let booking = self
            .store
            .find_booking(id)
            .await?
            .ok_or_else(|| booking_not_found(id))?;
        let listing = self
            .store
            .find_listing(booking.service_id)
            .await?
            .ok_or_else(|| service_not_found(booking.service_id))?;

        let dates = match &req.booking_dates {
            Some(raw) => Some(validate_dates(&listing, raw)?),
            None => None,
        };

        let outcome = self.store.update_booking(id, req.into_patch(dates)).await?;
        let booking = written(outcome, id)?;

        info!(booking_id = %booking.id, "booking updated");
        self.view(booking).await
    }

    /// The approver must own the listing or be an admin.
    #[instrument(skip(self), fields(user_id = %caller.sub))]
    pub async fn approve(&self, caller: &CurrentUser, id: Uuid) -> AppResult<BookingView> {
        let booking = self
            .store
            .find_booking(id)
            .await?
            .ok_or_else(|| booking_not_found(id))?;
        let listing = self
            .store
            .find_listing(booking.service_id)
            .await?
            .ok_or_else(|| service_not_found(booking.service_id))?;

        if !caller.is_admin() && listing.owner_id != caller.sub {
            warn!(booking_id = %id, "approve by non-owner");
            return Err(AppError::Forbidden);
        }

        let (booking, listing) = self
            .store
            .approve_booking(id)
            .await?
            .ok_or_else(|| booking_not_found(id))?;

        info!(booking_id = %booking.id, service_id = %listing.id, "booking approved");
        let user = self.public_user(booking.user_id).await?;
        Ok(BookingView {
            booking,
            service: listing,
            user,
        })
    }

    #[instrument(skip(self))]
    pub async fn disapprove(&self, id: Uuid) -> AppResult<()> {
        if !self.store.delete_booking(id).await? {
            return Err(booking_not_found(id));
        }
        info!(booking_id = %id, "booking disapproved");
        Ok(())
    }

    pub async fn pending_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<BookingView>> {
        let rows = self.store.pending_for_owner(owner_id).await?;
        self.views(rows).await
    }

    pub async fn approved_for_user(&self, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        let rows = self.store.approved_for_user(user_id).await?;
        self.views(rows).await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<BookingView>> {
        let rows = self
            .store
            .list(BookingFilter {
                service_id: None,
                user_id: Some(user_id),
            })
            .await?;
        self.views(rows).await
    }

    pub async fn list_all(&self, filter: BookingFilter) -> AppResult<Vec<BookingView>> {
        let rows = self.store.list(filter).await?;
        self.views(rows).await
    }

    async fn public_user(&self, id: Uuid) -> AppResult<Option<PublicUser>> {
        Ok(self
            .users
            .find_by_id(id)
            .await?
            .map(|u| PublicUser::from(&u)))
    }

    async fn view(&self, booking: Booking) -> AppResult<BookingView> {
        let mut views = self.views(vec![booking]).await?;
        views.pop().ok_or_else(|| AppError::not_found("Booking not found"))
    }

    /// Loads each distinct listing and requester once. Bookings whose
    /// listing vanished mid-read are skipped.
    async fn views(&self, bookings: Vec<Booking>) -> AppResult<Vec<BookingView>> {
        let mut listings: HashMap<Uuid, Option<ServiceListing>> = HashMap::new();
        let mut users: HashMap<Uuid, Option<PublicUser>> = HashMap::new();
        let mut out = Vec::with_capacity(bookings.len());

        for booking in bookings {
            if !listings.contains_key(&booking.service_id) {
                let listing = self.store.find_listing(booking.service_id).await?;
                listings.insert(booking.service_id, listing);
            }
            if !users.contains_key(&booking.user_id) {
                let user = self.public_user(booking.user_id).await?;
                users.insert(booking.user_id, user);
            }
            let Some(Some(service)) = listings.get(&booking.service_id).cloned() else {
                continue;
            };
            let user = users.get(&booking.user_id).cloned().flatten();
            out.push(BookingView {
                booking,
                service,
                user,
            });
        }
        Ok(out)
    }
}
