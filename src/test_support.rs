//! In-memory stand-ins for the persistence and transport seams.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::access::CurrentUser;
use crate::auth::claims::{Claims, TokenKind};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::hash_password;
use crate::auth::repo::{CodeStore, UserStore};
use crate::auth::repo_types::{NewUser, Role, User, VerificationCode};
use crate::bookings::availability::{merge_unavailable, taken_dates};
use crate::bookings::repo::BookingStore;
use crate::bookings::repo_types::{Booking, BookingFilter, BookingPatch, NewBooking, WriteOutcome};
use crate::config::JwtConfig;
use crate::mail::{Mailer, OutgoingMail};
use crate::posts::dto::{NewService, PostView};
use crate::posts::repo::PostStore;
use crate::posts::repo_types::{
    AnimalSize, AnimalType, Location, NewPost, Post, PostPatch, PostSearch, PostWrite,
    ServiceListing, ServicePatch, ServiceType,
};
use crate::profile::repo::{Profile, ProfilePatch, ProfileStore, UpdateOutcome};
use crate::reviews::repo::{Review, ReviewStore};
use crate::state::Stores;
use crate::storage::BlobStore;

pub fn test_keys() -> JwtKeys {
    JwtKeys::new(&JwtConfig {
        secret: "test-secret".into(),
        issuer: "pettaxi".into(),
        audience: "pettaxi-users".into(),
        ttl_minutes: 5,
        refresh_ttl_minutes: 60,
    })
}

pub fn sample_user(username: &str, role: Role, verified: bool) -> User {
    User {
        id: Uuid::new_v4(),
        email: format!("{username}@example.com"),
        username: username.to_string(),
        password_hash: "$argon2id$placeholder".into(),
        role,
        is_email_verified: verified,
        description: None,
        profile_pic: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Claims as the gate would attach them for `user`.
pub fn caller(user: &User) -> CurrentUser {
    let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
    CurrentUser(Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        iat: now,
        exp: now + 300,
        iss: "pettaxi".into(),
        aud: "pettaxi-users".into(),
        kind: TokenKind::Access,
    })
}

/// Creates an unverified user with a real password hash.
pub async fn insert_user(store: &MemoryUserStore, username: &str, password: &str, role: Role) -> User {
    let new = NewUser {
        email: format!("{username}@example.com"),
        username: username.to_string(),
        password_hash: hash_password(password).unwrap(),
        role,
    };
    store
        .create(new, &[])
        .await
        .unwrap()
        .unwrap()
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    /// Receives the cascade when a user is deleted.
    codes: Option<Arc<MemoryCodeStore>>,
}

impl MemoryUserStore {
    pub fn linked(codes: Arc<MemoryCodeStore>) -> Self {
        Self {
            users: Mutex::default(),
            codes: Some(codes),
        }
    }

    /// Drops the user and cascades to their codes.
    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().retain(|u| u.id != id);
        if let Some(codes) = &self.codes {
            codes.codes.lock().unwrap().retain(|c| c.user_id != id);
        }
    }

    pub fn username_of(&self, id: Uuid) -> Option<String> {
        let users = self.users.lock().unwrap();
        users.iter().find(|u| u.id == id).map(|u| u.username.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        let mut matches: Vec<&User> = users.iter().filter(|u| u.email == email).collect();
        matches.sort_by_key(|u| std::cmp::Reverse((u.is_email_verified, u.created_at)));
        Ok(matches.first().map(|u| (*u).clone()))
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create(&self, new: NewUser, reclaim: &[Uuid]) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let reclaimable = reclaim
            .iter()
            .all(|id| users.iter().any(|u| u.id == *id && !u.is_email_verified));
        let name_taken = users
            .iter()
            .any(|u| u.username == new.username && !reclaim.contains(&u.id));
        if !reclaimable || name_taken {
            return Ok(None);
        }
        users.retain(|u| !reclaim.contains(&u.id));
        if let Some(codes) = &self.codes {
            codes.codes.lock().unwrap().retain(|c| !reclaim.contains(&c.user_id));
        }
        let mut user = sample_user(&new.username, new.role, false);
        user.email = new.email;
        user.password_hash = new.password_hash;
        users.push(user.clone());
        Ok(Some(user))
    }

    async fn mark_email_verified(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(u) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            u.is_email_verified = true;
        }
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }
}

fn profile_of(u: &User) -> Profile {
    Profile {
        id: u.id,
        email: u.email.clone(),
        username: u.username.clone(),
        role: u.role,
        is_email_verified: u.is_email_verified,
        description: u.description.clone(),
        profile_pic: u.profile_pic.clone(),
    }
}

#[async_trait]
impl ProfileStore for MemoryUserStore {
    async fn find_profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).map(profile_of))
    }

    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> anyhow::Result<UpdateOutcome> {
        let mut users = self.users.lock().unwrap();
        let Some(current_email) = users.iter().find(|u| u.id == id).map(|u| u.email.clone()) else {
            return Ok(UpdateOutcome::Missing);
        };
        let email_changed = patch
            .email
            .as_deref()
            .is_some_and(|email| email != current_email);
        if email_changed
            && users.iter().any(|u| {
                u.id != id && u.is_email_verified && Some(&u.email) == patch.email.as_ref()
            })
        {
            return Ok(UpdateOutcome::EmailTaken);
        }
        if let Some(name) = &patch.username {
            if users.iter().any(|u| u.id != id && u.username == *name) {
                return Ok(UpdateOutcome::UsernameTaken);
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(UpdateOutcome::Missing);
        };
        if let Some(name) = &patch.username {
            user.username = name.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(description) = &patch.description {
            user.description = Some(description.clone());
        }
        if email_changed {
            user.is_email_verified = false;
        }
        Ok(UpdateOutcome::Updated {
            profile: profile_of(user),
            email_changed,
        })
    }

    async fn set_profile_pic(&self, id: Uuid, url: &str) -> anyhow::Result<Option<Profile>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            u.profile_pic = Some(url.to_string());
            profile_of(u)
        }))
    }
}

#[derive(Default)]
pub struct MemoryCodeStore {
    codes: Mutex<Vec<VerificationCode>>,
}

impl MemoryCodeStore {
    pub fn len(&self) -> usize {
        self.codes.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn insert(&self, code: &VerificationCode) -> anyhow::Result<()> {
        self.codes.lock().unwrap().push(code.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<VerificationCode>> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut codes = self.codes.lock().unwrap();
        let before = codes.len();
        codes.retain(|c| c.id != id);
        Ok(codes.len() < before)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut codes = self.codes.lock().unwrap();
        let before = codes.len();
        codes.retain(|c| c.expire_at >= now);
        Ok((before - codes.len()) as u64)
    }
}

#[derive(Default)]
struct BookingTables {
    listings: Vec<ServiceListing>,
    bookings: Vec<Booking>,
}

/// One mutex over both tables stands in for the listing row lock.
#[derive(Default)]
pub struct MemoryBookingStore {
    tables: Mutex<BookingTables>,
}

impl MemoryBookingStore {
    pub fn add_listing(
        &self,
        owner_id: Uuid,
        service_type: ServiceType,
        unavailable: &[&str],
    ) -> ServiceListing {
        let listing = ServiceListing {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            owner_id,
            service_type,
            price: Decimal::new(2500, 2),
            unavailable_dates: unavailable.iter().map(|d| d.to_string()).collect(),
        };
        self.tables.lock().unwrap().listings.push(listing.clone());
        listing
    }

    pub fn listing(&self, id: Uuid) -> Option<ServiceListing> {
        let tables = self.tables.lock().unwrap();
        tables.listings.iter().find(|l| l.id == id).cloned()
    }

    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        let tables = self.tables.lock().unwrap();
        tables.bookings.iter().find(|b| b.id == id).cloned()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables.lock().unwrap().bookings.clone()
    }

    /// Drops the listing but leaves its bookings behind.
    pub fn remove_listing(&self, id: Uuid) {
        self.tables.lock().unwrap().listings.retain(|l| l.id != id);
    }

    /// Newest first; ties keep reverse insertion order.
    fn select(&self, pred: impl Fn(&BookingTables, &Booking) -> bool) -> Vec<Booking> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Booking> = tables
            .bookings
            .iter()
            .rev()
            .filter(|b| pred(&*tables, *b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }
}

fn filter_matches(filter: &BookingFilter, b: &Booking) -> bool {
    filter.service_id.map_or(true, |id| b.service_id == id)
        && filter.user_id.map_or(true, |id| b.user_id == id)
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find_listing(&self, service_id: Uuid) -> anyhow::Result<Option<ServiceListing>> {
        Ok(self.listing(service_id))
    }

    async fn find_booking(&self, id: Uuid) -> anyhow::Result<Option<Booking>> {
        Ok(self.booking(id))
    }

    async fn insert_booking(&self, new: NewBooking) -> anyhow::Result<WriteOutcome<Booking>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(listing) = tables.listings.iter().find(|l| l.id == new.service_id) else {
            return Ok(WriteOutcome::Missing);
        };
        let taken = taken_dates(&new.booking_dates, &listing.unavailable_dates);
        if !taken.is_empty() {
            return Ok(WriteOutcome::DatesTaken(taken));
        }
        let booking = Booking {
            id: Uuid::new_v4(),
            service_id: new.service_id,
            user_id: new.user_id,
            animal_type: new.animal_type,
            animal_size: new.animal_size,
            booking_dates: new.booking_dates,
            price: listing.price,
            notes: new.notes,
            is_approved: false,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.bookings.push(booking.clone());
        Ok(WriteOutcome::Written(booking))
    }

    async fn update_booking(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> anyhow::Result<WriteOutcome<Booking>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(current) = tables.bookings.iter().find(|b| b.id == id).cloned() else {
            return Ok(WriteOutcome::Missing);
        };
        if let Some(dates) = &patch.booking_dates {
            if current.is_approved {
                return Ok(WriteOutcome::AlreadyApproved);
            }
            let Some(listing) = tables.listings.iter().find(|l| l.id == current.service_id) else {
                return Ok(WriteOutcome::Missing);
            };
            let taken = taken_dates(dates, &listing.unavailable_dates);
            if !taken.is_empty() {
                return Ok(WriteOutcome::DatesTaken(taken));
            }
        }
        let Some(stored) = tables.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(WriteOutcome::Missing);
        };
        stored.apply(patch);
        Ok(WriteOutcome::Written(stored.clone()))
    }

    async fn approve_booking(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<(Booking, ServiceListing)>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(service_id) = tables.bookings.iter().find(|b| b.id == id).map(|b| b.service_id)
        else {
            return Ok(None);
        };
        if !tables.listings.iter().any(|l| l.id == service_id) {
            return Ok(None);
        }
        let Some(booking) = tables.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        booking.is_approved = true;
        let booking = booking.clone();
        let Some(listing) = tables.listings.iter_mut().find(|l| l.id == service_id) else {
            return Ok(None);
        };
        listing.unavailable_dates =
            merge_unavailable(&listing.unavailable_dates, &booking.booking_dates);
        Ok(Some((booking, listing.clone())))
    }

    async fn delete_booking(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.bookings.len();
        tables.bookings.retain(|b| b.id != id);
        Ok(tables.bookings.len() < before)
    }

    async fn pending_for_owner(&self, owner_id: Uuid) -> anyhow::Result<Vec<Booking>> {
        Ok(self.select(|t, b| {
            !b.is_approved
                && t
                    .listings
                    .iter()
                    .any(|l| l.id == b.service_id && l.owner_id == owner_id)
        }))
    }

    async fn approved_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Booking>> {
        Ok(self.select(|_, b| b.is_approved && b.user_id == user_id))
    }

    async fn list(&self, filter: BookingFilter) -> anyhow::Result<Vec<Booking>> {
        Ok(self.select(|_, b| filter_matches(&filter, b)))
    }
}

#[derive(Default)]
struct PostTables {
    posts: Vec<Post>,
    services: Vec<ServiceListing>,
    locations: Vec<Location>,
}

#[derive(Default)]
pub struct MemoryPostStore {
    tables: Mutex<PostTables>,
}

impl MemoryPostStore {
    pub fn add_location(&self, name: &str) -> Location {
        let mut tables = self.tables.lock().unwrap();
        let location = Location {
            id: tables.locations.len() as i32 + 1,
            name: name.to_string(),
        };
        tables.locations.push(location.clone());
        location
    }

    /// A post without listings.
    pub fn add_post(&self, owner_id: Uuid) -> Post {
        let post = Post {
            id: Uuid::new_v4(),
            user_id: owner_id,
            description: "Dog walking".into(),
            animal_type: AnimalType::Dog,
            animal_size: AnimalSize::Medium,
            location_id: None,
            images_url: vec![],
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().unwrap().posts.push(post.clone());
        post
    }
}

fn search_matches(search: &PostSearch, post: &Post, services: &[ServiceListing]) -> bool {
    let keywords = search.keywords.as_ref().map_or(true, |k| {
        post.description.to_lowercase().contains(&k.to_lowercase())
    });
    let service_type = search.service_types.is_empty()
        || services
            .iter()
            .any(|s| s.post_id == post.id && search.service_types.contains(&s.service_type));
    let animal_size =
        search.animal_sizes.is_empty() || search.animal_sizes.contains(&post.animal_size);
    keywords
        && service_type
        && animal_size
        && search.animal_type.map_or(true, |t| post.animal_type == t)
        && search.location_id.map_or(true, |id| post.location_id == Some(id))
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.reverse();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert_post(&self, new: NewPost, services: &[NewService]) -> anyhow::Result<PostView> {
        let mut tables = self.tables.lock().unwrap();
        let post = Post {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            description: new.description,
            animal_type: new.animal_type,
            animal_size: new.animal_size,
            location_id: new.location_id,
            images_url: vec![],
            created_at: OffsetDateTime::now_utc(),
        };
        let listings: Vec<ServiceListing> = services
            .iter()
            .map(|s| ServiceListing {
                id: Uuid::new_v4(),
                post_id: post.id,
                owner_id: post.user_id,
                service_type: s.service_type,
                price: s.price,
                unavailable_dates: s.unavailable_dates.clone(),
            })
            .collect();
        tables.posts.push(post.clone());
        tables.services.extend(listings.iter().cloned());
        Ok(PostView {
            post,
            services: listings,
        })
    }

    async fn find_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Post>> {
        let posts = newest_first(self.tables.lock().unwrap().posts.clone());
        Ok(posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn search_posts(&self, search: &PostSearch) -> anyhow::Result<Vec<Post>> {
        let tables = self.tables.lock().unwrap();
        let hits = tables
            .posts
            .iter()
            .filter(|p| search_matches(search, p, &tables.services))
            .cloned()
            .collect();
        Ok(newest_first(hits))
    }

    async fn services_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<ServiceListing>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .services
            .iter()
            .filter(|s| post_ids.contains(&s.post_id))
            .cloned()
            .collect())
    }

    async fn append_images(&self, id: Uuid, urls: &[String]) -> anyhow::Result<Option<Post>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.posts.iter_mut().find(|p| p.id == id).map(|p| {
            p.images_url.extend(urls.iter().cloned());
            p.clone()
        }))
    }

    async fn update_post(
        &self,
        id: Uuid,
        patch: &PostPatch,
        services: &[ServicePatch],
    ) -> anyhow::Result<PostWrite> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.posts.iter().any(|p| p.id == id) {
            return Ok(PostWrite::Missing);
        }
        if let Some(unknown) = services
            .iter()
            .find(|s| !tables.services.iter().any(|l| l.id == s.id && l.post_id == id))
        {
            return Ok(PostWrite::UnknownService(unknown.id));
        }
        for s in services {
            if let Some(listing) = tables.services.iter_mut().find(|l| l.id == s.id) {
                if let Some(service_type) = s.service_type {
                    listing.service_type = service_type;
                }
                if let Some(price) = s.price {
                    listing.price = price;
                }
            }
        }
        let Some(post) = tables.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(PostWrite::Missing);
        };
        if let Some(description) = &patch.description {
            post.description = description.clone();
        }
        if let Some(animal_type) = patch.animal_type {
            post.animal_type = animal_type;
        }
        if let Some(animal_size) = patch.animal_size {
            post.animal_size = animal_size;
        }
        if patch.location_id.is_some() {
            post.location_id = patch.location_id;
        }
        Ok(PostWrite::Written(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != id);
        tables.services.retain(|s| s.post_id != id);
        Ok(tables.posts.len() < before)
    }

    async fn list_locations(&self) -> anyhow::Result<Vec<Location>> {
        let mut locations = self.tables.lock().unwrap().locations.clone();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn find_location(&self, id: i32) -> anyhow::Result<Option<Location>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.locations.iter().find(|l| l.id == id).cloned())
    }
}

/// Resolves author usernames through the user fake, like the join in Postgres.
pub struct MemoryReviewStore {
    users: Arc<MemoryUserStore>,
    reviews: Mutex<Vec<Review>>,
}

impl MemoryReviewStore {
    pub fn new(users: Arc<MemoryUserStore>) -> Self {
        Self {
            users,
            reviews: Mutex::default(),
        }
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn insert(&self, post_id: Uuid, user_id: Uuid, comment: &str) -> anyhow::Result<Review> {
        let username = self.users.username_of(user_id).context("review author missing")?;
        let review = Review {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            username,
            comment: comment.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.reviews.lock().unwrap().push(review.clone());
        Ok(review)
    }

    async fn list_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let mut rows: Vec<Review> = self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.post_id == post_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_by_author(&self, id: Uuid, author_id: Uuid) -> anyhow::Result<bool> {
        let mut reviews = self.reviews.lock().unwrap();
        let before = reviews.len();
        reviews.retain(|r| !(r.id == id && r.user_id == author_id));
        Ok(reviews.len() < before)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_mail(&self, _mail: OutgoingMail) -> anyhow::Result<()> {
        anyhow::bail!("smtp relay unreachable")
    }
}

/// Records uploads and deletes; URLs point at a fake host.
#[derive(Default)]
pub struct FakeBlobStore {
    pub uploaded: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload_file(&self, _body: Bytes, key: &str, _content_type: &str) -> anyhow::Result<String> {
        self.uploaded.lock().unwrap().push(key.to_string());
        Ok(format!("https://fake.local/{key}"))
    }

    async fn delete_file(&self, key: &str) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix("https://fake.local/").map(str::to_string)
    }
}

/// Every fake store wired together, shared with `AppState::with_fakes`.
pub struct Fakes {
    pub users: Arc<MemoryUserStore>,
    pub codes: Arc<MemoryCodeStore>,
    pub bookings: Arc<MemoryBookingStore>,
    pub posts: Arc<MemoryPostStore>,
    pub reviews: Arc<MemoryReviewStore>,
    pub mailer: Arc<RecordingMailer>,
    pub blobs: Arc<FakeBlobStore>,
}

impl Default for Fakes {
    fn default() -> Self {
        let codes = Arc::new(MemoryCodeStore::default());
        let users = Arc::new(MemoryUserStore::linked(codes.clone()));
        Self {
            reviews: Arc::new(MemoryReviewStore::new(users.clone())),
            users,
            codes,
            bookings: Arc::new(MemoryBookingStore::default()),
            posts: Arc::new(MemoryPostStore::default()),
            mailer: Arc::new(RecordingMailer::default()),
            blobs: Arc::new(FakeBlobStore::default()),
        }
    }
}

impl Fakes {
    pub fn stores(&self) -> Stores {
        Stores {
            users: self.users.clone(),
            codes: self.codes.clone(),
            profiles: self.users.clone(),
            bookings: self.bookings.clone(),
            posts: self.posts.clone(),
            reviews: self.reviews.clone(),
        }
    }
}
