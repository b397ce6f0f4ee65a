use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{CreatePostRequest, Pagination, PostView, SearchQuery, UpdatePostRequest};
use super::repo::{attach_services, PostStore};
use super::repo_types::{Location, NewPost, Post, PostWrite, ServiceType};
use crate::access::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::storage::{ext_from_mime, BlobStore};

/// One image part of a multipart upload.
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn PostStore>,
    storage: Arc<dyn BlobStore>,
}

fn post_not_found() -> AppError {
    AppError::not_found("Post not found")
}

fn service_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Service with ID {id} not found"))
}

fn ensure_owner(caller: &CurrentUser, post: &Post) -> AppResult<()> {
    if post.user_id != caller.sub && !caller.is_admin() {
        warn!(post_id = %post.id, "write by non-owner");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl PostService {
    pub fn new(store: Arc<dyn PostStore>, storage: Arc<dyn BlobStore>) -> Self {
        Self { store, storage }
    }

    async fn load(&self, id: Uuid) -> AppResult<Post> {
        self.store.find_post(id).await?.ok_or_else(post_not_found)
    }

    async fn check_location(&self, id: Option<i32>) -> AppResult<()> {
        if let Some(id) = id {
            if self.store.find_location(id).await?.is_none() {
                return Err(AppError::not_found("Location not found"));
            }
        }
        Ok(())
    }

    async fn view(&self, post: Post) -> AppResult<PostView> {
        let services = self.store.services_for_posts(&[post.id]).await?;
        Ok(PostView { post, services })
    }

    async fn views(&self, posts: Vec<Post>) -> AppResult<Vec<PostView>> {
        let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let services = self.store.services_for_posts(&ids).await?;
        Ok(attach_services(posts, services))
    }

    #[instrument(skip(self, req), fields(user_id = %caller.sub))]
    pub async fn create(&self, caller: &CurrentUser, req: CreatePostRequest) -> AppResult<PostView> {
        let services = req.validate().map_err(AppError::Validation)?;
        self.check_location(req.location_id).await?;
        let view = self
            .store
            .insert_post(
                NewPost {
                    user_id: caller.sub,
                    description: req.description.trim().to_string(),
                    animal_type: req.animal_type,
                    animal_size: req.animal_size,
                    location_id: req.location_id,
                },
                &services,
            )
            .await?;
        info!(post_id = %view.post.id, services = view.services.len(), "post created");
        Ok(view)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PostView> {
        let post = self.load(id).await?;
        self.view(post).await
    }

    pub async fn ensure_exists(&self, id: Uuid) -> AppResult<()> {
        self.load(id).await.map(|_| ())
    }

    pub async fn list(&self, p: Pagination) -> AppResult<Vec<PostView>> {
        let posts = self
            .store
            .list_posts(p.limit.clamp(1, 100), p.offset.max(0))
            .await?;
        self.views(posts).await
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: SearchQuery) -> AppResult<Vec<PostView>> {
        let search = query.into_search().map_err(AppError::Validation)?;
        let posts = self.store.search_posts(&search).await?;
        info!(hits = posts.len(), "post search");
        self.views(posts).await
    }

    pub async fn locations(&self) -> AppResult<Vec<Location>> {
        Ok(self.store.list_locations().await?)
    }

    /// Owner or admin. Listings are edited in place, so their bookings survive.
    #[instrument(skip(self, req), fields(user_id = %caller.sub))]
    pub async fn update(
        &self,
        caller: &CurrentUser,
        id: Uuid,
        req: UpdatePostRequest,
    ) -> AppResult<PostView> {
        let (patch, services) = req.validate().map_err(AppError::Validation)?;
        let post = self.load(id).await?;
        ensure_owner(caller, &post)?;
        self.check_location(patch.location_id).await?;

        let listings = self.store.services_for_posts(&[id]).await?;
        for s in &services {
            let listing = listings
                .iter()
                .find(|l| l.id == s.id)
                .ok_or_else(|| service_not_found(s.id))?;
            if s.service_type == Some(ServiceType::Other) && !listing.unavailable_dates.is_empty() {
                return Err(AppError::validation(
                    "A service with unavailable dates cannot become 'other'",
                ));
            }
        }

        let post = match self.store.update_post(id, &patch, &services).await? {
            PostWrite::Written(post) => post,
            PostWrite::Missing => return Err(post_not_found()),
            PostWrite::UnknownService(sid) => return Err(service_not_found(sid)),
        };
        info!(post_id = %id, services = services.len(), "post updated");
        self.view(post).await
    }

    /// Only the post author may upload.
    #[instrument(skip(self, uploads), fields(user_id = %caller.sub))]
    pub async fn add_images(
        &self,
        caller: &CurrentUser,
        id: Uuid,
        uploads: Vec<ImageUpload>,
    ) -> AppResult<PostView> {
        let post = self.load(id).await?;
        if post.user_id != caller.sub {
            return Err(AppError::Forbidden);
        }
        if uploads.is_empty() {
            return Err(AppError::validation("images is required"));
        }

        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let ext = ext_from_mime(&upload.content_type).unwrap_or("bin");
            let key = format!("post-images/{}/{}.{}", id, Uuid::new_v4(), ext);
            urls.push(
                self.storage
                    .upload_file(upload.body, &key, &upload.content_type)
                    .await?,
            );
        }

        let post = self
            .store
            .append_images(id, &urls)
            .await?
            .ok_or_else(post_not_found)?;
        info!(post_id = %id, count = urls.len(), "post images uploaded");
        self.view(post).await
    }

    /// Stored images go first; a failed image delete is logged and skipped.
    #[instrument(skip(self), fields(user_id = %caller.sub))]
    pub async fn delete(&self, caller: &CurrentUser, id: Uuid) -> AppResult<()> {
        let post = self.load(id).await?;
        ensure_owner(caller, &post)?;

        for url in &post.images_url {
            let Some(key) = self.storage.key_from_url(url) else {
                warn!(url = %url, "image url outside the bucket");
                continue;
            };
            if let Err(e) = self.storage.delete_file(&key).await {
                error!(error = %e, key = %key, "image delete failed");
            }
        }

        if !self.store.delete_post(id).await? {
            return Err(post_not_found());
        }
        info!(post_id = %id, "post deleted");
        Ok(())
    }
}
