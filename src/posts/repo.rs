use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{NewService, PostView};
use super::repo_types::{
    Location, NewPost, Post, PostPatch, PostSearch, PostWrite, ServiceListing, ServicePatch,
};

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Inserts the post and all its listings in one transaction.
    async fn insert_post(&self, new: NewPost, services: &[NewService]) -> anyhow::Result<PostView>;
    async fn find_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// Newest first.
    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Post>>;
    async fn search_posts(&self, search: &PostSearch) -> anyhow::Result<Vec<Post>>;
    async fn services_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<ServiceListing>>;
    async fn append_images(&self, id: Uuid, urls: &[String]) -> anyhow::Result<Option<Post>>;
    /// Applies the post columns and every listing edit, or nothing.
    async fn update_post(
        &self,
        id: Uuid,
        patch: &PostPatch,
        services: &[ServicePatch],
    ) -> anyhow::Result<PostWrite>;
    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Sorted by name.
    async fn list_locations(&self) -> anyhow::Result<Vec<Location>>;
    async fn find_location(&self, id: i32) -> anyhow::Result<Option<Location>>;
}

const POST_COLUMNS: &str =
    "id, user_id, description, animal_type, animal_size, location_id, images_url, created_at";

const SERVICE_SELECT: &str = r#"
    SELECT s.id, s.post_id, p.user_id AS owner_id, s.service_type, s.price, s.unavailable_dates
    FROM services s
    JOIN posts p ON p.id = s.post_id
"#;

/// Keywords match literally inside an `ILIKE` pattern.
fn like_pattern(keywords: &str) -> String {
    let escaped = keywords
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Clone)]
pub struct PgPostStore {
    db: PgPool,
}

impl PgPostStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert_post(&self, new: NewPost, services: &[NewService]) -> anyhow::Result<PostView> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (user_id, description, animal_type, animal_size, location_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.description)
        .bind(new.animal_type)
        .bind(new.animal_size)
        .bind(new.location_id)
        .fetch_one(&mut *tx)
        .await
        .context("insert post")?;

        let mut listings = Vec::with_capacity(services.len());
        for s in services {
            let (id,): (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO services (post_id, service_type, price, unavailable_dates)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(post.id)
            .bind(s.service_type)
            .bind(s.price)
            .bind(&s.unavailable_dates)
            .fetch_one(&mut *tx)
            .await
            .context("insert service")?;

            listings.push(ServiceListing {
                id,
                post_id: post.id,
                owner_id: new.user_id,
                service_type: s.service_type,
                price: s.price,
                unavailable_dates: s.unavailable_dates.clone(),
            });
        }

        tx.commit().await.context("commit tx")?;
        Ok(PostView {
            post,
            services: listings,
        })
    }

    async fn find_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let post =
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .context("find post")?;
        Ok(post)
    }

    async fn list_posts(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list posts")?;
        Ok(rows)
    }

    async fn search_posts(&self, search: &PostSearch) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            WHERE ($1::text IS NULL OR p.description ILIKE $1)
              AND (cardinality($2::service_type[]) = 0 OR EXISTS (
                    SELECT 1 FROM services s
                    WHERE s.post_id = p.id AND s.service_type = ANY($2)))
              AND ($3::animal_type IS NULL OR p.animal_type = $3)
              AND (cardinality($4::animal_size[]) = 0 OR p.animal_size = ANY($4))
              AND ($5::int IS NULL OR p.location_id = $5)
            ORDER BY p.created_at DESC
            "#
        ))
        .bind(search.keywords.as_deref().map(like_pattern))
        .bind(&search.service_types)
        .bind(search.animal_type)
        .bind(&search.animal_sizes)
        .bind(search.location_id)
        .fetch_all(&self.db)
        .await
        .context("search posts")?;
        Ok(rows)
    }

    async fn services_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<ServiceListing>> {
        let rows = sqlx::query_as::<_, ServiceListing>(&format!(
            "{SERVICE_SELECT} WHERE s.post_id = ANY($1)"
        ))
        .bind(post_ids)
        .fetch_all(&self.db)
        .await
        .context("list services for posts")?;
        Ok(rows)
    }

    async fn append_images(&self, id: Uuid, urls: &[String]) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET images_url = images_url || $2 WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(urls)
        .fetch_optional(&self.db)
        .await
        .context("append post images")?;
        Ok(post)
    }

    async fn update_post(
        &self,
        id: Uuid,
        patch: &PostPatch,
        services: &[ServicePatch],
    ) -> anyhow::Result<PostWrite> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET description = COALESCE($2, description),
                animal_type = COALESCE($3, animal_type),
                animal_size = COALESCE($4, animal_size),
                location_id = COALESCE($5, location_id)
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.description)
        .bind(patch.animal_type)
        .bind(patch.animal_size)
        .bind(patch.location_id)
        .fetch_optional(&mut *tx)
        .await
        .context("update post")?;
        let Some(post) = post else {
            tx.rollback().await.ok();
            return Ok(PostWrite::Missing);
        };

        for s in services {
            let res = sqlx::query(
                r#"
                UPDATE services
                SET service_type = COALESCE($3, service_type),
                    price = COALESCE($4, price)
                WHERE id = $1 AND post_id = $2
                "#,
            )
            .bind(s.id)
            .bind(id)
            .bind(s.service_type)
            .bind(s.price)
            .execute(&mut *tx)
            .await
            .context("update service")?;
            if res.rows_affected() == 0 {
                tx.rollback().await.ok();
                return Ok(PostWrite::UnknownService(s.id));
            }
        }

        tx.commit().await.context("commit tx")?;
        Ok(PostWrite::Written(post))
    }

    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete post")?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_locations(&self) -> anyhow::Result<Vec<Location>> {
        let rows = sqlx::query_as::<_, Location>("SELECT id, name FROM locations ORDER BY name")
            .fetch_all(&self.db)
            .await
            .context("list locations")?;
        Ok(rows)
    }

    async fn find_location(&self, id: i32) -> anyhow::Result<Option<Location>> {
        let row = sqlx::query_as::<_, Location>("SELECT id, name FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find location")?;
        Ok(row)
    }
}

/// Pairs each post with its listings, keeping the post order.
pub fn attach_services(posts: Vec<Post>, services: Vec<ServiceListing>) -> Vec<PostView> {
    posts
        .into_iter()
        .map(|post| {
            let services = services
                .iter()
                .filter(|s| s.post_id == post.id)
                .cloned()
                .collect();
            PostView { post, services }
        })
        .collect()
}
