use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert(&self, post_id: Uuid, user_id: Uuid, comment: &str) -> anyhow::Result<Review>;
    /// Newest first.
    async fn list_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Review>>;
    /// Only the author's own review is removed.
    async fn delete_by_author(&self, id: Uuid, author_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgReviewStore {
    db: PgPool,
}

impl PgReviewStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn insert(&self, post_id: Uuid, user_id: Uuid, comment: &str) -> anyhow::Result<Review> {
        let review = sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (post_id, user_id, comment)
                VALUES ($1, $2, $3)
                RETURNING id, post_id, user_id, comment, created_at
            )
            SELECT i.id, i.post_id, i.user_id, u.username, i.comment, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(comment)
        .fetch_one(&self.db)
        .await
        .context("insert review")?;
        Ok(review)
    }

    async fn list_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.post_id, r.user_id, u.username, r.comment, r.created_at
            FROM reviews r
            JOIN users u ON u.id = r.user_id
            WHERE r.post_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await
        .context("list reviews")?;
        Ok(rows)
    }

    async fn delete_by_author(&self, id: Uuid, author_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(author_id)
            .execute(&self.db)
            .await
            .context("delete review")?;
        Ok(res.rows_affected() > 0)
    }
}
