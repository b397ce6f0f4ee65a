use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::repo_types::Role;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
}

/// Columns left as `None` keep their stored value.
#[derive(Debug, Default, PartialEq)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

pub enum UpdateOutcome {
    /// `email_changed` means the address now awaits verification.
    Updated { profile: Profile, email_changed: bool },
    Missing,
    UsernameTaken,
    EmailTaken,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>>;
    /// A new email must not belong to another verified account, and clears
    /// the verified flag.
    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> anyhow::Result<UpdateOutcome>;
    async fn set_profile_pic(&self, id: Uuid, url: &str) -> anyhow::Result<Option<Profile>>;
}

const PROFILE_COLUMNS: &str =
    "id, email, username, role, is_email_verified, description, profile_pic";

#[derive(Clone)]
pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find profile")?;
        Ok(profile)
    }

    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> anyhow::Result<UpdateOutcome> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT email FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("lock user")?;
        let Some((current_email,)) = current else {
            tx.rollback().await.ok();
            return Ok(UpdateOutcome::Missing);
        };

        let email_changed = patch
            .email
            .as_deref()
            .is_some_and(|email| email != current_email);
        if email_changed {
            let taken: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM users
                    WHERE email = $1 AND is_email_verified AND id <> $2
                )
                "#,
            )
            .bind(&patch.email)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("check email owner")?;
            if taken {
                tx.rollback().await.ok();
                return Ok(UpdateOutcome::EmailTaken);
            }
        }

        let res = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                description = COALESCE($4, description),
                is_email_verified = is_email_verified AND NOT $5
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.username)
        .bind(&patch.email)
        .bind(&patch.description)
        .bind(email_changed)
        .fetch_one(&mut *tx)
        .await;

        match res {
            Ok(profile) => {
                tx.commit().await.context("commit tx")?;
                Ok(UpdateOutcome::Updated {
                    profile,
                    email_changed,
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await.ok();
                Ok(UpdateOutcome::UsernameTaken)
            }
            Err(e) => Err(anyhow::Error::new(e).context("update profile")),
        }
    }

    async fn set_profile_pic(&self, id: Uuid, url: &str) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "UPDATE users SET profile_pic = $2 WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await
        .context("set profile picture")?;
        Ok(profile)
    }
}
