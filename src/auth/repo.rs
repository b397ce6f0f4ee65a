use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, Role, User, VerificationCode};

/// Credential Store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    /// Deletes the unverified accounts in `reclaim` and inserts `user` in one
    /// transaction. `None`, with nothing deleted, when the username is taken or
    /// a reclaimed account was verified in the meantime.
    async fn create(&self, user: NewUser, reclaim: &[Uuid]) -> anyhow::Result<Option<User>>;
    async fn mark_email_verified(&self, id: Uuid) -> anyhow::Result<()>;
    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>>;
}

/// Verification Code Store.
#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn insert(&self, code: &VerificationCode) -> anyhow::Result<()>;
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<VerificationCode>>;
    /// Returns false when the code was already gone.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, role, is_email_verified, description, profile_pic, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        // email is not unique at the DB level; prefer the verified record
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE email = $1
            ORDER BY is_email_verified DESC, created_at DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser, reclaim: &[Uuid]) -> anyhow::Result<Option<User>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        if !reclaim.is_empty() {
            let res = sqlx::query("DELETE FROM users WHERE id = ANY($1) AND is_email_verified = FALSE")
                .bind(reclaim)
                .execute(&mut *tx)
                .await
                .context("reclaim unverified users")?;
            if res.rows_affected() != reclaim.len() as u64 {
                tx.rollback().await.context("rollback tx")?;
                return Ok(None);
            }
        }

        let res = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&mut *tx)
        .await;

        match res {
            Ok(u) => {
                tx.commit().await.context("commit tx")?;
                Ok(Some(u))
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await.context("rollback tx")?;
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user")),
        }
    }

    async fn mark_email_verified(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_email_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("mark email verified")?;
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.db)
        .await
        .context("set user role")?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgCodeStore {
    db: PgPool,
}

impl PgCodeStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn insert(&self, code: &VerificationCode) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, user_id, code, created_at, expire_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(code.id)
        .bind(code.user_id)
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expire_at)
        .execute(&self.db)
        .await
        .context("insert verification code")?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<VerificationCode>> {
        let rows = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT id, user_id, code, created_at, expire_at
            FROM verification_codes
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list verification codes")?;
        Ok(rows)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM verification_codes WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete verification code")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM verification_codes WHERE expire_at < $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("delete expired verification codes")?;
        Ok(res.rows_affected())
    }
}
