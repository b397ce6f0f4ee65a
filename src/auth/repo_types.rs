use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// How long a verification code stays redeemable.
pub const CODE_TTL: Duration = Duration::minutes(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Strict parse used by role assignment.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Sign-up only elevates on the literal `admin`; anything else is a plain user.
    pub fn for_signup(requested: Option<&str>) -> Role {
        match requested {
            Some("admin") => Role::Admin,
            _ => Role::User,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    pub is_email_verified: bool,
    pub description: Option<String>,
    pub profile_pic: Option<String>,
    pub created_at: OffsetDateTime,
}

pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// One-time email ownership proof.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub created_at: OffsetDateTime,
    pub expire_at: OffsetDateTime,
}

impl VerificationCode {
    pub fn issue(user_id: Uuid, code: String, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            code,
            created_at: now,
            expire_at: now + CODE_TTL,
        }
    }

    /// Both the value and the freshness must hold.
    pub fn redeemable(&self, candidate: &str, now: OffsetDateTime) -> bool {
        self.code == candidate && now <= self.expire_at
    }
}
