use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Custom endpoint (MinIO and friends). `None` means AWS.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub app_url: String,
    pub smtp: Option<SmtpConfig>,
    pub s3: S3Config,
    pub codes_cleanup_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pettaxi".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "pettaxi-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 2),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 30),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => {
                let user = std::env::var("SMTP_USER")?;
                Some(SmtpConfig {
                    host,
                    password: std::env::var("SMTP_PASSWORD")?,
                    from: std::env::var("MAIL_FROM").unwrap_or_else(|_| user.clone()),
                    user,
                })
            }
            Err(_) => None,
        };

        let s3 = S3Config {
            bucket: std::env::var("S3_BUCKET")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
        };

        Ok(Self {
            database_url,
            jwt,
            app_url: std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
            smtp,
            s3,
            codes_cleanup_hours: env_parse("CODES_CLEANUP_HOURS").unwrap_or(24),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
