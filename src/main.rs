use std::time::Duration;

mod access;
mod app;
mod auth;
mod bookings;
mod config;
mod error;
mod mail;
mod posts;
mod profile;
mod reviews;
mod state;
mod storage;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "pettaxi=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;

    let every = Duration::from_secs(app_state.config.codes_cleanup_hours.max(1) * 3600);
    auth::cleanup::spawn(app_state.codes.clone(), every);

    app::serve(app::build_app(app_state)).await
}
