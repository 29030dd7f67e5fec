use crate::cli::Args;
use crate::execution::{ExecutionGateway, FallbackConfig, GatewayConfig};
use crate::media::MediaLibrary;
use crate::state::AppState;
use anyhow::{Context, anyhow};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::log::{info, warn};

pub mod cli;
pub mod errors;
pub mod execution;
pub mod grading;
pub mod media;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;
pub mod settings;
pub mod state;

mod api;

const MEDIA_UPLOAD_LIMIT: usize = 32 * 1024 * 1024;

pub async fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Seeding default platform settings...");
    seed_settings(&pool).await?;

    info!("Initializing execution gateway for {}...", args.sandbox_url);
    let gateway = ExecutionGateway::new(GatewayConfig {
        sandbox_url: args.sandbox_url.clone(),
        request_timeout: Duration::from_secs(args.sandbox_timeout_secs),
        fallback: FallbackConfig {
            language_id: args.fallback_language_id,
            interpreter: args.fallback_interpreter.clone(),
            file_suffix: ".py".to_string(),
            timeout: Duration::from_secs(args.fallback_timeout_secs),
            work_dir: None,
        },
    })
    .context("Failed to initialize execution gateway")?;

    info!("Preparing media library at {:?}...", args.uploads_dir);
    tokio::fs::create_dir_all(&args.uploads_dir)
        .await
        .with_context(|| format!("Failed to create uploads directory {:?}", args.uploads_dir))?;
    let media = MediaLibrary::new(&args.uploads_dir, &args.uploads_url_prefix);

    info!("Initializing router...");
    Ok(init_router_internal(AppState {
        pool,
        gateway: Arc::new(gateway),
        media: Arc::new(media),
    }))
}

pub fn init_test_router(state: AppState) -> Router {
    init_router_internal(state)
}

fn init_router_internal(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/api", student_routes())
        .nest("/admin", admin_routes())
        .nest("/editor", editor_routes());

    let prefix = state.media.url_prefix().to_string();
    if prefix.starts_with('/') && prefix.len() > 1 {
        router = router.nest_service(&prefix, ServeDir::new(state.media.root()));
    } else {
        warn!("Uploads URL prefix '{}' is not servable; static media disabled", prefix);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

async fn seed_settings(pool: &Pool) -> anyhow::Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get a connection for settings seeding")?;
    conn.interact(settings::seed_defaults)
        .await
        .map_err(|e| anyhow!("Settings seeding interaction failed: {}", e))?
        .context("Failed to seed default settings")?;
    Ok(())
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api::student::health))
        .route("/labs", get(api::student::list_labs))
        .route("/labs/{lab_id}/modules", get(api::student::list_lab_modules))
        .route("/challenges", get(api::student::list_challenges))
        .route("/challenges/{challenge_id}", get(api::student::get_challenge))
        .route("/execute", post(api::student::execute))
        .route("/submit_solution", post(api::student::submit_solution))
        .route("/users/{user_id}/progress", get(api::student::get_user_progress))
        .route("/users/{user_id}/profile", get(api::student::get_user_profile))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(api::admin::get_dashboard))
        .route(
            "/settings",
            get(api::admin::list_settings).put(api::admin::save_settings),
        )
        .route("/users", get(api::admin::list_users))
        .route(
            "/users/{user_id}/toggle_admin",
            post(api::admin::toggle_admin),
        )
        .route("/users/{user_id}/toggle_ban", post(api::admin::toggle_ban))
        .route("/users/{user_id}/xp", post(api::admin::adjust_xp))
        .route("/leaderboard", get(api::admin::get_leaderboard))
        .route(
            "/badges",
            get(api::admin::list_badges).post(api::admin::create_badge),
        )
        .route(
            "/badges/{badge_id}",
            axum::routing::delete(api::admin::delete_badge),
        )
        .route("/submissions", get(api::admin::list_submissions))
        .route("/analytics", get(api::admin::get_analytics))
}

fn editor_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/labs",
            get(api::editor::list_labs).post(api::editor::create_lab),
        )
        .route(
            "/labs/{lab_id}",
            get(api::editor::get_lab)
                .put(api::editor::update_lab)
                .delete(api::editor::delete_lab),
        )
        .route(
            "/modules",
            get(api::editor::list_modules).post(api::editor::create_module),
        )
        .route(
            "/modules/{module_id}",
            get(api::editor::get_module)
                .put(api::editor::update_module)
                .delete(api::editor::delete_module),
        )
        .route(
            "/challenges",
            get(api::editor::list_challenges).post(api::editor::create_challenge),
        )
        .route(
            "/challenges/{challenge_id}",
            get(api::editor::get_challenge)
                .put(api::editor::update_challenge)
                .delete(api::editor::delete_challenge),
        )
        .route(
            "/media",
            get(api::editor::list_media)
                .post(api::editor::upload_media)
                .layer(DefaultBodyLimit::max(MEDIA_UPLOAD_LIMIT)),
        )
        .route(
            "/media/{media_id}",
            get(api::editor::get_media)
                .put(api::editor::update_media)
                .delete(api::editor::delete_media),
        )
}
