use crate::execution::ExecutionGateway;
use crate::media::MediaLibrary;
use axum::extract::FromRef;
use deadpool_diesel::postgres::Pool;
use std::sync::Arc;

/// Shared request context, built once at startup.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub pool: Pool,
    pub gateway: Arc<ExecutionGateway>,
    pub media: Arc<MediaLibrary>,
}
