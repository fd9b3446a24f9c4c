use chrono::Utc;
use tracing::info;
use warp::{Rejection, Reply};

use crate::context::AppContext;
use crate::error::ApiError;
use crate::models::StatusResponse;

pub async fn handle_status(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let status = ctx.backend.check_status().await;
    ctx.metrics.record_status(&status);
    info!("Knowledge base status: {} ({})", status.ready, status.message);

    Ok(warp::reply::json(&StatusResponse {
        success: true,
        rag_system: status,
        timestamp: Utc::now(),
    }))
}

pub async fn handle_metrics(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let (buffer, content_type) = ctx
        .metrics
        .encode()
        .map_err(|e| warp::reject::custom(ApiError::InternalError(e.to_string())))?;

    Ok(warp::reply::with_header(buffer, "Content-Type", content_type))
}
