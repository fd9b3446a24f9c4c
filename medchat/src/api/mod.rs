use warp::{Filter, Rejection, Reply};

use crate::context::AppContext;

mod chat;
mod status;

const MAX_BODY_BYTES: u64 = 2 * 1024 * 1024;

pub fn routes(
    ctx: AppContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let status_route = api
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(status::handle_status);

    let chat_route = api
        .and(warp::path("chat"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(chat::handle_chat);

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    let metrics = warp::path("metrics")
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(status::handle_metrics);

    health.or(metrics).or(status_route).or(chat_route)
}

fn with_context(
    ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}
