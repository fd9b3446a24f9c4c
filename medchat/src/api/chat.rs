use std::convert::Infallible;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::{Rejection, Reply};

use crate::context::AppContext;
use crate::error::ApiError;
use crate::models::ChatRequest;
use crate::prompt;
use crate::retrieval::TopK;
use crate::stream::{StreamEvent, CONTENT_TYPE};

pub async fn handle_chat(request: ChatRequest, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest(
            "question must not be empty".to_string(),
        )));
    }

    let request_id = Uuid::new_v4();
    info!("Processing chat [{}]", request_id);
    ctx.metrics.record_chat();

    // 1. Gate retrieval on readiness
    let status = ctx.backend.check_status().await;
    ctx.metrics.record_status(&status);

    // 2. Retrieve
    let report = request.report_text.as_deref();
    let knowledge = if request.use_knowledge_base && status.ready {
        let top_k = request
            .top_k
            .map(TopK::clamped)
            .unwrap_or(ctx.default_top_k);
        let query = prompt::retrieval_query(report, &question);
        let result = ctx.backend.retrieve(&query, top_k).await;
        ctx.metrics.record_retrieval(ctx.backend.name(), &result);
        if result.is_degraded() {
            warn!(
                "Chat [{}] continuing with degraded retrieval: {}",
                request_id,
                result.outcome.as_str()
            );
        }
        Some(result)
    } else {
        info!(
            "Chat [{}] answering without knowledge base (ready = {})",
            request_id, status.ready
        );
        None
    };

    // 3. Compose and generate
    let messages = prompt::compose(&status, knowledge.as_ref(), report, &question);

    let context = StreamEvent::Context {
        request_id,
        rag_status: status,
        snippet_count: knowledge.as_ref().map_or(0, |k| k.len()),
        retrieval: knowledge.as_ref().map(|k| k.outcome),
    };

    let deltas: BoxStream<'static, StreamEvent> = match ctx.generator.stream(&messages).await {
        Ok(deltas) => deltas
            .map(|delta| match delta {
                Ok(content) => StreamEvent::Delta { content },
                Err(e) => StreamEvent::Error {
                    message: e.to_string(),
                },
            })
            .boxed(),
        Err(e) => {
            error!("Chat [{}] generation failed: {:#}", request_id, e);
            stream::once(async move {
                StreamEvent::Error {
                    message: format!("{e:#}"),
                }
            })
            .boxed()
        }
    };

    let model = ctx.generator.model().to_string();
    let done = stream::once(async move {
        StreamEvent::Done {
            request_id,
            model,
            finished_at: Utc::now(),
        }
    });

    // 4. Serialize
    let events = stream::once(async move { context })
        .chain(deltas)
        .chain(done)
        .map(|event| Ok::<Bytes, Infallible>(event.to_line()));

    warp::http::Response::builder()
        .header("Content-Type", CONTENT_TYPE)
        .header("Cache-Control", "no-cache")
        .body(warp::hyper::Body::wrap_stream(events))
        .map_err(|e| warp::reject::custom(ApiError::InternalError(e.to_string())))
}
