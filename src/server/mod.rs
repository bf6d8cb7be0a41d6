//! HTTP surface (axum): routing, request parsing, and response rendering
//! for both dialects.

#![allow(missing_docs)]

pub mod cors;
pub mod streaming;

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::context::RequestContext;
use crate::error::{ErrorDetail, ErrorEnvelope, GatewayError};
use crate::metrics::Outcome;
use crate::pipeline::Gateway;
use crate::wire::{
    BatchedPayload, ChatCompletionRequest, Dialect, EmbeddingsRequest, ImageGenerationRequest,
    ResponsesRequest, UnifiedRequest, UnifiedResponse,
};

/// Builds the gateway router with CORS and tracing layers applied.
pub fn router(gateway: Arc<Gateway>) -> Router {
    let cors_layer = cors::layer(gateway.cors());
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/embeddings", post(embeddings_handler))
        .route("/v1/images/generations", post(images_handler))
        .route("/v1/responses", post(responses_handler))
        .route("/v1/models", get(models_handler))
        .fallback(not_found_handler)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[tracing::instrument]
async fn health_handler() -> Response {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

async fn metrics_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        gateway.metrics().encode(),
    )
        .into_response()
}

async fn not_found_handler() -> Response {
    let body = ErrorEnvelope {
        error: ErrorDetail {
            kind: "invalid_request_error".to_string(),
            code: None,
            message: "Not found".to_string(),
            param: None,
        },
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[instrument(skip(gateway, headers), fields(model = tracing::field::Empty))]
async fn chat_completions_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = context_from(&headers);
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return reject(&gateway, &ctx, Dialect::Chat, bad_body(error));
        }
    };
    tracing::Span::current().record("model", tracing::field::display(&request.model));

    if request.messages.is_empty() {
        return reject(
            &gateway,
            &ctx,
            Dialect::Chat,
            GatewayError::invalid_param("`messages` must not be empty.", "messages"),
        );
    }

    let unified = UnifiedRequest::chat(request).with_raw_body(body);
    dispatch(gateway, ctx, unified).await
}

#[instrument(skip(gateway, headers), fields(model = tracing::field::Empty))]
async fn responses_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = context_from(&headers);
    let request: ResponsesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return reject(&gateway, &ctx, Dialect::Semantic, bad_body(error));
        }
    };
    tracing::Span::current().record("model", tracing::field::display(&request.model));

    if request.input.is_none() {
        return reject(
            &gateway,
            &ctx,
            Dialect::Semantic,
            GatewayError::invalid_param("Missing required parameter: 'input'.", "input"),
        );
    }

    let unified = UnifiedRequest::semantic(request).with_raw_body(body);
    dispatch(gateway, ctx, unified).await
}

#[instrument(skip(gateway, headers))]
async fn embeddings_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = context_from(&headers);
    let request: EmbeddingsRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return reject(&gateway, &ctx, Dialect::Embeddings, bad_body(error));
        }
    };

    if !request.has_input() {
        return reject(
            &gateway,
            &ctx,
            Dialect::Embeddings,
            GatewayError::invalid_param("Missing required parameter: 'input'.", "input"),
        );
    }

    let unified = UnifiedRequest::embeddings(request).with_raw_body(body);
    dispatch(gateway, ctx, unified).await
}

#[instrument(skip(gateway, headers))]
async fn images_handler(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = context_from(&headers);
    let request: ImageGenerationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return reject(&gateway, &ctx, Dialect::Images, bad_body(error));
        }
    };

    if request.prompt.is_empty() {
        return reject(
            &gateway,
            &ctx,
            Dialect::Images,
            GatewayError::invalid_param("Missing required parameter: 'prompt'.", "prompt"),
        );
    }

    let unified = UnifiedRequest::images(request).with_raw_body(body);
    dispatch(gateway, ctx, unified).await
}

#[instrument(skip(gateway, headers))]
async fn models_handler(State(gateway): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    let ctx = context_from(&headers);
    if let Err(error) = gateway.authorize(&ctx).await {
        return with_request_id(&ctx, error.into_response());
    }
    gateway
        .metrics()
        .record_request(Dialect::Models, Outcome::Ok);
    with_request_id(&ctx, Json(gateway.registry().list()).into_response())
}

async fn dispatch(gateway: Arc<Gateway>, ctx: RequestContext, request: UnifiedRequest) -> Response {
    match gateway.handle(&ctx, request).await {
        Ok(UnifiedResponse::Batched(payload)) => {
            with_request_id(&ctx, batched_response(payload))
        }
        Ok(UnifiedResponse::Streaming(stream)) => streaming::sse_response(ctx, gateway, stream),
        Err(error) => with_request_id(&ctx, error.into_response()),
    }
}

fn batched_response(payload: BatchedPayload) -> Response {
    match payload {
        BatchedPayload::Chat(resp) => Json(resp).into_response(),
        BatchedPayload::Semantic(resp) => Json(resp).into_response(),
        BatchedPayload::Embeddings(resp) => Json(resp).into_response(),
        BatchedPayload::Images(resp) => Json(resp).into_response(),
        BatchedPayload::Models(resp) => Json(resp).into_response(),
    }
}

/// Early rejection before the pipeline runs: counts the failure and renders
/// the envelope.
fn reject(
    gateway: &Gateway,
    ctx: &RequestContext,
    dialect: Dialect,
    error: GatewayError,
) -> Response {
    gateway
        .metrics()
        .record_request(dialect, Outcome::ClientError);
    with_request_id(ctx, error.into_response())
}

fn bad_body(error: serde_json::Error) -> GatewayError {
    GatewayError::invalid(format!("invalid request body: {error}"))
}

fn with_request_id(ctx: &RequestContext, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}

fn context_from(headers: &HeaderMap) -> RequestContext {
    let credential = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_string());
    RequestContext::new(credential)
}
