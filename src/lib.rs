//! # Crossbar
//!
//! Embeddable AI gateway: one HTTP frontend, many LLM upstreams.
//!
//! Crossbar speaks two wire dialects — the OpenAI style (chat completions,
//! embeddings, images, model listing) and the semantic-event style
//! (`/v1/responses`) — and dispatches every request through a single
//! pipeline:
//!
//! ```text
//! Request → Auth → Rate limit → Quota → Cache → Resolve → Balance → Provider
//! ```
//!
//! Streamed responses flow back through a per-response dialect converter
//! and an SSE writer with strict sequence numbering.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crossbar::{Gateway, HttpProvider, HttpProviderConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let provider = Arc::new(HttpProvider::new(HttpProviderConfig {
//!     api_key: std::env::var("OPENAI_API_KEY").ok(),
//!     ..HttpProviderConfig::default()
//! })?);
//!
//! let gateway = Gateway::builder().model("gpt-4o", provider).build();
//! gateway.start_maintenance();
//!
//! let app = crossbar::server::router(gateway);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | Canned provider stub for tests/examples |
//!
//! ## Modules
//!
//! - [`wire`] - Wire model for both dialects plus the unified shapes
//! - [`convert`] - Batched and streaming dialect conversion
//! - [`pipeline`] - The per-request orchestrator ([`Gateway`])
//! - [`provider`] - Provider capability, HTTP provider, model registry
//! - [`balancer`] - Provider fanout with passive health tracking
//! - [`cache`] / [`limiter`] / [`quota`] - Admission and reuse controls
//! - [`hooks`] - Auth, request, per-chunk, and error interception
//! - [`sse`] / [`transport`] - Stream framing and upstream HTTP
//! - [`server`] - Axum routes and response rendering
//! - [`config`] - Environment-backed configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod balancer;
pub mod cache;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod fingerprint;
pub mod hooks;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod provider;
pub mod quota;
pub mod server;
pub mod sse;
pub mod transport;
#[allow(missing_docs)]
pub mod wire;

pub use balancer::{BalanceStrategy, LoadBalancer, ProviderStats};
pub use cache::{CacheConfig, CacheStats, ResponseCache};
pub use config::{Config, ConfigError, CorsConfig};
pub use context::RequestContext;
pub use convert::{
    StreamConverter, chat_to_semantic_response, semantic_to_chat_request,
    semantic_to_chat_response,
};
pub use error::{ErrorDetail, ErrorEnvelope, GatewayError};
pub use fingerprint::{hash_tenant, request_fingerprint};
pub use hooks::{
    AuthDecision, AuthHook, ErrorHook, HookRegistry, RequestHook, StaticKeyAuth, StreamHook,
};
pub use limiter::{LimiterConfig, RateLimiter};
pub use metrics::{GatewayMetrics, Outcome};
pub use pipeline::{Gateway, GatewayBuilder};
pub use provider::{HttpProvider, HttpProviderConfig, ModelRegistry, Provider};
pub use quota::{QuotaConfig, QuotaLedger, QuotaPeriod, TenantUsage};
pub use server::router;
pub use sse::{SseDecoder, SseFrame, SseWriter};
pub use transport::{CallerConfig, HttpCaller, RetryConfig};
pub use wire::{
    Api, ApiSet, BatchedPayload, Dialect, StreamChunk, StreamingResponse, UnifiedRequest,
    UnifiedResponse,
};

#[cfg(any(test, feature = "mock"))]
pub use provider::StaticProvider;
