//! Interception points: authentication, request before/after, per-chunk
//! stream rewriting, and error observation.
//!
//! Hooks run in registration order. The tenant id produced by
//! authentication travels in the [`RequestContext`], never through shared
//! mutable state.

pub mod auth;

pub use auth::StaticKeyAuth;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::wire::{BatchedPayload, UnifiedRequest};

/// Outcome of one authentication hook.
#[derive(Debug, Clone, Default)]
pub struct AuthDecision {
    /// Whether the credential was accepted.
    pub allowed: bool,
    /// Tenant identity derived from the credential.
    pub tenant_id: Option<String>,
}

impl AuthDecision {
    /// Accepts the request on behalf of `tenant_id`.
    pub fn allow(tenant_id: impl Into<String>) -> Self {
        Self {
            allowed: true,
            tenant_id: Some(tenant_id.into()),
        }
    }

    /// Accepts the request without naming a tenant.
    pub fn allow_anonymous() -> Self {
        Self {
            allowed: true,
            tenant_id: None,
        }
    }

    /// Rejects the request.
    pub fn deny() -> Self {
        Self::default()
    }
}

/// Validates the presented credential and derives a tenant id.
#[async_trait]
pub trait AuthHook: Send + Sync {
    /// The first hook to deny or error aborts the request with 401.
    async fn authenticate(
        &self,
        ctx: &RequestContext,
        credential: Option<&str>,
    ) -> Result<AuthDecision, GatewayError>;
}

/// Observes and optionally mutates requests and batched responses.
#[async_trait]
pub trait RequestHook: Send + Sync {
    /// Runs before dispatch; may mutate the request or short-circuit.
    async fn before(
        &self,
        _ctx: &RequestContext,
        _request: &mut UnifiedRequest,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Runs after a batched response; may mutate it or short-circuit.
    async fn after(
        &self,
        _ctx: &RequestContext,
        _request: &UnifiedRequest,
        _response: &mut BatchedPayload,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Rewrites outbound stream chunks between the converter and the writer.
#[async_trait]
pub trait StreamHook: Send + Sync {
    /// Receives the serialized chunk payload; an error aborts the stream.
    async fn on_chunk(&self, ctx: &RequestContext, chunk: Bytes) -> Result<Bytes, GatewayError>;
}

/// Observes pipeline failures; cannot affect the outcome.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn on_error(&self, ctx: &RequestContext, error: &GatewayError);
}

/// Ordered hook registry shared by every request.
#[derive(Clone, Default)]
pub struct HookRegistry {
    auth: Vec<Arc<dyn AuthHook>>,
    request: Vec<Arc<dyn RequestHook>>,
    stream: Vec<Arc<dyn StreamHook>>,
    error: Vec<Arc<dyn ErrorHook>>,
}

impl HookRegistry {
    /// An empty registry: anonymous auth, no interception.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an authentication hook.
    pub fn register_auth(&mut self, hook: Arc<dyn AuthHook>) {
        self.auth.push(hook);
    }

    /// Appends a request hook.
    pub fn register_request(&mut self, hook: Arc<dyn RequestHook>) {
        self.request.push(hook);
    }

    /// Appends a streaming hook.
    pub fn register_stream(&mut self, hook: Arc<dyn StreamHook>) {
        self.stream.push(hook);
    }

    /// Appends an error hook.
    pub fn register_error(&mut self, hook: Arc<dyn ErrorHook>) {
        self.error.push(hook);
    }

    /// Whether any stream hooks are registered.
    pub fn has_stream_hooks(&self) -> bool {
        !self.stream.is_empty()
    }

    /// Runs the auth chain. The first hook to deny or error aborts; the
    /// first tenant id produced wins. With no hooks registered every
    /// request passes anonymously.
    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        credential: Option<&str>,
    ) -> Result<Option<String>, GatewayError> {
        let mut tenant: Option<String> = None;
        for hook in &self.auth {
            let decision = hook.authenticate(ctx, credential).await.map_err(|e| match e {
                already @ GatewayError::Authentication(_) => already,
                other => GatewayError::Authentication(other.to_string()),
            })?;
            if !decision.allowed {
                return Err(GatewayError::Authentication(
                    "credential rejected".to_string(),
                ));
            }
            if tenant.is_none() {
                tenant = decision.tenant_id;
            }
        }
        Ok(tenant)
    }

    /// Runs every `before` hook in order.
    pub async fn run_before(
        &self,
        ctx: &RequestContext,
        request: &mut UnifiedRequest,
    ) -> Result<(), GatewayError> {
        for hook in &self.request {
            hook.before(ctx, request).await?;
        }
        Ok(())
    }

    /// Runs every `after` hook in order.
    pub async fn run_after(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
        response: &mut BatchedPayload,
    ) -> Result<(), GatewayError> {
        for hook in &self.request {
            hook.after(ctx, request, response).await?;
        }
        Ok(())
    }

    /// Threads a chunk payload through every stream hook in order.
    pub async fn apply_chunk(
        &self,
        ctx: &RequestContext,
        mut chunk: Bytes,
    ) -> Result<Bytes, GatewayError> {
        for hook in &self.stream {
            chunk = hook.on_chunk(ctx, chunk).await?;
        }
        Ok(chunk)
    }

    /// Notifies every error hook; failures here are ignored by design of
    /// the observe-only contract.
    pub async fn notify_error(&self, ctx: &RequestContext, error: &GatewayError) {
        for hook in &self.error {
            hook.on_error(ctx, error).await;
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("auth", &self.auth.len())
            .field("request", &self.request.len())
            .field("stream", &self.stream.len())
            .field("error", &self.error.len())
            .finish()
    }
}
