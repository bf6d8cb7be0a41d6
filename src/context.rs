//! Request-scoped context threaded through hooks and the pipeline.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Per-request state shared by every pipeline stage and hook.
///
/// The context owns the request's cancellation token: cancelling it stops
/// upstream sends, unwinds streaming producer tasks at their next suspension
/// point, and suppresses quota recording for the interrupted call. One
/// context is created at HTTP ingress and dropped when the request closes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    request_id: String,
    credential: Option<String>,
    tenant_id: RwLock<Option<String>>,
    cancel: CancellationToken,
    received_at: Instant,
}

impl RequestContext {
    /// Creates a context for a new inbound request.
    ///
    /// `credential` is the bearer token presented by the client, if any.
    pub fn new(credential: Option<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id: uuid::Uuid::new_v4().to_string(),
                credential,
                tenant_id: RwLock::new(None),
                cancel: CancellationToken::new(),
                received_at: Instant::now(),
            }),
        }
    }

    /// Opaque id assigned to this request, echoed as `x-request-id`.
    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// The credential presented by the client, if any.
    pub fn credential(&self) -> Option<&str> {
        self.inner.credential.as_deref()
    }

    /// Tenant id produced by authentication, once set.
    pub fn tenant_id(&self) -> Option<String> {
        self.inner.tenant_id.read().clone()
    }

    /// Records the tenant id produced by an authentication hook.
    pub fn set_tenant_id(&self, tenant: impl Into<String>) {
        *self.inner.tenant_id.write() = Some(tenant.into());
    }

    /// Tenant id, or `"anonymous"` when authentication produced none.
    ///
    /// Used as the key for rate limiting, quota recording, and cache scoping.
    pub fn tenant_key(&self) -> String {
        self.tenant_id().unwrap_or_else(|| "anonymous".to_string())
    }

    /// The request's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Cancels the request: client disconnect, timeout, or explicit abort.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Wall-clock age of the request.
    pub fn elapsed(&self) -> std::time::Duration {
        self.inner.received_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}
