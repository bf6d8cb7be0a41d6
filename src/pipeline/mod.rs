//! Request pipeline: binds hooks, admission controls, cache, registry, and
//! providers for each request, and owns streaming lifetimes.
//!
//! Per-request flow: authenticate → rate-limit → quota → before-hooks →
//! cache lookup → model resolve → dispatch → (stream adaptation | after-
//! hooks + usage recording). Failures at any stage notify the error hooks
//! once and map to the wire envelope at the HTTP layer.

pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::balancer::{DEFAULT_HEALTH_CHECK_INTERVAL, LoadBalancer};
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::CorsConfig;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::fingerprint::request_fingerprint;
use crate::hooks::{AuthHook, ErrorHook, HookRegistry, RequestHook, StreamHook};
use crate::limiter::{LimiterConfig, RateLimiter};
use crate::metrics::{GatewayMetrics, Outcome};
use crate::provider::{ModelRegistry, Provider};
use crate::quota::{QuotaConfig, QuotaLedger};
use crate::wire::{BatchedPayload, Dialect, UnifiedRequest, UnifiedResponse};

/// Typed options API for assembling a [`Gateway`].
pub struct GatewayBuilder {
    registry: ModelRegistry,
    hooks: HookRegistry,
    cache: CacheConfig,
    limiter: LimiterConfig,
    quota: QuotaConfig,
    cors: CorsConfig,
    metrics_namespace: String,
    balancers: Vec<Arc<LoadBalancer>>,
    health_check_interval: Duration,
}

impl GatewayBuilder {
    fn new() -> Self {
        Self {
            registry: ModelRegistry::new(),
            hooks: HookRegistry::new(),
            cache: CacheConfig::default(),
            limiter: LimiterConfig::default(),
            quota: QuotaConfig::default(),
            cors: CorsConfig::default(),
            metrics_namespace: "crossbar".to_string(),
            balancers: Vec::new(),
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }

    /// Routes a model id to a provider.
    pub fn model(self, id: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.registry.register(id, provider);
        self
    }

    /// Routes a model id to a provider with explicit listing metadata.
    pub fn model_with(
        self,
        id: impl Into<String>,
        provider: Arc<dyn Provider>,
        created: i64,
        owned_by: impl Into<String>,
    ) -> Self {
        self.registry.register_with(id, provider, created, owned_by);
        self
    }

    /// Tracks a balancer for lifecycle management (health scanner start on
    /// [`Gateway::start_maintenance`], stop on [`Gateway::close`]). Route
    /// models to it with [`GatewayBuilder::model`].
    pub fn balancer(mut self, balancer: Arc<LoadBalancer>) -> Self {
        self.balancers.push(balancer);
        self
    }

    /// Appends an authentication hook.
    pub fn auth_hook(mut self, hook: Arc<dyn AuthHook>) -> Self {
        self.hooks.register_auth(hook);
        self
    }

    /// Appends a request hook.
    pub fn request_hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.hooks.register_request(hook);
        self
    }

    /// Appends a streaming hook.
    pub fn stream_hook(mut self, hook: Arc<dyn StreamHook>) -> Self {
        self.hooks.register_stream(hook);
        self
    }

    /// Appends an error hook.
    pub fn error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.hooks.register_error(hook);
        self
    }

    /// Response-cache settings.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Rate-limiter settings.
    pub fn limiter(mut self, config: LimiterConfig) -> Self {
        self.limiter = config;
        self
    }

    /// Quota-ledger settings.
    pub fn quota(mut self, config: QuotaConfig) -> Self {
        self.quota = config;
        self
    }

    /// CORS policy for the HTTP surface.
    pub fn cors(mut self, config: CorsConfig) -> Self {
        self.cors = config;
        self
    }

    /// Prefix for exported metric names.
    pub fn metrics_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metrics_namespace = namespace.into();
        self
    }

    /// Interval between balancer health recomputations.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Assembles the gateway. Call [`Gateway::start_maintenance`] from
    /// within a runtime to start background upkeep tasks.
    pub fn build(self) -> Arc<Gateway> {
        Arc::new(Gateway {
            registry: self.registry,
            hooks: self.hooks,
            cache: ResponseCache::new(self.cache),
            limiter: Arc::new(RateLimiter::new(self.limiter)),
            quota: Arc::new(QuotaLedger::new(self.quota)),
            metrics: Arc::new(GatewayMetrics::new(&self.metrics_namespace)),
            cors: self.cors,
            balancers: self.balancers,
            health_check_interval: self.health_check_interval,
        })
    }
}

/// The assembled gateway: every collaborator the pipeline needs, shared
/// across requests.
pub struct Gateway {
    registry: ModelRegistry,
    hooks: HookRegistry,
    cache: ResponseCache,
    limiter: Arc<RateLimiter>,
    quota: Arc<QuotaLedger>,
    metrics: Arc<GatewayMetrics>,
    cors: CorsConfig,
    balancers: Vec<Arc<LoadBalancer>>,
    health_check_interval: Duration,
}

impl Gateway {
    /// Starts building a gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The hook registry.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The quota ledger.
    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    /// Request metrics.
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// The configured CORS policy.
    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }

    /// Spawns background upkeep: limiter bucket compaction and balancer
    /// health scanners. Requires a running runtime.
    pub fn start_maintenance(&self) {
        self.limiter.clone().start_compaction();
        for balancer in &self.balancers {
            balancer.clone().start_health_scanner(self.health_check_interval);
        }
    }

    /// Stops background tasks. Idempotent.
    pub fn close(&self) {
        for balancer in &self.balancers {
            balancer.close();
        }
        self.limiter.close();
    }

    /// Runs the authentication chain and stamps the tenant id on `ctx`.
    pub async fn authorize(&self, ctx: &RequestContext) -> Result<(), GatewayError> {
        match self.hooks.authenticate(ctx, ctx.credential()).await {
            Ok(tenant) => {
                if let Some(tenant) = tenant {
                    ctx.set_tenant_id(tenant);
                }
                Ok(())
            }
            Err(error) => {
                self.hooks.notify_error(ctx, &error).await;
                self.metrics
                    .record_request(Dialect::Models, Outcome::Unauthorized);
                Err(error)
            }
        }
    }

    /// Runs one request through the full pipeline.
    #[instrument(
        skip(self, ctx, request),
        fields(
            request_id = %ctx.request_id(),
            dialect = request.dialect.as_str(),
            model = %request.model,
            streaming = request.streaming,
        )
    )]
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        request: UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        let dialect = request.dialect;
        match self.run(ctx, request).await {
            Ok(response) => {
                self.metrics.record_request(dialect, Outcome::Ok);
                Ok(response)
            }
            Err(error) => {
                self.hooks.notify_error(ctx, &error).await;
                self.metrics.record_request(dialect, outcome_of(&error));
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        mut request: UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        // Authenticated
        let tenant = self.hooks.authenticate(ctx, ctx.credential()).await?;
        if let Some(tenant) = tenant {
            ctx.set_tenant_id(tenant);
        }
        let tenant_key = ctx.tenant_key();

        // Admitted
        if !self.limiter.allow(&tenant_key) {
            return Err(GatewayError::RateLimited(format!(
                "rate limit exceeded for {tenant_key}"
            )));
        }
        if !self.quota.check(&tenant_key) {
            return Err(GatewayError::QuotaExceeded(format!(
                "quota exhausted for {tenant_key}"
            )));
        }

        self.hooks.run_before(ctx, &mut request).await?;

        // Cache lookup covers batched language responses only.
        let cache_key = self
            .cacheable(&request)
            .then(|| request_fingerprint(&tenant_key, &request));
        if let Some(key) = &cache_key {
            if let Some(bytes) = self.cache.get(key) {
                if let Some(mut payload) = decode_cached(request.dialect, &bytes) {
                    debug!(key = %key, "serving response from cache");
                    self.metrics.cache_hit();
                    self.hooks.run_after(ctx, &request, &mut payload).await?;
                    return Ok(UnifiedResponse::Batched(payload));
                }
                warn!(key = %key, "evicting undecodable cache entry");
            }
            self.metrics.cache_miss();
        }

        // Resolved
        let provider = self
            .registry
            .resolve(&request.model)
            .ok_or_else(|| GatewayError::NotFound(request.model.clone()))?;

        if ctx.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        // Dispatched
        let response = provider.send_request(ctx, &request).await?;

        match response {
            UnifiedResponse::Batched(mut payload) => {
                if let Some(key) = &cache_key {
                    if let Some(bytes) = encode_cached(&payload) {
                        self.cache.set(key, bytes);
                    }
                }
                self.hooks.run_after(ctx, &request, &mut payload).await?;
                if let Some((input, output, total)) = payload.usage_tokens() {
                    self.quota.record(&tenant_key, input, output, total);
                }
                Ok(UnifiedResponse::Batched(payload))
            }
            UnifiedResponse::Streaming(upstream) => {
                self.metrics.stream_opened();
                let adapted = stream::adapt_stream(stream::StreamContext {
                    ctx: ctx.clone(),
                    dialect: request.dialect,
                    model: request.model.clone(),
                    hooks: self.hooks.clone(),
                    quota: self.quota.clone(),
                    metrics: self.metrics.clone(),
                    upstream,
                });
                Ok(UnifiedResponse::Streaming(adapted))
            }
        }
    }

    fn cacheable(&self, request: &UnifiedRequest) -> bool {
        self.cache.is_enabled()
            && !request.streaming
            && matches!(request.dialect, Dialect::Chat | Dialect::Semantic)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .field("balancers", &self.balancers.len())
            .finish_non_exhaustive()
    }
}

fn outcome_of(error: &GatewayError) -> Outcome {
    match error {
        GatewayError::InvalidRequest { .. } | GatewayError::NotFound(_) => Outcome::ClientError,
        GatewayError::Authentication(_) => Outcome::Unauthorized,
        GatewayError::RateLimited(_) | GatewayError::QuotaExceeded(_) => Outcome::RateLimited,
        GatewayError::UpstreamUnavailable(_) | GatewayError::Upstream { .. } => {
            Outcome::UpstreamError
        }
        GatewayError::Cancelled => Outcome::Cancelled,
        GatewayError::Internal(_) => Outcome::InternalError,
    }
}

fn decode_cached(dialect: Dialect, bytes: &Bytes) -> Option<BatchedPayload> {
    match dialect {
        Dialect::Chat => serde_json::from_slice(bytes).ok().map(BatchedPayload::Chat),
        Dialect::Semantic => serde_json::from_slice(bytes)
            .ok()
            .map(BatchedPayload::Semantic),
        _ => None,
    }
}

fn encode_cached(payload: &BatchedPayload) -> Option<Bytes> {
    let bytes = match payload {
        BatchedPayload::Chat(resp) => serde_json::to_vec(resp).ok()?,
        BatchedPayload::Semantic(resp) => serde_json::to_vec(resp).ok()?,
        _ => return None,
    };
    Some(Bytes::from(bytes))
}
