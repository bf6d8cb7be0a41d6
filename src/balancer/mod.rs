//! Load balancer: wraps N providers under one provider capability and
//! selects a live child per call.
//!
//! Health is passive: a child accumulating more than
//! [`UNHEALTHY_ERROR_THRESHOLD`] errors is taken out of rotation
//! immediately, and a background scanner periodically recomputes health
//! from the observed error rate, readmitting children that recovered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::provider::Provider;
use crate::wire::{ApiSet, UnifiedRequest, UnifiedResponse};

/// Cumulative errors after which a child is marked unhealthy on the spot.
pub const UNHEALTHY_ERROR_THRESHOLD: u64 = 10;

/// Error rate at or above which the scanner keeps a child out of rotation.
pub const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Default interval between health recomputations.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Child selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceStrategy {
    #[default]
    RoundRobin,
    Random,
    WeightedRandom,
    LeastConnections,
}

impl BalanceStrategy {
    /// Parses the configuration spelling of a strategy.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "round_robin" => Some(Self::RoundRobin),
            "random" => Some(Self::Random),
            "weighted_random" => Some(Self::WeightedRandom),
            "least_connections" => Some(Self::LeastConnections),
            _ => None,
        }
    }
}

/// Point-in-time counters for one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStats {
    pub active_requests: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub healthy: bool,
}

struct Child {
    provider: Arc<dyn Provider>,
    weight: u32,
    active: AtomicU64,
    total: AtomicU64,
    errors: AtomicU64,
    healthy: AtomicBool,
}

impl Child {
    fn stats(&self) -> ProviderStats {
        ProviderStats {
            active_requests: self.active.load(Ordering::Relaxed),
            total_requests: self.total.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            healthy: self.healthy.load(Ordering::Relaxed),
        }
    }
}

/// A provider that fans one logical upstream out over several children.
pub struct LoadBalancer {
    name: String,
    strategy: BalanceStrategy,
    children: Vec<Arc<Child>>,
    apis: ApiSet,
    cursor: AtomicU64,
    shutdown: CancellationToken,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancer {
    /// Builds a balancer over `(provider, weight)` children. Weights below
    /// one are clamped to one; the advertised API set is the intersection
    /// of every child's.
    pub fn new(
        name: impl Into<String>,
        strategy: BalanceStrategy,
        providers: Vec<(Arc<dyn Provider>, u32)>,
    ) -> Arc<Self> {
        let children: Vec<Arc<Child>> = providers
            .into_iter()
            .map(|(provider, weight)| {
                Arc::new(Child {
                    provider,
                    weight: weight.max(1),
                    active: AtomicU64::new(0),
                    total: AtomicU64::new(0),
                    errors: AtomicU64::new(0),
                    healthy: AtomicBool::new(true),
                })
            })
            .collect();
        let apis = children
            .iter()
            .map(|c| c.provider.supported_apis())
            .reduce(|a, b| a.intersect(b))
            .unwrap_or_default();

        Arc::new(Self {
            name: name.into(),
            strategy,
            children,
            apis,
            cursor: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            scanner: Mutex::new(None),
        })
    }

    /// Spawns the periodic health scanner. Stopped by [`LoadBalancer::close`].
    pub fn start_health_scanner(self: Arc<Self>, interval: Duration) {
        let shutdown = self.shutdown.clone();
        let balancer = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => balancer.recompute_health(),
                }
            }
        });
        *self.scanner.lock() = Some(handle);
    }

    /// Recomputes per-child health from the observed error rate.
    pub fn recompute_health(&self) {
        for child in &self.children {
            let total = child.total.load(Ordering::Relaxed);
            if total == 0 {
                continue;
            }
            let errors = child.errors.load(Ordering::Relaxed);
            let rate = errors as f64 / total as f64;
            let healthy = rate < UNHEALTHY_ERROR_RATE;
            let was = child.healthy.swap(healthy, Ordering::Relaxed);
            if was != healthy {
                info!(
                    provider = child.provider.name(),
                    error_rate = rate,
                    healthy,
                    "provider health changed"
                );
            }
        }
    }

    /// Statistics per child, in registration order.
    pub fn stats(&self) -> Vec<(String, ProviderStats)> {
        self.children
            .iter()
            .map(|c| (c.provider.name().to_string(), c.stats()))
            .collect()
    }

    /// Stops the health scanner. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.scanner.lock().take() {
            handle.abort();
        }
    }

    fn pick(&self) -> Option<Arc<Child>> {
        let healthy: Vec<&Arc<Child>> = self
            .children
            .iter()
            .filter(|c| c.healthy.load(Ordering::Relaxed))
            .collect();
        if healthy.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            BalanceStrategy::RoundRobin => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
                healthy[index % healthy.len()]
            }
            BalanceStrategy::Random => {
                let index = rand::rng().random_range(0..healthy.len());
                healthy[index]
            }
            BalanceStrategy::WeightedRandom => {
                let total: u64 = healthy.iter().map(|c| u64::from(c.weight)).sum();
                let mut point = rand::rng().random_range(0..total);
                let mut selected = healthy[healthy.len() - 1];
                for &child in &healthy {
                    let weight = u64::from(child.weight);
                    if point < weight {
                        selected = child;
                        break;
                    }
                    point -= weight;
                }
                selected
            }
            // Ties break toward the earliest-registered child.
            BalanceStrategy::LeastConnections => {
                let mut selected = healthy[0];
                let mut least = selected.active.load(Ordering::Relaxed);
                for &child in &healthy[1..] {
                    let active = child.active.load(Ordering::Relaxed);
                    if active < least {
                        selected = child;
                        least = active;
                    }
                }
                selected
            }
        };
        Some(Arc::clone(chosen))
    }
}

#[async_trait]
impl Provider for LoadBalancer {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_apis(&self) -> ApiSet {
        self.apis
    }

    async fn send_request(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        let Some(child) = self.pick() else {
            warn!(balancer = %self.name, "no healthy providers available");
            return Err(GatewayError::UpstreamUnavailable(format!(
                "balancer {} has no healthy providers",
                self.name
            )));
        };

        child.active.fetch_add(1, Ordering::Relaxed);
        child.total.fetch_add(1, Ordering::Relaxed);
        debug!(
            balancer = %self.name,
            provider = child.provider.name(),
            "dispatching to child provider"
        );

        let result = child.provider.send_request(ctx, request).await;

        // Counters never go negative: the decrement pairs with the
        // increment above and saturates defensively anyway.
        let _ = child
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });

        if result.is_err() {
            let errors = child.errors.fetch_add(1, Ordering::Relaxed) + 1;
            if errors > UNHEALTHY_ERROR_THRESHOLD {
                child.healthy.store(false, Ordering::Relaxed);
            }
        }
        result
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("children", &self.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::provider::StaticProvider;
    use crate::wire::{ChatCompletionRequest, UnifiedRequest};

    fn chat_request() -> UnifiedRequest {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        UnifiedRequest::chat(req)
    }

    fn ok_provider(name: &str) -> Arc<dyn Provider> {
        let response = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop"
            }]
        }))
        .unwrap();
        Arc::new(StaticProvider::new(name).with_chat_response(response))
    }

    fn failing_provider(name: &str) -> Arc<dyn Provider> {
        Arc::new(StaticProvider::new(name).failing(GatewayError::Upstream {
            status: Some(500),
            message: "down".into(),
        }))
    }

    #[tokio::test]
    async fn round_robin_is_uniform_over_healthy_children() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::RoundRobin,
            vec![(ok_provider("a"), 1), (ok_provider("b"), 1), (ok_provider("c"), 1)],
        );
        let ctx = RequestContext::new(None);
        let request = chat_request();

        for _ in 0..12 {
            balancer.send_request(&ctx, &request).await.unwrap();
        }
        for (_, stats) in balancer.stats() {
            assert_eq!(stats.total_requests, 4);
            assert_eq!(stats.active_requests, 0);
            assert_eq!(stats.total_errors, 0);
            assert!(stats.healthy);
        }
    }

    #[tokio::test]
    async fn erroring_child_is_ejected_and_traffic_reroutes() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::RoundRobin,
            vec![(failing_provider("bad"), 1), (ok_provider("good"), 1)],
        );
        let ctx = RequestContext::new(None);
        let request = chat_request();

        // Drive the failing child past the error threshold.
        for _ in 0..30 {
            let _ = balancer.send_request(&ctx, &request).await;
        }
        let stats = balancer.stats();
        let bad = &stats[0].1;
        assert!(bad.total_errors > UNHEALTHY_ERROR_THRESHOLD);
        assert!(!bad.healthy);

        // All further traffic lands on the healthy child.
        let before = stats[1].1.total_requests;
        for _ in 0..10 {
            balancer.send_request(&ctx, &request).await.unwrap();
        }
        let after = balancer.stats()[1].1.total_requests;
        assert_eq!(after - before, 10);
    }

    #[tokio::test]
    async fn scanner_readmits_recovered_children() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::RoundRobin,
            vec![(ok_provider("a"), 1)],
        );
        let child = &balancer.children[0];
        // Simulate a past outage that tripped the passive threshold but has
        // since amortized below the ejection rate.
        child.total.store(100, Ordering::Relaxed);
        child.errors.store(11, Ordering::Relaxed);
        child.healthy.store(false, Ordering::Relaxed);

        balancer.recompute_health();
        assert!(child.healthy.load(Ordering::Relaxed));

        // And the reverse: a majority-error child stays out.
        child.errors.store(60, Ordering::Relaxed);
        balancer.recompute_health();
        assert!(!child.healthy.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn no_healthy_children_fails_with_unavailable() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::Random,
            vec![(ok_provider("a"), 1)],
        );
        balancer.children[0].healthy.store(false, Ordering::Relaxed);

        let ctx = RequestContext::new(None);
        let err = balancer.send_request(&ctx, &chat_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn weighted_random_respects_weights() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::WeightedRandom,
            vec![(ok_provider("heavy"), 9), (ok_provider("light"), 1)],
        );
        let ctx = RequestContext::new(None);
        let request = chat_request();

        for _ in 0..200 {
            balancer.send_request(&ctx, &request).await.unwrap();
        }
        let stats = balancer.stats();
        let heavy = stats[0].1.total_requests;
        let light = stats[1].1.total_requests;
        assert_eq!(heavy + light, 200);
        // With 9:1 weights the light child getting the majority would mean
        // the weighting is inverted; leave generous slack for randomness.
        assert!(heavy > light, "heavy={heavy} light={light}");
    }

    #[tokio::test]
    async fn least_connections_prefers_idle_children() {
        let balancer = LoadBalancer::new(
            "lb",
            BalanceStrategy::LeastConnections,
            vec![(ok_provider("a"), 1), (ok_provider("b"), 1)],
        );
        // Pin one in-flight request on `a`.
        balancer.children[0].active.store(5, Ordering::Relaxed);

        let ctx = RequestContext::new(None);
        for _ in 0..4 {
            balancer.send_request(&ctx, &chat_request()).await.unwrap();
        }
        assert_eq!(balancer.stats()[1].1.total_requests, 4);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let balancer = LoadBalancer::new("lb", BalanceStrategy::RoundRobin, vec![]);
        balancer.clone().start_health_scanner(Duration::from_millis(10));
        balancer.close();
        balancer.close();
    }
}
