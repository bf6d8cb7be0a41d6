//! Request instrumentation exposed on `GET /metrics`.

use parking_lot::Mutex;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::wire::Dialect;

/// How a request ended, as a metrics label.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, EncodeLabelValue)]
#[allow(missing_docs)]
pub enum Outcome {
    Ok,
    ClientError,
    Unauthorized,
    RateLimited,
    UpstreamError,
    Cancelled,
    InternalError,
}

/// Labels on the request counter.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Dialect name (`chat`, `semantic`, ...).
    pub dialect: String,
    /// Terminal outcome.
    pub outcome: Outcome,
}

/// Labels on the cache counter.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CacheLabels {
    /// `hit` or `miss`.
    pub event: String,
}

/// Prometheus registry plus the gateway's metric families.
pub struct GatewayMetrics {
    registry: Mutex<Registry>,
    requests: Family<RequestLabels, Counter>,
    cache_events: Family<CacheLabels, Counter>,
    active_streams: Gauge,
}

impl GatewayMetrics {
    /// Creates the registry under the given namespace prefix.
    pub fn new(namespace: &str) -> Self {
        let mut registry = Registry::with_prefix(namespace);

        let requests = Family::<RequestLabels, Counter>::default();
        registry.register(
            "requests",
            "Requests handled, by dialect and outcome",
            requests.clone(),
        );

        let cache_events = Family::<CacheLabels, Counter>::default();
        registry.register(
            "cache_lookups",
            "Response cache lookups, by hit or miss",
            cache_events.clone(),
        );

        let active_streams = Gauge::default();
        registry.register(
            "active_streams",
            "Streaming responses currently open",
            active_streams.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            requests,
            cache_events,
            active_streams,
        }
    }

    /// Counts one finished request.
    pub fn record_request(&self, dialect: Dialect, outcome: Outcome) {
        self.requests
            .get_or_create(&RequestLabels {
                dialect: dialect.as_str().to_string(),
                outcome,
            })
            .inc();
    }

    /// Counts a cache hit.
    pub fn cache_hit(&self) {
        self.cache_events
            .get_or_create(&CacheLabels {
                event: "hit".to_string(),
            })
            .inc();
    }

    /// Counts a cache miss.
    pub fn cache_miss(&self) {
        self.cache_events
            .get_or_create(&CacheLabels {
                event: "miss".to_string(),
            })
            .inc();
    }

    /// Marks a stream opened.
    pub fn stream_opened(&self) {
        self.active_streams.inc();
    }

    /// Marks a stream closed.
    pub fn stream_closed(&self) {
        self.active_streams.dec();
    }

    /// Renders the exposition-format text for `/metrics`.
    pub fn encode(&self) -> String {
        let registry = self.registry.lock();
        let mut out = String::new();
        // Encoding only fails on fmt::Write errors, which String never has.
        let _ = prometheus_client::encoding::text::encode(&mut out, &registry);
        out
    }
}

impl std::fmt::Debug for GatewayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition_text() {
        let metrics = GatewayMetrics::new("crossbar");
        metrics.record_request(Dialect::Chat, Outcome::Ok);
        metrics.record_request(Dialect::Chat, Outcome::Ok);
        metrics.cache_hit();
        metrics.stream_opened();

        let text = metrics.encode();
        assert!(text.contains("crossbar_requests_total"));
        assert!(text.contains("dialect=\"chat\""));
        assert!(text.contains("crossbar_cache_lookups_total"));
        assert!(text.contains("crossbar_active_streams"));
    }
}
