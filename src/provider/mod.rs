//! Provider capability: anything that accepts a unified request and returns
//! a unified response, batched or streamed.

pub mod http;
pub mod registry;

#[cfg(any(test, feature = "mock"))]
pub mod stub;

pub use http::{HttpProvider, HttpProviderConfig};
pub use registry::{ModelEntry, ModelRegistry};

#[cfg(any(test, feature = "mock"))]
pub use stub::StaticProvider;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::wire::{ApiSet, UnifiedRequest, UnifiedResponse};

/// Uniform upstream capability.
///
/// Implementations must be internally synchronized; the pipeline shares one
/// instance across all requests routed to it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in logs and balancer statistics.
    fn name(&self) -> &str;

    /// The APIs this provider can serve natively.
    fn supported_apis(&self) -> ApiSet;

    /// Executes one request. For streaming requests the returned response
    /// carries a live chunk channel; the producer must honor the context's
    /// cancellation token and close the upstream body on every exit path.
    async fn send_request(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError>;
}
