//! CORS layer construction from the typed config.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;

/// Builds the CORS layer for the router. Invalid entries are skipped with a
/// warning rather than failing startup; a wildcard origin disables
/// credentials because the combination is rejected by browsers.
pub fn layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    if config.allows_any_origin() {
        if config.allow_credentials {
            warn!("ignoring allow_credentials: incompatible with a wildcard origin");
        }
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "skipping invalid CORS origin");
                    None
                }
            })
            .collect();
        layer = layer.allow_origin(AllowOrigin::list(origins));
        if config.allow_credentials {
            layer = layer.allow_credentials(true);
        }
    }

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|method| method.parse().ok())
        .collect();
    layer = layer.allow_methods(methods);

    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|header| header.parse().ok())
        .collect();
    layer = layer.allow_headers(headers);

    if !config.exposed_headers.is_empty() {
        let exposed: Vec<HeaderName> = config
            .exposed_headers
            .iter()
            .filter_map(|header| header.parse().ok())
            .collect();
        layer = layer.expose_headers(exposed);
    }

    if let Some(max_age) = config.max_age {
        layer = layer.max_age(max_age);
    }

    layer
}
