//! Request fingerprints for cache keying.
//!
//! A fingerprint is a BLAKE3 hash over the fields that determine what the
//! model should produce: tenant, dialect, model, the conversation itself,
//! tools, and the sampling parameters. Transport noise (headers, stream
//! flag, metadata) is deliberately excluded so semantically equivalent
//! requests share a key.

use serde_json::Value;

use crate::wire::{RequestPayload, UnifiedRequest};

/// Computes the cache key for a request, scoped to the tenant.
///
/// Keys are hex-encoded 256-bit BLAKE3 digests; two requests collide only
/// if their canonical field subsets are byte-identical.
pub fn request_fingerprint(tenant: &str, request: &UnifiedRequest) -> String {
    let canonical = canonical_subset(request);
    let mut hasher = blake3::Hasher::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(request.dialect.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Hashes an opaque tenant credential into a stable short id.
pub fn hash_tenant(tenant: &str) -> u64 {
    let hash = blake3::hash(tenant.as_bytes());
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 output is at least 8 bytes");
    u64::from_le_bytes(bytes)
}

fn canonical_subset(request: &UnifiedRequest) -> Value {
    let mut root = serde_json::Map::new();
    root.insert("model".to_string(), Value::String(request.model.clone()));

    match &request.payload {
        RequestPayload::Chat(req) => {
            root.insert(
                "messages".to_string(),
                serde_json::to_value(&req.messages).unwrap_or_else(|_| Value::Array(Vec::new())),
            );
        }
        RequestPayload::Semantic(req) => {
            root.insert(
                "input".to_string(),
                serde_json::to_value(&req.input).unwrap_or(Value::Null),
            );
            if let Some(instructions) = &req.instructions {
                root.insert(
                    "instructions".to_string(),
                    Value::String(instructions.clone()),
                );
            }
        }
        RequestPayload::Embeddings(req) => {
            root.insert("input".to_string(), req.input.clone());
        }
        RequestPayload::Images(req) => {
            root.insert("prompt".to_string(), Value::String(req.prompt.clone()));
        }
        RequestPayload::Models => {}
    }

    if let Some(tools) = &request.tools {
        root.insert(
            "tools".to_string(),
            serde_json::to_value(tools).unwrap_or_else(|_| Value::Array(Vec::new())),
        );
    }
    if let Some(tool_choice) = &request.tool_choice {
        root.insert("tool_choice".to_string(), tool_choice.clone());
    }

    let mut params = serde_json::Map::new();
    if let Some(t) = request.params.temperature {
        params.insert("temperature".to_string(), Value::from(t));
    }
    if let Some(p) = request.params.top_p {
        params.insert("top_p".to_string(), Value::from(p));
    }
    if let Some(m) = request.params.max_tokens {
        params.insert("max_tokens".to_string(), Value::from(m));
    }
    if let Some(stop) = &request.params.stop {
        params.insert(
            "stop".to_string(),
            serde_json::to_value(stop).unwrap_or(Value::Null),
        );
    }
    if !params.is_empty() {
        root.insert("params".to_string(), Value::Object(params));
    }

    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ChatCompletionRequest, UnifiedRequest};

    fn chat_request(model: &str, content: &str, temperature: Option<f64>) -> UnifiedRequest {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": content}],
            "temperature": temperature,
        }))
        .unwrap();
        UnifiedRequest::chat(req)
    }

    #[test]
    fn deterministic_for_equivalent_requests() {
        let a = request_fingerprint("t1", &chat_request("gpt-4", "Hi", Some(0.5)));
        let b = request_fingerprint("t1", &chat_request("gpt-4", "Hi", Some(0.5)));
        assert_eq!(a, b);
    }

    #[test]
    fn sensitive_to_model_content_params_and_tenant() {
        let base = request_fingerprint("t1", &chat_request("gpt-4", "Hi", Some(0.5)));

        assert_ne!(
            base,
            request_fingerprint("t1", &chat_request("gpt-4o", "Hi", Some(0.5)))
        );
        assert_ne!(
            base,
            request_fingerprint("t1", &chat_request("gpt-4", "Hello", Some(0.5)))
        );
        assert_ne!(
            base,
            request_fingerprint("t1", &chat_request("gpt-4", "Hi", Some(0.9)))
        );
        assert_ne!(
            base,
            request_fingerprint("t2", &chat_request("gpt-4", "Hi", Some(0.5)))
        );
    }

    #[test]
    fn insensitive_to_headers_and_stream_flag() {
        let mut with_headers = chat_request("gpt-4", "Hi", None);
        with_headers
            .headers
            .insert("x-trace".to_string(), "abc".to_string());
        let plain = chat_request("gpt-4", "Hi", None);

        assert_eq!(
            request_fingerprint("t1", &with_headers),
            request_fingerprint("t1", &plain)
        );
    }

    #[test]
    fn tenant_hash_is_stable() {
        assert_eq!(hash_tenant("acme"), hash_tenant("acme"));
        assert_ne!(hash_tenant("acme"), hash_tenant("acme2"));
    }
}
