//! Ready-made authentication hook: a static API-key table.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::hooks::{AuthDecision, AuthHook};

/// Maps bearer API keys to tenant ids.
///
/// The simplest useful gate: keys are configured up front, every request
/// must present one, and the matching tenant id drives rate limiting,
/// quotas, and cache scoping downstream.
#[derive(Debug, Default)]
pub struct StaticKeyAuth {
    keys: HashMap<String, String>,
}

impl StaticKeyAuth {
    /// An empty table; add keys with [`StaticKeyAuth::with_key`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one `key → tenant` mapping.
    pub fn with_key(mut self, key: impl Into<String>, tenant: impl Into<String>) -> Self {
        self.keys.insert(key.into(), tenant.into());
        self
    }

    /// Builds the table from `key=tenant` pairs (e.g. a comma-split
    /// environment variable). Entries without `=` use the key itself as
    /// the tenant id.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut auth = Self::new();
        for pair in pairs {
            let pair = pair.as_ref().trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, tenant)) => {
                    auth.keys.insert(key.trim().to_string(), tenant.trim().to_string());
                }
                None => {
                    auth.keys.insert(pair.to_string(), pair.to_string());
                }
            }
        }
        auth
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl AuthHook for StaticKeyAuth {
    async fn authenticate(
        &self,
        _ctx: &RequestContext,
        credential: Option<&str>,
    ) -> Result<AuthDecision, GatewayError> {
        let Some(key) = credential else {
            return Ok(AuthDecision::deny());
        };
        match self.keys.get(key) {
            Some(tenant) => Ok(AuthDecision::allow(tenant.clone())),
            None => Ok(AuthDecision::deny()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_key_yields_its_tenant() {
        let auth = StaticKeyAuth::new().with_key("sk-a", "acme");
        let ctx = RequestContext::new(Some("sk-a".into()));

        let decision = auth.authenticate(&ctx, Some("sk-a")).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.tenant_id.as_deref(), Some("acme"));

        let decision = auth.authenticate(&ctx, Some("sk-b")).await.unwrap();
        assert!(!decision.allowed);

        let decision = auth.authenticate(&ctx, None).await.unwrap();
        assert!(!decision.allowed);
    }

    #[test]
    fn pairs_parse_with_and_without_tenant() {
        let auth = StaticKeyAuth::from_pairs(["sk-a=acme", " sk-b ", ""]);
        assert_eq!(auth.len(), 2);
        assert_eq!(auth.keys.get("sk-a").map(String::as_str), Some("acme"));
        assert_eq!(auth.keys.get("sk-b").map(String::as_str), Some("sk-b"));
    }
}
