//! Model registry: model id → provider plus listing metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::provider::Provider;
use crate::wire::{Model, ModelList};

/// One registered model.
#[derive(Clone)]
pub struct ModelEntry {
    pub provider: Arc<dyn Provider>,
    pub created: i64,
    pub owned_by: String,
}

/// Thread-safe model id → provider map backing `/v1/models` and model
/// resolution in the pipeline.
pub struct ModelRegistry {
    entries: RwLock<HashMap<String, ModelEntry>>,
    /// `created` stamped on models registered without explicit metadata.
    default_created: i64,
}

impl ModelRegistry {
    /// Creates an empty registry; models registered without metadata report
    /// the registry's creation time.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_created: chrono::Utc::now().timestamp(),
        }
    }

    /// Registers (or replaces) a model with default metadata.
    pub fn register(&self, model: impl Into<String>, provider: Arc<dyn Provider>) {
        let owned_by = provider.name().to_string();
        self.register_with(model, provider, self.default_created, owned_by);
    }

    /// Registers (or replaces) a model with explicit listing metadata.
    pub fn register_with(
        &self,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
        created: i64,
        owned_by: impl Into<String>,
    ) {
        self.entries.write().insert(
            model.into(),
            ModelEntry {
                provider,
                created,
                owned_by: owned_by.into(),
            },
        );
    }

    /// Resolves a model id to its provider.
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn Provider>> {
        self.entries.read().get(model).map(|e| e.provider.clone())
    }

    /// Whether a model id is registered.
    pub fn contains(&self, model: &str) -> bool {
        self.entries.read().contains_key(model)
    }

    /// The `/v1/models` listing, sorted lexicographically by id.
    pub fn list(&self) -> ModelList {
        let entries = self.entries.read();
        let mut data: Vec<Model> = entries
            .iter()
            .map(|(id, entry)| Model {
                id: id.clone(),
                object: "model".to_string(),
                created: entry.created,
                owned_by: entry.owned_by.clone(),
            })
            .collect();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        ModelList {
            object: "list".to_string(),
            data,
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.entries.read().len())
            .finish()
    }
}
