//! Cached copy of the backend model registry.
//!
//! Eventually consistent: refreshed from `list models` and patched
//! locally after each successful update the console itself issues.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use vigil_core::backend::DetectionBackend;
use vigil_core::error::BackendError;
use vigil_core::types::{ModelConfig, ModelUpdate};

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Arc<RwLock<BTreeMap<String, ModelConfig>>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with a fresh registry listing.
    pub async fn replace(&self, models: Vec<ModelConfig>) {
        let mut guard = self.models.write().await;
        *guard = models.into_iter().map(|m| (m.name.clone(), m)).collect();
    }

    /// Reload from the backend. Returns the number of models known.
    pub async fn refresh(&self, backend: &dyn DetectionBackend) -> Result<usize, BackendError> {
        let models = backend.list_models().await?;
        let count = models.len();
        self.replace(models).await;
        tracing::info!(count, "Model catalog refreshed");
        Ok(count)
    }

    pub async fn get(&self, name: &str) -> Option<ModelConfig> {
        self.models.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<ModelConfig> {
        self.models.read().await.values().cloned().collect()
    }

    /// Label list for `name`; empty if the model is unknown.
    pub async fn labels(&self, name: &str) -> Vec<String> {
        self.models
            .read()
            .await
            .get(name)
            .map(|m| m.labels.clone())
            .unwrap_or_default()
    }

    /// Mirror an acknowledged partial update into the cache.
    pub async fn apply(&self, name: &str, update: &ModelUpdate) {
        let mut guard = self.models.write().await;
        let Some(model) = guard.get_mut(name) else {
            return;
        };
        if let Some(enabled) = update.enabled {
            model.enabled = enabled;
        }
        if let Some(conf) = update.conf {
            model.conf = conf;
        }
        if let Some(iou) = update.iou {
            model.iou = iou;
        }
        if let Some(classes) = &update.enabled_classes {
            model.enabled_classes = classes.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, labels: &[&str]) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            kind: "coco".to_string(),
            enabled: false,
            conf: 0.25,
            iou: 0.45,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            enabled_classes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn labels_of_unknown_model_are_empty() {
        let catalog = ModelCatalog::new();
        catalog.replace(vec![model("m1", &["person", "car"])]).await;
        assert_eq!(catalog.labels("m1").await, vec!["person", "car"]);
        assert!(catalog.labels("nope").await.is_empty());
    }

    #[tokio::test]
    async fn apply_patches_only_set_fields() {
        let catalog = ModelCatalog::new();
        catalog.replace(vec![model("m1", &["person"])]).await;

        catalog.apply("m1", &ModelUpdate::enabled(true)).await;
        catalog.apply("m1", &ModelUpdate::confidence(0.6)).await;
        catalog.apply("ghost", &ModelUpdate::enabled(true)).await;

        let m1 = catalog.get("m1").await.unwrap();
        assert!(m1.enabled);
        assert_eq!(m1.conf, 0.6);
        assert_eq!(m1.iou, 0.45);
        assert!(catalog.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn replace_drops_stale_entries() {
        let catalog = ModelCatalog::new();
        catalog.replace(vec![model("a", &[]), model("b", &[])]).await;
        catalog.replace(vec![model("b", &[])]).await;
        let names: Vec<String> = catalog.list().await.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["b"]);
    }
}
