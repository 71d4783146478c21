//! Read-only lookups consumed by the engine
//!
//! Page models define how many frames a page has; the widget type registry
//! says whether a type is stateless, what its default configuration is, and
//! whether its placements are locked. Both are owned elsewhere; the engine only
//! reads them. In-memory registries are provided for embedding and tests.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Frame-count schema of page models
pub trait PageModelLookup: Send + Sync {
    /// Number of frames of `model_code`, `None` if the model is unknown
    fn frame_count(&self, model_code: &str) -> Option<usize>;
}

/// What the engine needs to know about a widget type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetTypeInfo {
    /// Stateless type: instances never persist a configuration
    pub is_logic: bool,
    /// Configuration applied when an instance carries none
    pub default_config: Option<Value>,
    /// Placements of this type may not be changed
    pub locked: bool,
}

impl WidgetTypeInfo {
    /// Configurable type with an optional default configuration
    pub fn configurable(default_config: Option<Value>) -> Self {
        Self { is_logic: false, default_config, locked: false }
    }

    /// Stateless type
    pub fn logic() -> Self {
        Self { is_logic: true, default_config: None, locked: false }
    }

    /// Mark the type as locked
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

/// Widget type registry
pub trait WidgetTypeLookup: Send + Sync {
    /// Resolve `type_code`, `None` if the type is unknown
    fn resolve(&self, type_code: &str) -> Option<WidgetTypeInfo>;
}

impl<T: PageModelLookup + ?Sized> PageModelLookup for Arc<T> {
    fn frame_count(&self, model_code: &str) -> Option<usize> {
        (**self).frame_count(model_code)
    }
}

impl<T: WidgetTypeLookup + ?Sized> WidgetTypeLookup for Arc<T> {
    fn resolve(&self, type_code: &str) -> Option<WidgetTypeInfo> {
        (**self).resolve(type_code)
    }
}

/// In-memory page model table
#[derive(Debug, Clone, Default)]
pub struct PageModelRegistry {
    models: HashMap<String, usize>,
}

impl PageModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model with its frame count
    pub fn with_model(mut self, code: impl Into<String>, frames: usize) -> Self {
        self.models.insert(code.into(), frames);
        self
    }
}

impl PageModelLookup for PageModelRegistry {
    fn frame_count(&self, model_code: &str) -> Option<usize> {
        self.models.get(model_code).copied()
    }
}

/// In-memory widget type table
#[derive(Debug, Clone, Default)]
pub struct WidgetTypeRegistry {
    types: HashMap<String, WidgetTypeInfo>,
}

impl WidgetTypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a widget type
    pub fn with_type(mut self, code: impl Into<String>, info: WidgetTypeInfo) -> Self {
        self.types.insert(code.into(), info);
        self
    }
}

impl WidgetTypeLookup for WidgetTypeRegistry {
    fn resolve(&self, type_code: &str) -> Option<WidgetTypeInfo> {
        self.types.get(type_code).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WidgetInstance;
    use serde_json::json;

    #[test]
    fn test_effective_config_falls_back_to_default() {
        let types = WidgetTypeRegistry::new()
            .with_type("content_viewer", WidgetTypeInfo::configurable(Some(json!({"modelId": "1"}))))
            .with_type("login_form", WidgetTypeInfo::logic());

        let inherited = WidgetInstance::new("content_viewer");
        assert_eq!(inherited.effective_config(&types), Some(json!({"modelId": "1"})));

        let own = WidgetInstance::with_config("content_viewer", json!({"modelId": "7"}));
        assert_eq!(own.effective_config(&types), Some(json!({"modelId": "7"})));

        assert_eq!(WidgetInstance::new("login_form").effective_config(&types), None);
    }

    #[test]
    fn test_arc_lookup_delegates() {
        let models: Arc<dyn PageModelLookup> = Arc::new(PageModelRegistry::new().with_model("home", 5));
        assert_eq!(models.frame_count("home"), Some(5));
        assert_eq!(models.frame_count("missing"), None);
    }
}
