//! Service configuration

use std::sync::Arc;

use crate::env::Environment;
use crate::error::Result;
use crate::events::{ActionLog, PageEventSink, TracingSink};
use crate::lookup::{PageModelLookup, WidgetTypeLookup};
use crate::service::PageTreeService;

/// What `delete_page` does with a page that is still online
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Fail with `Error::PagePublished`
    #[default]
    Reject,
    /// Drop the online version in the same transaction, then delete
    UnpublishFirst,
}

/// Root page created when the store holds no pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSeed {
    /// Root page code
    pub code: String,
    /// Root page group
    pub group: String,
    /// Page model of the root draft
    pub model: String,
}

impl Default for RootSeed {
    fn default() -> Self {
        Self { code: "homepage".into(), group: "free".into(), model: "home".into() }
    }
}

/// Service settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Delete behaviour for published pages
    pub delete_policy: DeletePolicy,
    /// Action log queue size; 0 disables the action log
    pub action_log_capacity: usize,
    /// Root page to seed an empty store with, `None` to leave it empty
    pub root: Option<RootSeed>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { delete_policy: DeletePolicy::Reject, action_log_capacity: 1024, root: Some(RootSeed::default()) }
    }
}

/// Builder for [`PageTreeService`]
pub struct ServiceBuilder {
    config: ServiceConfig,
    sink: Option<Box<dyn FnOnce(usize) -> ActionLog>>,
}

impl ServiceBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self { config: ServiceConfig::default(), sink: None }
    }

    /// Builder starting from `config`
    pub fn with_config(config: ServiceConfig) -> Self {
        Self { config, sink: None }
    }

    /// Set the delete policy
    pub fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.config.delete_policy = policy;
        self
    }

    /// Set the action log queue size; 0 disables the action log
    pub fn action_log_capacity(mut self, capacity: usize) -> Self {
        self.config.action_log_capacity = capacity;
        self
    }

    /// Send action log events to `sink` instead of the tracing log
    pub fn event_sink<S: PageEventSink>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(move |capacity| ActionLog::start(capacity, sink)));
        self
    }

    /// Root page to create when the store is empty
    pub fn root(mut self, code: impl Into<String>, group: impl Into<String>, model: impl Into<String>) -> Self {
        self.config.root = Some(RootSeed { code: code.into(), group: group.into(), model: model.into() });
        self
    }

    /// Never create a root page
    pub fn without_root(mut self) -> Self {
        self.config.root = None;
        self
    }

    /// Load the page tree from `env` and start the service
    pub fn build(
        self,
        env: Environment,
        models: Arc<dyn PageModelLookup>,
        widget_types: Arc<dyn WidgetTypeLookup>,
    ) -> Result<PageTreeService> {
        let action_log = match (self.config.action_log_capacity, self.sink) {
            (0, _) => None,
            (capacity, Some(start)) => Some(start(capacity)),
            (capacity, None) => Some(ActionLog::start(capacity, TracingSink)),
        };
        PageTreeService::open(self.config, env, models, widget_types, action_log)
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}
