//! Page, version and widget model
//!
//! A [`PageNode`] carries two independent [`PageVersion`]s: the draft, which is
//! always present and is what editors mutate, and the online version, which
//! exists only while the page is published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::lookup::{PageModelLookup, WidgetTypeLookup};
use crate::slots::WidgetSlotTable;

/// Timestamp stamped on every write to a version
pub type Timestamp = DateTime<Utc>;

/// Localized titles, language code to title
pub type Titles = BTreeMap<String, String>;

/// Which of the two parallel versions of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionKind {
    /// Editable version
    Draft,
    /// Published version
    Online,
}

impl VersionKind {
    /// Both versions, draft first
    pub const ALL: [VersionKind; 2] = [VersionKind::Draft, VersionKind::Online];
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionKind::Draft => f.write_str("draft"),
            VersionKind::Online => f.write_str("online"),
        }
    }
}

/// A configured reference to a widget type occupying one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetInstance {
    /// Widget type code
    pub type_code: String,
    /// Instance configuration; `None` for logic types or when the type default applies
    pub config: Option<Value>,
}

impl WidgetInstance {
    /// Widget instance without its own configuration
    pub fn new(type_code: impl Into<String>) -> Self {
        Self { type_code: type_code.into(), config: None }
    }

    /// Widget instance with an explicit configuration
    pub fn with_config(type_code: impl Into<String>, config: Value) -> Self {
        Self { type_code: type_code.into(), config: Some(config) }
    }

    /// Configuration in effect: the instance's own, else the type default
    pub fn effective_config(&self, widget_types: &dyn WidgetTypeLookup) -> Option<Value> {
        if let Some(config) = &self.config {
            return Some(config.clone());
        }
        widget_types.resolve(&self.type_code).and_then(|info| info.default_config)
    }
}

/// Metadata and widget placement of one version of a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageVersion {
    /// Localized titles
    pub titles: Titles,
    /// Page model the widget array is sized against
    pub model_code: String,
    /// Listed in navigation
    pub showable: bool,
    /// Opaque extension data
    pub extra_config: Value,
    /// Last write to this version; assigned by the gateway
    pub updated_at: Option<Timestamp>,
    /// One slot per model frame
    pub widgets: WidgetSlotTable,
}

impl PageVersion {
    /// Empty version with `frame_count` empty slots
    pub fn new(model_code: impl Into<String>, frame_count: usize) -> Self {
        Self {
            titles: Titles::new(),
            model_code: model_code.into(),
            showable: false,
            extra_config: Value::Null,
            updated_at: None,
            widgets: WidgetSlotTable::new(frame_count),
        }
    }

    /// Empty version sized from the model lookup
    pub fn for_model(model_code: &str, models: &dyn PageModelLookup) -> Result<Self> {
        let frames = models
            .frame_count(model_code)
            .ok_or_else(|| Error::UnknownPageModel(model_code.to_string()))?;
        Ok(Self::new(model_code, frames))
    }

    /// Builder-style title setter
    pub fn with_title(mut self, lang: impl Into<String>, title: impl Into<String>) -> Self {
        self.titles.insert(lang.into(), title.into());
        self
    }

    /// Builder-style navigation flag
    pub fn showable(mut self, showable: bool) -> Self {
        self.showable = showable;
        self
    }

    /// Builder-style extension data
    pub fn with_extra_config(mut self, extra_config: Value) -> Self {
        self.extra_config = extra_config;
        self
    }

    /// Builder-style widget placement; fails when `frame` is out of bounds
    pub fn with_widget(mut self, frame: i32, widget: WidgetInstance) -> Result<Self> {
        self.widgets.set(frame, widget)?;
        Ok(self)
    }

    /// Title for a language
    pub fn title(&self, lang: &str) -> Option<&str> {
        self.titles.get(lang).map(String::as_str)
    }

    /// Content equality, ignoring `updated_at`
    pub fn same_content(&self, other: &PageVersion) -> bool {
        self.titles == other.titles
            && self.model_code == other.model_code
            && self.showable == other.showable
            && self.extra_config == other.extra_config
            && self.widgets == other.widgets
    }
}

/// Publication state derived from the two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishState {
    /// Draft only
    Unpublished,
    /// Online version identical to the draft
    PublishedClean,
    /// Online version present, draft diverges
    PublishedDirty,
}

/// One logical page of the tree
#[derive(Debug, Clone, PartialEq)]
pub struct PageNode {
    /// Unique, immutable code
    pub code: String,
    /// Parent code; `None` only for the root
    pub parent_code: Option<String>,
    /// 1-based rank among siblings; 0 until assigned by the gateway
    pub position: i32,
    /// Owning group
    pub group: String,
    /// Draft version
    pub draft: PageVersion,
    /// Online version, present while published
    pub online: Option<PageVersion>,
}

impl PageNode {
    /// New unpublished page under `parent_code`
    pub fn new(
        code: impl Into<String>,
        parent_code: Option<String>,
        group: impl Into<String>,
        draft: PageVersion,
    ) -> Self {
        Self {
            code: code.into(),
            parent_code,
            position: 0,
            group: group.into(),
            draft,
            online: None,
        }
    }

    /// Whether this is the root page
    pub fn is_root(&self) -> bool {
        self.parent_code.is_none()
    }

    /// Whether an online version exists
    pub fn is_online(&self) -> bool {
        self.online.is_some()
    }

    /// Version by kind
    pub fn version(&self, kind: VersionKind) -> Option<&PageVersion> {
        match kind {
            VersionKind::Draft => Some(&self.draft),
            VersionKind::Online => self.online.as_ref(),
        }
    }

    /// Current publication state
    pub fn publish_state(&self) -> PublishState {
        match &self.online {
            None => PublishState::Unpublished,
            Some(online) if online.same_content(&self.draft) => PublishState::PublishedClean,
            Some(_) => PublishState::PublishedDirty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version() -> PageVersion {
        PageVersion::new("home", 3).with_title("en", "Home").showable(true)
    }

    #[test]
    fn test_publish_state_transitions() {
        let mut node = PageNode::new("home", None, "free", version());
        assert_eq!(node.publish_state(), PublishState::Unpublished);

        node.online = Some(node.draft.clone());
        assert_eq!(node.publish_state(), PublishState::PublishedClean);

        node.draft.titles.insert("it".into(), "Casa".into());
        assert_eq!(node.publish_state(), PublishState::PublishedDirty);
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = version();
        let mut b = a.clone();
        b.updated_at = Some(Utc::now());
        assert!(a.same_content(&b));
        assert_ne!(a, b);

        b.extra_config = json!({"useExtraTitles": true});
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_with_widget_checks_bounds() {
        let widget = WidgetInstance::new("login_form");
        assert!(version().with_widget(2, widget.clone()).is_ok());
        assert!(matches!(
            version().with_widget(3, widget),
            Err(Error::FrameOutOfBounds { frame: 3, frame_count: 3 })
        ));
    }
}
