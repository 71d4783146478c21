//! Page tree service
//!
//! Public entry point. Every mutating operation validates against the current
//! tree snapshot, runs one gateway transaction and then publishes the updated
//! snapshot. A service-level lock is held across those three steps, so a
//! concurrent `refresh()` always observes the write it races with.
//!
//! Publication state follows the draft/online pair of each page:
//!
//! | operation          | effect                                    |
//! |--------------------|-------------------------------------------|
//! | `add_page`         | new page, unpublished                     |
//! | `update_page`      | clean becomes dirty; unpublished stays    |
//! | `set_page_online`  | any state becomes clean                   |
//! | `set_page_offline` | clean or dirty becomes unpublished        |
//! | `delete_page`      | unpublished pages only, unless configured |

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{DeletePolicy, ServiceConfig};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::events::{ActionLog, PageEvent};
use crate::gateway::PagePersistenceGateway;
use crate::lookup::{PageModelLookup, WidgetTypeInfo, WidgetTypeLookup};
use crate::model::{PageNode, PageVersion, PublishState, VersionKind, WidgetInstance};
use crate::position;
use crate::tree::{PageTree, PageTreeStore};

/// Page counts per publication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagesStatus {
    /// Pages with no online version
    pub unpublished: usize,
    /// Online version equal to the draft
    pub published_clean: usize,
    /// Online version behind the draft
    pub published_dirty: usize,
    /// All pages
    pub total: usize,
}

/// Page tree operations over a persistent store
pub struct PageTreeService {
    gateway: PagePersistenceGateway,
    store: PageTreeStore,
    write_lock: Mutex<()>,
    config: ServiceConfig,
    models: Arc<dyn PageModelLookup>,
    widget_types: Arc<dyn WidgetTypeLookup>,
    action_log: Option<ActionLog>,
}

impl std::fmt::Debug for PageTreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTreeService")
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .field("pages", &self.store.snapshot().len())
            .finish_non_exhaustive()
    }
}

fn check_locked_config(frame: i32, widget: &WidgetInstance, info: &WidgetTypeInfo) -> Result<()> {
    let explicit = widget.config.as_ref().is_some_and(|c| !c.is_null());
    if info.locked && explicit && widget.config != info.default_config {
        return Err(Error::LockedWidget { type_code: widget.type_code.clone(), frame });
    }
    Ok(())
}

impl PageTreeService {
    pub(crate) fn open(
        config: ServiceConfig,
        env: Environment,
        models: Arc<dyn PageModelLookup>,
        widget_types: Arc<dyn WidgetTypeLookup>,
        action_log: Option<ActionLog>,
    ) -> Result<Self> {
        let gateway = PagePersistenceGateway::new(env, Arc::clone(&models), Arc::clone(&widget_types));
        let mut pages = gateway.load_pages()?;
        if pages.is_empty() {
            if let Some(seed) = &config.root {
                let draft = PageVersion::for_model(&seed.model, &*models)?;
                let root = gateway.add_page(&PageNode::new(seed.code.clone(), None, seed.group.clone(), draft))?;
                info!(page = %root.code, "seeded empty page store with a root page");
                pages.push(root);
            }
        }
        let store = PageTreeStore::new(PageTree::from_nodes(pages));
        Ok(Self { gateway, store, write_lock: Mutex::new(()), config, models, widget_types, action_log })
    }

    /// Service settings
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Underlying environment
    pub fn env(&self) -> &Environment {
        self.gateway.env()
    }

    fn emit(&self, event: PageEvent) {
        if let Some(log) = &self.action_log {
            log.submit(event);
        }
    }

    fn resolve_type(&self, type_code: &str) -> Result<WidgetTypeInfo> {
        self.widget_types
            .resolve(type_code)
            .ok_or_else(|| Error::UnknownWidgetType(type_code.to_string()))
    }

    fn is_locked(&self, widget: &WidgetInstance) -> bool {
        self.widget_types.resolve(&widget.type_code).is_some_and(|info| info.locked)
    }

    /// Logic types never carry a configuration
    /// Logic widgets lose their configuration; an explicit JSON `null` means
    /// the type default, same as no configuration.
    fn normalize(&self, widget: WidgetInstance, info: &WidgetTypeInfo) -> WidgetInstance {
        if info.is_logic || widget.config.as_ref().is_some_and(Value::is_null) {
            WidgetInstance::new(widget.type_code)
        } else {
            widget
        }
    }

    /// Check a version against its model and the widget registry, normalizing
    /// configurations on the way
    fn validate_version(&self, mut version: PageVersion) -> Result<PageVersion> {
        let expected = self
            .models
            .frame_count(&version.model_code)
            .ok_or_else(|| Error::UnknownPageModel(version.model_code.clone()))?;
        let found = version.widgets.frame_count();
        if found != expected {
            return Err(Error::FrameCountMismatch { model_code: version.model_code.clone(), expected, found });
        }
        let placed: Vec<(i32, WidgetInstance)> =
            version.widgets.occupied().map(|(frame, w)| (frame, w.clone())).collect();
        for (frame, widget) in placed {
            let info = self.resolve_type(&widget.type_code)?;
            check_locked_config(frame, &widget, &info)?;
            let normalized = self.normalize(widget.clone(), &info);
            if normalized != widget {
                version.widgets.set(frame, normalized)?;
            }
        }
        Ok(version)
    }

    /// Locked placements of `current` must survive unchanged in `next`
    fn check_locked_kept(&self, current: &PageVersion, next: &PageVersion) -> Result<()> {
        for (frame, widget) in current.widgets.occupied() {
            if !self.is_locked(widget) {
                continue;
            }
            let kept = matches!(next.widgets.get(frame), Ok(Some(w)) if w == widget);
            if !kept {
                return Err(Error::LockedWidget { type_code: widget.type_code.clone(), frame });
            }
        }
        Ok(())
    }

    // ---- page operations ----

    /// Create an unpublished page as the last child of `parent_code`
    pub fn add_page(&self, parent_code: &str, code: &str, group: &str, draft: PageVersion) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        if !tree.contains(parent_code) {
            return Err(Error::draft_not_found(parent_code));
        }
        if tree.contains(code) {
            return Err(Error::DuplicateCode(code.to_string()));
        }
        let draft = self.validate_version(draft)?;

        let node = PageNode::new(code, Some(parent_code.to_string()), group, draft);
        let stored = self.gateway.add_page(&node)?;
        self.store.update(|tree| tree.insert(stored.clone()));
        self.emit(PageEvent::Added { code: code.to_string(), parent_code: parent_code.to_string() });
        Ok(stored)
    }

    /// Replace the draft of a page
    pub fn update_page(&self, code: &str, draft: PageVersion) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let current = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        let draft = self.validate_version(draft)?;
        self.check_locked_kept(&current.draft, &draft)?;

        let mut node = PageNode { draft, ..current.clone() };
        node.draft = self.gateway.update_page(&node)?;
        self.store.update(|tree| tree.replace(node.clone()));
        self.emit(PageEvent::Updated { code: code.to_string() });
        Ok(node)
    }

    /// Change the owning group of a page
    pub fn update_page_group(&self, code: &str, group: &str) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let current = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;

        self.gateway.update_page_group(code, group)?;
        let node = PageNode { group: group.to_string(), ..current.clone() };
        self.store.update(|tree| tree.replace(node.clone()));
        self.emit(PageEvent::Updated { code: code.to_string() });
        Ok(node)
    }

    /// Delete a leaf page.
    ///
    /// Fails on the root and on pages with children. Online pages are rejected
    /// or unpublished first, depending on [`DeletePolicy`].
    pub fn delete_page(&self, code: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let node = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        if node.is_root() {
            return Err(Error::InvalidOperation("the root page cannot be deleted"));
        }
        if !tree.children(code).is_empty() {
            return Err(Error::HasChildren(code.to_string()));
        }
        let was_online = node.is_online();
        if was_online && self.config.delete_policy == DeletePolicy::Reject {
            return Err(Error::PagePublished(code.to_string()));
        }

        self.gateway.delete_page(code)?;
        self.store.update(|tree| tree.remove(code));
        if was_online {
            self.emit(PageEvent::Unpublished { code: code.to_string() });
        }
        self.emit(PageEvent::Deleted { code: code.to_string() });
        Ok(())
    }

    /// Move a page to the end of `new_parent`'s children.
    ///
    /// Moving a page under its current parent changes nothing and returns it
    /// as is.
    pub fn move_page(&self, code: &str, new_parent: &str) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let current = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        if position::plan_reparent(&*tree, code, new_parent)?.is_none() {
            return Ok(current.clone());
        }

        let Some(plan) = self.gateway.move_page(code, new_parent)? else {
            return Ok(current.clone());
        };
        let moved = self.store.update(|tree| {
            tree.apply_reparent(&plan);
            tree.get(code).cloned()
        });
        self.emit(PageEvent::Moved {
            code: code.to_string(),
            parent_code: plan.new_parent.clone(),
            position: plan.new_position,
        });
        moved.ok_or_else(|| Error::draft_not_found(code))
    }

    /// Swap a page with its previous (`up`) or next sibling.
    ///
    /// Returns `false`, changing nothing, when the page already is the first
    /// (moving up) or last (moving down) child.
    pub fn move_page_step(&self, code: &str, up: bool) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if !self.store.snapshot().contains(code) {
            return Err(Error::draft_not_found(code));
        }
        let Some(plan) = self.gateway.swap_positions(code, up)? else {
            return Ok(false);
        };
        let moved = self.store.update(|tree| {
            tree.apply_swap(&plan);
            tree.get(code).map(|n| (n.parent_code.clone().unwrap_or_default(), n.position))
        });
        if let Some((parent_code, position)) = moved {
            self.emit(PageEvent::Moved { code: code.to_string(), parent_code, position });
        }
        Ok(true)
    }

    /// Publish the current draft
    pub fn set_page_online(&self, code: &str) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        if !self.store.snapshot().contains(code) {
            return Err(Error::draft_not_found(code));
        }

        let at = self.gateway.set_page_online(code)?;
        let published = self.store.update(|tree| {
            let node = tree.get_mut(code)?;
            node.draft.updated_at = Some(at);
            node.online = Some(node.draft.clone());
            Some(node.clone())
        });
        self.emit(PageEvent::Published { code: code.to_string() });
        published.ok_or_else(|| Error::draft_not_found(code))
    }

    /// Drop the online version. A page that is not online is returned unchanged.
    pub fn set_page_offline(&self, code: &str) -> Result<PageNode> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let current = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        if !current.is_online() {
            return Ok(current.clone());
        }

        self.gateway.set_page_offline(code)?;
        let node = PageNode { online: None, ..current.clone() };
        self.store.update(|tree| {
            if let Some(n) = tree.get_mut(code) {
                n.online = None;
            }
        });
        self.emit(PageEvent::Unpublished { code: code.to_string() });
        Ok(node)
    }

    // ---- widget operations ----

    /// Place `widget` in a draft frame
    pub fn join_widget(&self, code: &str, frame: i32, widget: WidgetInstance) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let node = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        if let Some(occupant) = node.draft.widgets.get(frame)? {
            if self.is_locked(occupant) {
                return Err(Error::LockedWidget { type_code: occupant.type_code.clone(), frame });
            }
        }
        let info = self.resolve_type(&widget.type_code)?;
        check_locked_config(frame, &widget, &info)?;
        let widget = self.normalize(widget, &info);

        let at = self.gateway.join_widget(code, frame, &widget)?;
        self.store.update(|tree| -> Result<()> {
            if let Some(n) = tree.get_mut(code) {
                n.draft.widgets.set(frame, widget)?;
                n.draft.updated_at = Some(at);
            }
            Ok(())
        })?;
        self.emit(PageEvent::WidgetChanged { code: code.to_string(), frames: vec![frame] });
        Ok(())
    }

    /// Swap the contents of two draft frames
    pub fn move_widget(&self, code: &str, from: i32, to: i32) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let node = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        for frame in [from, to] {
            if let Some(occupant) = node.draft.widgets.get(frame)? {
                if self.is_locked(occupant) {
                    return Err(Error::LockedWidget { type_code: occupant.type_code.clone(), frame });
                }
            }
        }
        if from == to {
            return Ok(());
        }

        let at = self.gateway.update_widget_position(code, from, to)?;
        self.store.update(|tree| -> Result<()> {
            if let Some(n) = tree.get_mut(code) {
                n.draft.widgets.move_widget(from, to)?;
                n.draft.updated_at = Some(at);
            }
            Ok(())
        })?;
        self.emit(PageEvent::WidgetChanged { code: code.to_string(), frames: vec![from, to] });
        Ok(())
    }

    /// Empty a draft frame. Emptying an empty frame is a no-op.
    pub fn remove_widget(&self, code: &str, frame: i32) -> Result<()> {
        let _guard = self.write_lock.lock();
        let tree = self.store.snapshot();
        let node = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        let Some(occupant) = node.draft.widgets.get(frame)? else {
            return Ok(());
        };
        if self.is_locked(occupant) {
            return Err(Error::LockedWidget { type_code: occupant.type_code.clone(), frame });
        }

        let at = self.gateway.remove_widget(code, frame)?;
        self.store.update(|tree| -> Result<()> {
            if let Some(n) = tree.get_mut(code) {
                n.draft.widgets.clear(frame)?;
                n.draft.updated_at = Some(at);
            }
            Ok(())
        })?;
        self.emit(PageEvent::WidgetChanged { code: code.to_string(), frames: vec![frame] });
        Ok(())
    }

    // ---- reads ----

    /// Current tree snapshot
    pub fn snapshot(&self) -> Arc<PageTree> {
        self.store.snapshot()
    }

    /// Page with its draft (and online version, if any)
    pub fn get_draft_page(&self, code: &str) -> Result<PageNode> {
        self.store.snapshot().get(code).cloned().ok_or_else(|| Error::draft_not_found(code))
    }

    /// Page that has an online version
    pub fn get_online_page(&self, code: &str) -> Result<PageNode> {
        self.store
            .snapshot()
            .get(code)
            .filter(|n| n.is_online())
            .cloned()
            .ok_or_else(|| Error::online_not_found(code))
    }

    /// Root page
    pub fn get_draft_root(&self) -> Result<PageNode> {
        self.store
            .snapshot()
            .root()
            .cloned()
            .ok_or(Error::InvalidOperation("the page tree has no root"))
    }

    /// Root page, if it is online
    pub fn get_online_root(&self) -> Result<PageNode> {
        let root = self.get_draft_root()?;
        if root.is_online() {
            Ok(root)
        } else {
            Err(Error::online_not_found(root.code))
        }
    }

    /// Children of `code` in position order. The online view lists only
    /// children that are online, and requires `code` itself to be online.
    pub fn children(&self, code: &str, version: VersionKind) -> Result<Vec<PageNode>> {
        let tree = self.store.snapshot();
        let parent = tree.get(code).ok_or_else(|| Error::draft_not_found(code))?;
        if parent.version(version).is_none() {
            return Err(Error::NotFound { code: code.to_string(), version });
        }
        Ok(tree.child_nodes(code, version).cloned().collect())
    }

    /// Codes from the root down to the parent of `code`
    pub fn ancestors(&self, code: &str) -> Result<Vec<String>> {
        let tree = self.store.snapshot();
        if !tree.contains(code) {
            return Err(Error::draft_not_found(code));
        }
        let mut chain = position::ancestors(&*tree, code);
        chain.reverse();
        Ok(chain)
    }

    /// Whether `code` sits anywhere below `ancestor`
    pub fn is_descendant(&self, code: &str, ancestor: &str) -> bool {
        position::is_descendant(&*self.store.snapshot(), code, ancestor)
    }

    /// Page counts per publication state
    pub fn pages_status(&self) -> PagesStatus {
        let tree = self.store.snapshot();
        let mut status = PagesStatus { total: tree.len(), ..PagesStatus::default() };
        for node in tree.nodes() {
            match node.publish_state() {
                PublishState::Unpublished => status.unpublished += 1,
                PublishState::PublishedClean => status.published_clean += 1,
                PublishState::PublishedDirty => status.published_dirty += 1,
            }
        }
        status
    }

    /// Codes containing `token`, ignoring case, sorted
    pub fn search_pages(&self, token: &str) -> Vec<String> {
        let token = token.to_lowercase();
        let mut codes: Vec<String> = self
            .store
            .snapshot()
            .nodes()
            .filter(|n| n.code.to_lowercase().contains(&token))
            .map(|n| n.code.clone())
            .collect();
        codes.sort();
        codes
    }

    fn widget_utilizers(&self, type_code: &str, version: VersionKind) -> Vec<String> {
        let mut codes: Vec<String> = self
            .store
            .snapshot()
            .nodes()
            .filter(|n| n.version(version).is_some_and(|v| v.widgets.contains_type(type_code)))
            .map(|n| n.code.clone())
            .collect();
        codes.sort();
        codes
    }

    /// Pages whose draft places a widget of `type_code`
    pub fn draft_widget_utilizers(&self, type_code: &str) -> Vec<String> {
        self.widget_utilizers(type_code, VersionKind::Draft)
    }

    /// Pages whose online version places a widget of `type_code`
    pub fn online_widget_utilizers(&self, type_code: &str) -> Vec<String> {
        self.widget_utilizers(type_code, VersionKind::Online)
    }

    /// Rebuild the tree from the store
    pub fn refresh(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let pages = self.gateway.load_pages()?;
        debug!(pages = pages.len(), "refreshed page tree");
        self.store.replace(PageTree::from_nodes(pages));
        Ok(())
    }
}
