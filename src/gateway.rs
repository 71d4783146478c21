//! Persistence gateway
//!
//! The only writer of durable page state. Every write method runs in a single
//! write transaction: its statements are staged in the transaction's working
//! tables and become visible together on commit, or not at all.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::env::Environment;
use crate::error::{Error, PersistenceError, Result};
use crate::lookup::{PageModelLookup, WidgetTypeLookup};
use crate::model::{PageNode, PageVersion, Timestamp, VersionKind, WidgetInstance};
use crate::position::{self, ReparentPlan, Siblings, SwapPlan};
use crate::slots::WidgetSlotTable;
use crate::table::{names, MetadataRow, PageRow, Tables, WidgetRow};

/// Transactional read/write boundary to the row store
pub struct PagePersistenceGateway {
    env: Environment,
    models: Arc<dyn PageModelLookup>,
    widget_types: Arc<dyn WidgetTypeLookup>,
}

impl std::fmt::Debug for PagePersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePersistenceGateway").field("env", &self.env).finish_non_exhaustive()
    }
}

impl PagePersistenceGateway {
    /// Gateway over `env`
    pub fn new(
        env: Environment,
        models: Arc<dyn PageModelLookup>,
        widget_types: Arc<dyn WidgetTypeLookup>,
    ) -> Self {
        Self { env, models, widget_types }
    }

    /// Underlying environment
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run `statements` in one write transaction and commit
    fn write<T>(&self, op: &'static str, code: &str, statements: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut txn = self.env.write_txn()?;
        let outcome = match statements(txn.tables_mut()) {
            Ok(value) => txn.commit().map(|id| (value, id)),
            Err(err) => {
                txn.abort();
                Err(err)
            }
        };
        match outcome {
            Ok((value, id)) => {
                debug!(op, page = code, txn = %id, "page store write committed");
                Ok(value)
            }
            Err(err) => {
                error!(op, page = code, error = %err, "page store write rolled back");
                Err(err)
            }
        }
    }

    // ---- reads ----

    /// Load every page, ordered by `(parent, position, code)`
    pub fn load_pages(&self) -> Result<Vec<PageNode>> {
        let txn = self.env.read_txn()?;
        let tables = txn.tables();
        let mut pages = Vec::with_capacity(tables.page_count());
        for row in tables.pages_ordered() {
            let draft = self.load_version(tables, VersionKind::Draft, &row.code).ok_or_else(|| {
                PersistenceError::MissingRow { table: names::METADATA_DRAFT, key: row.code.clone() }
            })?;
            let online = self.load_version(tables, VersionKind::Online, &row.code);
            pages.push(PageNode {
                code: row.code.clone(),
                parent_code: row.parent_code.clone(),
                position: row.pos,
                group: row.group_code.clone(),
                draft,
                online,
            });
        }
        debug!(pages = pages.len(), "loaded page tree");
        Ok(pages)
    }

    fn load_version(&self, tables: &Tables, kind: VersionKind, code: &str) -> Option<PageVersion> {
        let metadata = tables.metadata(kind, code)?;
        let frame_count = self.models.frame_count(&metadata.model_code).unwrap_or_else(|| {
            warn!(page = code, model = %metadata.model_code, version = %kind, "unknown page model, loading without frames");
            0
        });
        let rows = tables
            .widgets(kind, code)
            .map(|(frame, row)| (frame, WidgetInstance { type_code: row.widget_code.clone(), config: row.config.clone() }));
        Some(PageVersion {
            titles: metadata.titles.clone(),
            model_code: metadata.model_code.clone(),
            showable: metadata.show_in_menu,
            extra_config: metadata.extra_config.clone(),
            updated_at: metadata.updated_at,
            widgets: WidgetSlotTable::from_rows(code, frame_count, rows),
        })
    }

    // ---- row mapping ----

    fn widget_row(&self, widget: &WidgetInstance) -> WidgetRow {
        let is_logic = self.widget_types.resolve(&widget.type_code).is_some_and(|info| info.is_logic);
        WidgetRow {
            widget_code: widget.type_code.clone(),
            config: if is_logic { None } else { widget.config.clone().filter(|c| !c.is_null()) },
        }
    }

    fn insert_version(
        &self,
        tables: &mut Tables,
        kind: VersionKind,
        code: &str,
        version: &PageVersion,
    ) -> std::result::Result<(), PersistenceError> {
        tables.insert_metadata(
            kind,
            code,
            MetadataRow {
                titles: version.titles.clone(),
                model_code: version.model_code.clone(),
                show_in_menu: version.showable,
                extra_config: version.extra_config.clone(),
                updated_at: version.updated_at,
            },
        )?;
        for (frame, widget) in version.widgets.occupied() {
            tables.insert_widget(kind, code, frame, self.widget_row(widget))?;
        }
        Ok(())
    }

    fn normalized(&self, mut version: PageVersion, at: Timestamp) -> PageVersion {
        version.updated_at = Some(at);
        version
    }

    // ---- pages ----

    /// Insert a page at the end of its parent's children.
    ///
    /// Returns the node with its assigned position and write timestamps.
    pub fn add_page(&self, node: &PageNode) -> Result<PageNode> {
        let at = Utc::now();
        self.write("add_page", &node.code, |tables| {
            let pos = match &node.parent_code {
                Some(parent) => position::next_position(tables.children_positions(parent)),
                None => 1,
            };
            tables.insert_page(PageRow {
                code: node.code.clone(),
                parent_code: node.parent_code.clone(),
                pos,
                group_code: node.group.clone(),
            })?;
            let draft = self.normalized(node.draft.clone(), at);
            self.insert_version(tables, VersionKind::Draft, &node.code, &draft)?;
            let online = node.online.clone().map(|v| self.normalized(v, at));
            if let Some(online) = &online {
                self.insert_version(tables, VersionKind::Online, &node.code, online)?;
            }
            Ok(PageNode { position: pos, draft, online, ..node.clone() })
        })
    }

    /// Delete a page's rows and shift its later siblings down.
    ///
    /// A page that still has children is refused and nothing is written.
    pub fn delete_page(&self, code: &str) -> Result<()> {
        self.write("delete_page", code, |tables| {
            if tables.has_children(code) {
                return Err(PersistenceError::Constraint {
                    table: names::PAGES,
                    details: format!("page '{}' still has children", code),
                }
                .into());
            }
            for kind in VersionKind::ALL {
                tables.delete_widgets(kind, code);
                tables.delete_metadata(kind, code);
            }
            let row = tables.delete_page(code)?;
            if let Some(parent) = &row.parent_code {
                tables.shift_pages(parent, row.pos);
            }
            Ok(())
        })
    }

    /// Rewrite the draft rows of a page and its group column.
    ///
    /// Returns the stored draft.
    pub fn update_page(&self, node: &PageNode) -> Result<PageVersion> {
        let at = Utc::now();
        self.write("update_page", &node.code, |tables| {
            tables.delete_widgets(VersionKind::Draft, &node.code);
            tables.delete_metadata(VersionKind::Draft, &node.code);
            let draft = self.normalized(node.draft.clone(), at);
            self.insert_version(tables, VersionKind::Draft, &node.code, &draft)?;
            tables.update_page(&node.code, node.parent_code.as_deref(), &node.group)?;
            Ok(draft)
        })
    }

    /// Rewrite only the group column
    pub fn update_page_group(&self, code: &str, group: &str) -> Result<()> {
        self.write("update_page_group", code, |tables| {
            let parent = tables.page(code).and_then(|r| r.parent_code.clone());
            tables.update_page(code, parent.as_deref(), group)?;
            Ok(())
        })
    }

    /// Replace the online rows with a copy of the draft rows.
    ///
    /// Both versions are stamped with the returned timestamp.
    pub fn set_page_online(&self, code: &str) -> Result<Timestamp> {
        let at = Utc::now();
        self.write("set_page_online", code, |tables| {
            tables.delete_widgets(VersionKind::Online, code);
            tables.delete_metadata(VersionKind::Online, code);
            tables.copy_draft_to_online(code)?;
            tables.stamp_metadata(VersionKind::Draft, code, at)?;
            tables.stamp_metadata(VersionKind::Online, code, at)?;
            Ok(at)
        })
    }

    /// Delete the online rows; the draft is untouched
    pub fn set_page_offline(&self, code: &str) -> Result<()> {
        self.write("set_page_offline", code, |tables| {
            if tables.page(code).is_none() {
                return Err(Error::draft_not_found(code));
            }
            tables.delete_widgets(VersionKind::Online, code);
            tables.delete_metadata(VersionKind::Online, code);
            Ok(())
        })
    }

    /// Move a page to the end of `new_parent`'s children.
    ///
    /// The plan is computed from the rows inside the transaction. `Ok(None)`
    /// when `new_parent` already is the parent.
    pub fn move_page(&self, code: &str, new_parent: &str) -> Result<Option<ReparentPlan>> {
        self.write("move_page", code, |tables| {
            let Some(plan) = position::plan_reparent(&*tables, code, new_parent)? else {
                return Ok(None);
            };
            tables.update_tree_position(&plan.code, &plan.new_parent, plan.new_position)?;
            tables.shift_pages(&plan.old_parent, plan.old_position);
            Ok(Some(plan))
        })
    }

    /// Swap a page with its previous (`up`) or next sibling.
    ///
    /// `Ok(None)` at a boundary; nothing is written then.
    pub fn swap_positions(&self, code: &str, up: bool) -> Result<Option<SwapPlan>> {
        self.write("swap_positions", code, |tables| {
            let plan = position::plan_swap(&*tables, code, up, |parent, pos| tables.child_at(parent, pos))?;
            if let Some(plan) = &plan {
                tables.offset_position(&plan.up, -1)?;
                tables.offset_position(&plan.down, 1)?;
            }
            Ok(plan)
        })
    }

    // ---- widgets ----

    /// Place a widget in a draft frame, replacing any occupant
    pub fn join_widget(&self, code: &str, frame: i32, widget: &WidgetInstance) -> Result<Timestamp> {
        let at = Utc::now();
        self.write("join_widget", code, |tables| {
            tables.delete_widget(VersionKind::Draft, code, frame);
            tables.insert_widget(VersionKind::Draft, code, frame, self.widget_row(widget))?;
            tables.stamp_metadata(VersionKind::Draft, code, at)?;
            Ok(at)
        })
    }

    /// Empty a draft frame
    pub fn remove_widget(&self, code: &str, frame: i32) -> Result<Timestamp> {
        let at = Utc::now();
        self.write("remove_widget", code, |tables| {
            tables.delete_widget(VersionKind::Draft, code, frame);
            tables.stamp_metadata(VersionKind::Draft, code, at)?;
            Ok(at)
        })
    }

    /// Swap two draft frames through the sentinel frame
    pub fn update_widget_position(&self, code: &str, from: i32, to: i32) -> Result<Timestamp> {
        let at = Utc::now();
        let sentinel = self.env.sentinel_frame();
        self.write("update_widget_position", code, |tables| {
            tables.update_widget_frame(VersionKind::Draft, code, from, sentinel)?;
            tables.update_widget_frame(VersionKind::Draft, code, to, from)?;
            tables.update_widget_frame(VersionKind::Draft, code, sentinel, to)?;
            tables.stamp_metadata(VersionKind::Draft, code, at)?;
            Ok(at)
        })
    }
}
