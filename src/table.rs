//! Row tables of the page store
//!
//! The layout follows the relational schema the engine persists into:
//!
//! - `pages(code PK, parent_code, pos, group_code)`
//! - `page_metadata_{draft,online}(code PK, titles, model_code, show_in_menu, extra_config, updated_at)`
//! - `widget_config_{draft,online}(page_code, frame_pos, widget_code, config)`, unique on
//!   `(page_code, frame_pos)`
//!
//! Each method is one statement. Uniqueness is checked per statement;
//! referential integrity is checked once at commit by [`Tables::check_references`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::PersistenceError;
use crate::model::{Timestamp, Titles, VersionKind};
use crate::position::{self, Positioned, Siblings};

/// Table names, used in constraint messages
pub mod names {
    /// Page tree table
    pub const PAGES: &str = "pages";
    /// Draft metadata table
    pub const METADATA_DRAFT: &str = "page_metadata_draft";
    /// Online metadata table
    pub const METADATA_ONLINE: &str = "page_metadata_online";
    /// Draft widget table
    pub const WIDGETS_DRAFT: &str = "widget_config_draft";
    /// Online widget table
    pub const WIDGETS_ONLINE: &str = "widget_config_online";
}

/// Row of the `pages` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    /// Page code
    pub code: String,
    /// Parent code, `None` for the root
    pub parent_code: Option<String>,
    /// Sibling position
    pub pos: i32,
    /// Owning group
    pub group_code: String,
}

impl Positioned for PageRow {
    fn code(&self) -> &str {
        &self.code
    }

    fn parent_code(&self) -> Option<&str> {
        self.parent_code.as_deref()
    }

    fn position(&self) -> i32 {
        self.pos
    }

    fn set_position(&mut self, position: i32) {
        self.pos = position;
    }
}

/// Row of a `page_metadata_*` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    /// Localized titles
    pub titles: Titles,
    /// Page model code
    pub model_code: String,
    /// Navigation flag
    pub show_in_menu: bool,
    /// Extension data
    pub extra_config: Value,
    /// Last write
    pub updated_at: Option<Timestamp>,
}

/// Row of a `widget_config_*` table, keyed by `(page_code, frame_pos)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRow {
    /// Widget type code
    pub widget_code: String,
    /// Serialized configuration, `NULL` for logic types
    pub config: Option<Value>,
}

type WidgetTable = BTreeMap<String, BTreeMap<i32, WidgetRow>>;

/// All tables of one committed state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pages: BTreeMap<String, PageRow>,
    metadata_draft: BTreeMap<String, MetadataRow>,
    metadata_online: BTreeMap<String, MetadataRow>,
    widgets_draft: WidgetTable,
    widgets_online: WidgetTable,
}

fn metadata_name(kind: VersionKind) -> &'static str {
    match kind {
        VersionKind::Draft => names::METADATA_DRAFT,
        VersionKind::Online => names::METADATA_ONLINE,
    }
}

fn widgets_name(kind: VersionKind) -> &'static str {
    match kind {
        VersionKind::Draft => names::WIDGETS_DRAFT,
        VersionKind::Online => names::WIDGETS_ONLINE,
    }
}

impl Tables {
    // ---- pages ----

    /// Page row by code
    pub fn page(&self, code: &str) -> Option<&PageRow> {
        self.pages.get(code)
    }

    /// Number of page rows
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page rows ordered by `(parent_code, pos, code)`
    pub fn pages_ordered(&self) -> Vec<&PageRow> {
        let mut rows: Vec<&PageRow> = self.pages.values().collect();
        rows.sort_by(|a, b| {
            a.parent_code
                .cmp(&b.parent_code)
                .then(a.pos.cmp(&b.pos))
                .then(a.code.cmp(&b.code))
        });
        rows
    }

    /// Code of the child of `parent_code` at `pos`
    pub fn child_at(&self, parent_code: &str, pos: i32) -> Option<String> {
        self.pages
            .values()
            .find(|r| r.parent_code.as_deref() == Some(parent_code) && r.pos == pos)
            .map(|r| r.code.clone())
    }

    /// Whether any page has `code` as its parent
    pub fn has_children(&self, code: &str) -> bool {
        self.pages.values().any(|r| r.parent_code.as_deref() == Some(code))
    }

    /// `INSERT INTO pages`
    pub fn insert_page(&mut self, row: PageRow) -> Result<(), PersistenceError> {
        if self.pages.contains_key(&row.code) {
            return Err(PersistenceError::Constraint {
                table: names::PAGES,
                details: format!("duplicate code '{}'", row.code),
            });
        }
        self.pages.insert(row.code.clone(), row);
        Ok(())
    }

    /// `DELETE FROM pages WHERE code = ?`
    pub fn delete_page(&mut self, code: &str) -> Result<PageRow, PersistenceError> {
        self.pages
            .remove(code)
            .ok_or_else(|| PersistenceError::MissingRow { table: names::PAGES, key: code.to_string() })
    }

    /// `UPDATE pages SET parent_code = ?, group_code = ? WHERE code = ?`
    pub fn update_page(
        &mut self,
        code: &str,
        parent_code: Option<&str>,
        group_code: &str,
    ) -> Result<(), PersistenceError> {
        let row = self.page_mut(code)?;
        row.parent_code = parent_code.map(str::to_string);
        row.group_code = group_code.to_string();
        Ok(())
    }

    /// `UPDATE pages SET parent_code = ?, pos = ? WHERE code = ?`
    pub fn update_tree_position(&mut self, code: &str, parent_code: &str, pos: i32) -> Result<(), PersistenceError> {
        let row = self.page_mut(code)?;
        row.parent_code = Some(parent_code.to_string());
        row.pos = pos;
        Ok(())
    }

    /// `UPDATE pages SET pos = pos + delta WHERE code = ?`
    pub fn offset_position(&mut self, code: &str, delta: i32) -> Result<(), PersistenceError> {
        let row = self.page_mut(code)?;
        row.pos += delta;
        Ok(())
    }

    /// `UPDATE pages SET pos = pos - 1 WHERE parent_code = ? AND pos > ?`
    pub fn shift_pages(&mut self, parent_code: &str, pos: i32) -> usize {
        position::shift_down(self.pages.values_mut(), parent_code, pos)
    }

    fn page_mut(&mut self, code: &str) -> Result<&mut PageRow, PersistenceError> {
        self.pages
            .get_mut(code)
            .ok_or_else(|| PersistenceError::MissingRow { table: names::PAGES, key: code.to_string() })
    }

    // ---- metadata ----

    /// Metadata row of `code` in `kind`
    pub fn metadata(&self, kind: VersionKind, code: &str) -> Option<&MetadataRow> {
        self.metadata_table(kind).get(code)
    }

    fn metadata_table(&self, kind: VersionKind) -> &BTreeMap<String, MetadataRow> {
        match kind {
            VersionKind::Draft => &self.metadata_draft,
            VersionKind::Online => &self.metadata_online,
        }
    }

    fn metadata_table_mut(&mut self, kind: VersionKind) -> &mut BTreeMap<String, MetadataRow> {
        match kind {
            VersionKind::Draft => &mut self.metadata_draft,
            VersionKind::Online => &mut self.metadata_online,
        }
    }

    /// `INSERT INTO page_metadata_*`
    pub fn insert_metadata(&mut self, kind: VersionKind, code: &str, row: MetadataRow) -> Result<(), PersistenceError> {
        let table = self.metadata_table_mut(kind);
        if table.contains_key(code) {
            return Err(PersistenceError::Constraint {
                table: metadata_name(kind),
                details: format!("duplicate code '{}'", code),
            });
        }
        table.insert(code.to_string(), row);
        Ok(())
    }

    /// `DELETE FROM page_metadata_* WHERE code = ?`
    pub fn delete_metadata(&mut self, kind: VersionKind, code: &str) -> bool {
        self.metadata_table_mut(kind).remove(code).is_some()
    }

    /// `UPDATE page_metadata_* SET updated_at = ? WHERE code = ?`
    pub fn stamp_metadata(&mut self, kind: VersionKind, code: &str, at: Timestamp) -> Result<(), PersistenceError> {
        let row = self
            .metadata_table_mut(kind)
            .get_mut(code)
            .ok_or_else(|| PersistenceError::MissingRow { table: metadata_name(kind), key: code.to_string() })?;
        row.updated_at = Some(at);
        Ok(())
    }

    // ---- widgets ----

    fn widget_table(&self, kind: VersionKind) -> &WidgetTable {
        match kind {
            VersionKind::Draft => &self.widgets_draft,
            VersionKind::Online => &self.widgets_online,
        }
    }

    fn widget_table_mut(&mut self, kind: VersionKind) -> &mut WidgetTable {
        match kind {
            VersionKind::Draft => &mut self.widgets_draft,
            VersionKind::Online => &mut self.widgets_online,
        }
    }

    /// Widget rows of a page ordered by frame
    pub fn widgets(&self, kind: VersionKind, page_code: &str) -> impl Iterator<Item = (i32, &WidgetRow)> + '_ {
        self.widget_table(kind)
            .get(page_code)
            .into_iter()
            .flat_map(|frames| frames.iter().map(|(frame, row)| (*frame, row)))
    }

    /// `INSERT INTO widget_config_*`
    pub fn insert_widget(
        &mut self,
        kind: VersionKind,
        page_code: &str,
        frame_pos: i32,
        row: WidgetRow,
    ) -> Result<(), PersistenceError> {
        let frames = self.widget_table_mut(kind).entry(page_code.to_string()).or_default();
        if frames.contains_key(&frame_pos) {
            return Err(PersistenceError::Constraint {
                table: widgets_name(kind),
                details: format!("frame {} of page '{}' already occupied", frame_pos, page_code),
            });
        }
        frames.insert(frame_pos, row);
        Ok(())
    }

    /// `DELETE FROM widget_config_* WHERE page_code = ?`
    pub fn delete_widgets(&mut self, kind: VersionKind, page_code: &str) -> usize {
        self.widget_table_mut(kind).remove(page_code).map_or(0, |frames| frames.len())
    }

    /// `DELETE FROM widget_config_* WHERE page_code = ? AND frame_pos = ?`
    pub fn delete_widget(&mut self, kind: VersionKind, page_code: &str, frame_pos: i32) -> bool {
        let table = self.widget_table_mut(kind);
        let removed = table.get_mut(page_code).and_then(|frames| frames.remove(&frame_pos)).is_some();
        if table.get(page_code).is_some_and(|frames| frames.is_empty()) {
            table.remove(page_code);
        }
        removed
    }

    /// `UPDATE widget_config_* SET frame_pos = ? WHERE page_code = ? AND frame_pos = ?`
    ///
    /// Returns the number of updated rows (0 or 1). Fails if the destination
    /// frame is occupied.
    pub fn update_widget_frame(
        &mut self,
        kind: VersionKind,
        page_code: &str,
        from: i32,
        to: i32,
    ) -> Result<usize, PersistenceError> {
        let Some(frames) = self.widget_table_mut(kind).get_mut(page_code) else {
            return Ok(0);
        };
        if !frames.contains_key(&from) {
            return Ok(0);
        }
        if frames.contains_key(&to) {
            return Err(PersistenceError::Constraint {
                table: widgets_name(kind),
                details: format!("frame {} of page '{}' already occupied", to, page_code),
            });
        }
        if let Some(row) = frames.remove(&from) {
            frames.insert(to, row);
        }
        Ok(1)
    }

    // ---- publication ----

    /// `INSERT INTO <online> SELECT ... FROM <draft> WHERE code = ?` for metadata and widgets
    pub fn copy_draft_to_online(&mut self, code: &str) -> Result<(), PersistenceError> {
        let metadata = self
            .metadata_draft
            .get(code)
            .cloned()
            .ok_or_else(|| PersistenceError::MissingRow { table: names::METADATA_DRAFT, key: code.to_string() })?;
        self.insert_metadata(VersionKind::Online, code, metadata)?;
        let rows: Vec<(i32, WidgetRow)> =
            self.widgets(VersionKind::Draft, code).map(|(frame, row)| (frame, row.clone())).collect();
        for (frame, row) in rows {
            self.insert_widget(VersionKind::Online, code, frame, row)?;
        }
        Ok(())
    }

    // ---- integrity ----

    /// Referential checks run at commit.
    ///
    /// Every parent, metadata row and widget row must reference an existing
    /// page, and every page must have a draft metadata row.
    pub fn check_references(&self) -> Result<(), PersistenceError> {
        for row in self.pages.values() {
            if let Some(parent) = &row.parent_code {
                if !self.pages.contains_key(parent) {
                    return Err(PersistenceError::Constraint {
                        table: names::PAGES,
                        details: format!("page '{}' references missing parent '{}'", row.code, parent),
                    });
                }
            }
            if !self.metadata_draft.contains_key(&row.code) {
                return Err(PersistenceError::Constraint {
                    table: names::METADATA_DRAFT,
                    details: format!("page '{}' has no draft metadata", row.code),
                });
            }
        }
        for kind in VersionKind::ALL {
            if let Some(code) = self.metadata_table(kind).keys().find(|c| !self.pages.contains_key(*c)) {
                return Err(PersistenceError::Constraint {
                    table: metadata_name(kind),
                    details: format!("metadata references missing page '{}'", code),
                });
            }
            if let Some(code) = self.widget_table(kind).keys().find(|c| !self.pages.contains_key(*c)) {
                return Err(PersistenceError::Constraint {
                    table: widgets_name(kind),
                    details: format!("widget rows reference missing page '{}'", code),
                });
            }
        }
        Ok(())
    }
}

impl Siblings for Tables {
    type Node = PageRow;

    fn lookup(&self, code: &str) -> Option<&PageRow> {
        self.pages.get(code)
    }

    fn children_positions(&self, parent_code: &str) -> Vec<Option<i32>> {
        self.pages
            .values()
            .filter(|r| r.parent_code.as_deref() == Some(parent_code))
            .map(|r| Some(r.pos))
            .collect()
    }

    fn node_count(&self) -> usize {
        self.pages.len()
    }
}
