//! Fixed-size widget slot array of a page version
//!
//! One slot per frame of the page model. The length is fixed at construction
//! and every accessor is bounds-checked against it; frame indices are `i32`
//! because callers and persisted rows may carry negative values.

use std::ops::Index;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::WidgetInstance;

/// Frame position used to park a widget row while two frames are swapped
pub const DEFAULT_SENTINEL_FRAME: i32 = -9999;

/// Widget slots of one page version, indexed by frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetSlotTable {
    slots: Box<[Option<WidgetInstance>]>,
}

impl WidgetSlotTable {
    /// Table with `frame_count` empty slots
    pub fn new(frame_count: usize) -> Self {
        Self { slots: vec![None; frame_count].into_boxed_slice() }
    }

    /// Build from persisted `(frame, widget)` rows.
    ///
    /// Rows whose frame falls outside `[0, frame_count)` are skipped with a
    /// warning; they are left behind when a model loses frames.
    pub fn from_rows<I>(page_code: &str, frame_count: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = (i32, WidgetInstance)>,
    {
        let mut table = Self::new(frame_count);
        for (frame, widget) in rows {
            match table.index_of(frame) {
                Ok(idx) => table.slots[idx] = Some(widget),
                Err(_) => warn!(
                    page = page_code,
                    frame,
                    frame_count,
                    "widget frame exceeds the number of frames of the page model, skipping"
                ),
            }
        }
        table
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether `frame` is a valid index
    pub fn contains_frame(&self, frame: i32) -> bool {
        self.index_of(frame).is_ok()
    }

    fn index_of(&self, frame: i32) -> Result<usize> {
        usize::try_from(frame)
            .ok()
            .filter(|&idx| idx < self.slots.len())
            .ok_or(Error::FrameOutOfBounds { frame, frame_count: self.slots.len() })
    }

    /// Widget in `frame`, if any
    pub fn get(&self, frame: i32) -> Result<Option<&WidgetInstance>> {
        let idx = self.index_of(frame)?;
        Ok(self.slots[idx].as_ref())
    }

    /// Place `widget` in `frame`, returning the previous occupant
    pub fn set(&mut self, frame: i32, widget: WidgetInstance) -> Result<Option<WidgetInstance>> {
        let idx = self.index_of(frame)?;
        Ok(self.slots[idx].replace(widget))
    }

    /// Empty `frame`, returning the previous occupant
    pub fn clear(&mut self, frame: i32) -> Result<Option<WidgetInstance>> {
        let idx = self.index_of(frame)?;
        Ok(self.slots[idx].take())
    }

    /// Swap the contents of two frames.
    ///
    /// Mirrors the persisted three-step move: park `from`, move `to` into
    /// `from`, then drop the parked widget into `to`.
    pub fn move_widget(&mut self, from: i32, to: i32) -> Result<()> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        if from_idx == to_idx {
            return Ok(());
        }
        let parked = self.slots[from_idx].take();
        self.slots[from_idx] = self.slots[to_idx].take();
        self.slots[to_idx] = parked;
        Ok(())
    }

    /// All slots in frame order
    pub fn slots(&self) -> &[Option<WidgetInstance>] {
        &self.slots
    }

    /// Occupied slots as `(frame, widget)`
    pub fn occupied(&self) -> impl Iterator<Item = (i32, &WidgetInstance)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|w| (idx as i32, w)))
    }

    /// Whether any slot holds a widget of `type_code`
    pub fn contains_type(&self, type_code: &str) -> bool {
        self.occupied().any(|(_, w)| w.type_code == type_code)
    }
}

impl Index<usize> for WidgetSlotTable {
    type Output = Option<WidgetInstance>;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.slots[idx]
    }
}
