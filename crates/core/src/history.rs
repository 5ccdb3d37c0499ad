//! Undo/redo log of committed annotation changes
//!
//! The history also hands out object identities: every committed object gets
//! the next value of a counter that never decreases, so identities of deleted
//! objects are never reused. Undo and redo do not touch the canvas directly;
//! they return a [`HistoryStep`] the engine applies.

use crate::annotation::{AnnotationGeometry, AnnotationObject, Lifecycle, ObjectId};
use crate::preset::Preset;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOp {
    Create,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub op: HistoryOp,
    /// Object present after the operation
    pub next: Option<AnnotationObject>,
    /// Object present before the operation
    pub previous: Option<AnnotationObject>,
    /// Preset of the affected object, restored if it disappeared meanwhile
    pub preset: Option<Preset>,
    pub seq: u64,
}

/// Canvas change produced by undo or redo
///
/// `remove` is applied before `add`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStep {
    pub remove: Option<ObjectId>,
    pub add: Option<AnnotationObject>,
    pub preset: Option<Preset>,
}

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    /// Number of entries currently applied; entries past it form the redo tail
    cursor: usize,
    capacity: usize,
    next_id: ObjectId,
    seq: u64,
    ongoing_edit: Option<ObjectId>,
    highlighted: Option<ObjectId>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            next_id: 1,
            seq: 0,
            ongoing_edit: None,
            highlighted: None,
        }
    }

    /// Give a draft object its identity; committed objects keep theirs
    pub fn commit(&mut self, object: &mut AnnotationObject) -> ObjectId {
        if let Some(id) = object.id() {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        object.set_lifecycle(Lifecycle::Committed(id));
        if let AnnotationGeometry::Group { objects } = &mut object.geometry {
            for child in objects {
                child.set_lifecycle(Lifecycle::Draft);
            }
        }
        id
    }

    /// Commit every draft in `objects`
    pub fn assign_ids<'a>(&mut self, objects: impl IntoIterator<Item = &'a mut AnnotationObject>) {
        for object in objects {
            self.commit(object);
        }
    }

    /// Record an operation; `next` alone is a create, `previous` alone a delete
    ///
    /// Any redo tail is dropped and the oldest entry is evicted at capacity.
    pub fn push(&mut self, next: Option<AnnotationObject>, previous: Option<AnnotationObject>, preset: Option<Preset>) {
        let op = match (&next, &previous) {
            (Some(_), None) => HistoryOp::Create,
            (None, Some(_)) => HistoryOp::Delete,
            (Some(_), Some(_)) => HistoryOp::Replace,
            (None, None) => return,
        };
        self.entries.truncate(self.cursor);
        self.seq += 1;
        self.entries.push_back(HistoryEntry { op, next, previous, preset, seq: self.seq });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len();
    }

    /// Step back over the last applied entry
    pub fn back(&mut self) -> Option<HistoryStep> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        let entry = &self.entries[self.cursor];
        Some(HistoryStep {
            remove: entry.next.as_ref().and_then(AnnotationObject::id),
            add: entry.previous.clone(),
            preset: entry.preset.clone(),
        })
    }

    /// Re-apply the first entry of the redo tail
    pub fn redo(&mut self) -> Option<HistoryStep> {
        let entry = self.entries.get(self.cursor)?;
        let step = HistoryStep {
            remove: entry.previous.as_ref().and_then(AnnotationObject::id),
            add: entry.next.clone(),
            preset: entry.preset.clone(),
        };
        self.cursor += 1;
        Some(step)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Applied entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().take(self.cursor)
    }

    /// Drop all entries; identities keep increasing
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.ongoing_edit = None;
        self.highlighted = None;
    }

    pub fn set_ongoing_edit(&mut self, id: Option<ObjectId>) {
        self.ongoing_edit = id;
    }

    pub fn ongoing_edit(&self) -> Option<ObjectId> {
        self.ongoing_edit
    }

    pub fn is_ongoing_edit_of(&self, id: ObjectId) -> bool {
        self.ongoing_edit == Some(id)
    }

    pub fn highlight(&mut self, id: Option<ObjectId>) {
        self.highlighted = id;
    }

    pub fn highlighted(&self) -> Option<ObjectId> {
        self.highlighted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(x: f64) -> AnnotationObject {
        AnnotationObject::new("rect", AnnotationGeometry::Rect { left: x, top: 0.0, width: 1.0, height: 1.0 })
    }

    #[test]
    fn test_identities_are_never_reused() {
        let mut history = History::new(50);
        let mut a = draft(0.0);
        let mut b = draft(1.0);
        let first = history.commit(&mut a);
        assert_eq!(history.commit(&mut a), first);
        history.clear();
        let second = history.commit(&mut b);
        assert!(second > first);
    }

    #[test]
    fn test_create_back_redo() {
        let mut history = History::new(50);
        let mut object = draft(0.0);
        let id = history.commit(&mut object);
        history.push(Some(object.clone()), None, None);

        let undo = history.back().expect("undoable");
        assert_eq!(undo.remove, Some(id));
        assert!(undo.add.is_none());
        assert!(history.back().is_none());

        let redo = history.redo().expect("redoable");
        assert_eq!(redo.remove, None);
        assert_eq!(redo.add, Some(object));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_replace_swaps_both_ways() {
        let mut history = History::new(50);
        let mut before = draft(0.0);
        let id = history.commit(&mut before);
        let after = before.with_geometry(AnnotationGeometry::Rect { left: 5.0, top: 0.0, width: 1.0, height: 1.0 });
        history.push(Some(after.clone()), Some(before.clone()), None);
        assert_eq!(history.entries().last().map(|e| e.op), Some(HistoryOp::Replace));

        let undo = history.back().expect("undoable");
        assert_eq!((undo.remove, undo.add), (Some(id), Some(before)));
        let redo = history.redo().expect("redoable");
        assert_eq!((redo.remove, redo.add), (Some(id), Some(after)));
    }

    #[test]
    fn test_new_operation_clears_redo_tail() {
        let mut history = History::new(50);
        for x in 0..3 {
            let mut object = draft(x as f64);
            history.commit(&mut object);
            history.push(Some(object), None, None);
        }
        history.back();
        history.back();
        assert!(history.can_redo());

        let mut object = draft(9.0);
        history.commit(&mut object);
        history.push(Some(object), None, None);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = History::new(2);
        let mut ids = Vec::new();
        for x in 0..3 {
            let mut object = draft(x as f64);
            ids.push(history.commit(&mut object));
            history.push(Some(object), None, None);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.back().and_then(|s| s.remove), Some(ids[2]));
        assert_eq!(history.back().and_then(|s| s.remove), Some(ids[1]));
        assert!(history.back().is_none());
    }

    #[test]
    fn test_empty_push_is_ignored() {
        let mut history = History::new(5);
        history.push(None, None, None);
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }
}
