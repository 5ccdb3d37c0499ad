//! Ordered collection of objects shown over the slide
//!
//! Items are addressed by a [`CanvasHandle`] that stays valid while the item
//! is on the canvas, independent of its lifecycle. Committed objects are also
//! reachable through their identity. Order is rendering order, last on top.

use crate::annotation::{AnnotationObject, ImagePoint, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasHandle(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasItem {
    pub handle: CanvasHandle,
    pub object: AnnotationObject,
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    items: Vec<CanvasItem>,
    next_handle: u64,
    active: Option<CanvasHandle>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append on top
    pub fn add(&mut self, object: AnnotationObject) -> CanvasHandle {
        self.next_handle += 1;
        let handle = CanvasHandle(self.next_handle);
        self.items.push(CanvasItem { handle, object });
        handle
    }

    fn index(&self, handle: CanvasHandle) -> Option<usize> {
        self.items.iter().position(|item| item.handle == handle)
    }

    pub fn contains(&self, handle: CanvasHandle) -> bool {
        self.index(handle).is_some()
    }

    pub fn get(&self, handle: CanvasHandle) -> Option<&AnnotationObject> {
        self.items.iter().find(|item| item.handle == handle).map(|item| &item.object)
    }

    pub fn get_mut(&mut self, handle: CanvasHandle) -> Option<&mut AnnotationObject> {
        self.items.iter_mut().find(|item| item.handle == handle).map(|item| &mut item.object)
    }

    pub fn remove(&mut self, handle: CanvasHandle) -> Option<AnnotationObject> {
        let index = self.index(handle)?;
        if self.active == Some(handle) {
            self.active = None;
        }
        Some(self.items.remove(index).object)
    }

    /// Swap the object in place, keeping handle and stacking position
    pub fn replace(&mut self, handle: CanvasHandle, object: AnnotationObject) -> Option<AnnotationObject> {
        let slot = self.get_mut(handle)?;
        Some(std::mem::replace(slot, object))
    }

    pub fn find(&self, id: ObjectId) -> Option<CanvasHandle> {
        self.items.iter().find(|item| item.object.id() == Some(id)).map(|item| item.handle)
    }

    /// Items bottom to top
    pub fn items(&self) -> std::slice::Iter<'_, CanvasItem> {
        self.items.iter()
    }

    /// Move an item below all others
    pub fn send_to_back(&mut self, handle: CanvasHandle) -> bool {
        let Some(index) = self.index(handle) else {
            return false;
        };
        let item = self.items.remove(index);
        self.items.insert(0, item);
        true
    }

    pub fn objects(&self) -> impl Iterator<Item = &AnnotationObject> {
        self.items.iter().map(|item| &item.object)
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut AnnotationObject> {
        self.items.iter_mut().map(|item| &mut item.object)
    }

    /// Committed objects only
    pub fn annotations(&self) -> impl Iterator<Item = &AnnotationObject> {
        self.objects().filter(|object| object.is_committed())
    }

    pub fn handles(&self) -> Vec<CanvasHandle> {
        self.items.iter().map(|item| item.handle).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active(&self) -> Option<CanvasHandle> {
        self.active
    }

    pub fn active_object(&self) -> Option<&AnnotationObject> {
        self.active.and_then(|handle| self.get(handle))
    }

    pub fn set_active(&mut self, handle: Option<CanvasHandle>) -> bool {
        match handle {
            Some(handle) if !self.contains(handle) => false,
            _ => {
                self.active = handle;
                true
            }
        }
    }

    /// Objects under `point`, topmost first
    pub fn hit(&self, point: &ImagePoint, tolerance: f64) -> Vec<CanvasHandle> {
        self.items
            .iter()
            .rev()
            .filter(|item| item.object.selectable && item.object.hit_test(point, tolerance))
            .map(|item| item.handle)
            .collect()
    }

    /// Stable sort by a per-object key
    pub fn sort_by_key<K, F>(&mut self, mut key: F)
    where
        K: Ord,
        F: FnMut(&AnnotationObject) -> K,
    {
        self.items.sort_by_key(|item| key(&item.object));
    }

    /// Remove everything, returning the objects bottom to top
    pub fn clear(&mut self) -> Vec<AnnotationObject> {
        self.active = None;
        self.items.drain(..).map(|item| item.object).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationGeometry, Lifecycle};

    fn square(left: f64) -> AnnotationObject {
        AnnotationObject::new("rect", AnnotationGeometry::Rect { left, top: 0.0, width: 10.0, height: 10.0 })
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut canvas = Canvas::new();
        let a = canvas.add(square(0.0));
        let b = canvas.add(square(20.0));
        canvas.replace(a, square(100.0)).expect("present");
        assert_eq!(canvas.handles(), vec![a, b]);
        assert_eq!(canvas.get(a).map(|o| o.bounding_box().x), Some(100.0));
    }

    #[test]
    fn test_hit_is_topmost_first() {
        let mut canvas = Canvas::new();
        let bottom = canvas.add(square(0.0));
        let top = canvas.add(square(5.0));
        assert_eq!(canvas.hit(&ImagePoint::new(7.0, 5.0), 0.0), vec![top, bottom]);
        assert_eq!(canvas.hit(&ImagePoint::new(2.0, 5.0), 0.0), vec![bottom]);

        assert!(canvas.send_to_back(top));
        assert_eq!(canvas.hit(&ImagePoint::new(7.0, 5.0), 0.0), vec![bottom, top]);
    }

    #[test]
    fn test_find_by_identity_and_active_cleanup() {
        let mut canvas = Canvas::new();
        let mut object = square(0.0);
        object.set_lifecycle(Lifecycle::Committed(7));
        let handle = canvas.add(object);
        canvas.add(square(50.0));

        assert_eq!(canvas.find(7), Some(handle));
        assert_eq!(canvas.annotations().count(), 1);
        assert!(canvas.set_active(Some(handle)));
        canvas.remove(handle);
        assert!(canvas.active().is_none());
    }
}
