//! Z-ordered layers annotation objects belong to

use crate::annotation::now_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub id: String,
    /// Rendering order; unique and only ever increasing
    pub position: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
    active: Option<String>,
    last_position: u64,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn unique_id(&self) -> String {
        let base = now_millis().to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.get(&id).is_some() {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        id
    }

    /// Create a layer; an existing id returns the existing layer
    ///
    /// The boolean is true when a layer was actually added. The first layer
    /// becomes the active one.
    pub fn create(&mut self, id: Option<&str>) -> (Layer, bool) {
        if let Some(existing) = id.and_then(|id| self.get(id)) {
            return (existing.clone(), false);
        }
        let id = id.map(str::to_string).unwrap_or_else(|| self.unique_id());
        self.last_position += 1;
        let layer = Layer { id, position: self.last_position };
        self.layers.push(layer.clone());
        if self.active.is_none() {
            self.active = Some(layer.id.clone());
        }
        tracing::debug!(layer = %layer.id, position = layer.position, "layer created");
        (layer, true)
    }

    pub fn get(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn active(&self) -> Option<&Layer> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.active = Some(id.to_string());
        true
    }

    /// Remove a layer; removing the active one activates the highest remaining layer
    pub fn remove(&mut self, id: &str) -> Option<Layer> {
        let index = self.layers.iter().position(|layer| layer.id == id)?;
        let removed = self.layers.remove(index);
        if self.active.as_deref() == Some(id) {
            self.active = self.layers.iter().max_by_key(|layer| layer.position).map(|layer| layer.id.clone());
        }
        Some(removed)
    }

    pub fn position_of(&self, id: &str) -> Option<u64> {
        self.get(id).map(|layer| layer.position)
    }

    /// Layers in ascending rendering order
    pub fn sorted(&self) -> Vec<&Layer> {
        let mut layers: Vec<&Layer> = self.layers.iter().collect();
        layers.sort_by_key(|layer| layer.position);
        layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
