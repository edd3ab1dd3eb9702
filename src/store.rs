use std::collections::HashMap;

use crate::domain::Layer;
use crate::error::{Error, Result};

/// Holds every layer of a session, keyed by its declared id.
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: HashMap<String, Layer>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer under its id. Registering a second layer with the
    /// same id is a caller error, never a silent replacement.
    pub fn insert(&mut self, layer: Layer) -> Result<()> {
        let id = layer.id().to_string();
        if self.layers.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "a layer with id {id} is already registered"
            )));
        }
        self.layers.insert(id, layer);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Layer> {
        self.layers
            .get(id)
            .ok_or_else(|| Error::LayerNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}
