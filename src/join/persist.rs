//! On-disk join documents. Every left layer owns a single
//! `<id>_joined.json` file accumulating the joins computed against it.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::join::{Level, SpatialRelation};

/// Identity of one computed join, as stored alongside its per-feature
/// results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRecord {
    pub spatial_relation: SpatialRelation,
    #[serde(rename = "layerId")]
    pub layer_id: String,
    #[serde(rename = "outLevel")]
    pub out_level: Level,
    #[serde(rename = "inLevel")]
    pub in_level: Level,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
}

/// Per-feature results of one join. Object joins fill `in_ids` with the
/// matched right ids per left feature; abstract joins fill `in_values`
/// with one aggregated scalar per left feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedObjects {
    #[serde(rename = "joinedLayerIndex")]
    pub joined_layer_index: usize,
    #[serde(rename = "inIds", skip_serializing_if = "Option::is_none")]
    pub in_ids: Option<Vec<Option<Vec<u32>>>>,
    #[serde(rename = "inValues", skip_serializing_if = "Option::is_none")]
    pub in_values: Option<Vec<f64>>,
}

/// Aggregate join file of one left layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinDocument {
    #[serde(rename = "joinedLayers")]
    pub joined_layers: Vec<JoinRecord>,
    #[serde(rename = "joinedObjects")]
    pub joined_objects: Vec<JoinedObjects>,
}

impl JoinDocument {
    /// Index of a record matching the given identity, if already present.
    pub fn find_record(&self, record: &JoinRecord) -> Option<usize> {
        self.joined_layers.iter().position(|r| r == record)
    }

    /// Register a join record, returning its index. An identical record is
    /// reused so recomputing a join never duplicates it.
    pub fn upsert_record(&mut self, record: JoinRecord) -> usize {
        match self.find_record(&record) {
            Some(index) => index,
            None => {
                self.joined_layers.push(record);
                self.joined_layers.len() - 1
            }
        }
    }

    /// Store the results for one record, replacing any previous results of
    /// the same record.
    pub fn set_objects(&mut self, objects: JoinedObjects) {
        match self
            .joined_objects
            .iter_mut()
            .find(|o| o.joined_layer_index == objects.joined_layer_index)
        {
            Some(existing) => *existing = objects,
            None => self.joined_objects.push(objects),
        }
    }
}

fn joined_path(work_dir: &Path, layer_id: &str) -> PathBuf {
    work_dir.join(format!("{layer_id}_joined.json"))
}

/// Read a layer's join document from the working directory. A missing file
/// is an empty document, not an error.
pub fn load_joined(work_dir: &Path, layer_id: &str) -> Result<JoinDocument> {
    let path = joined_path(work_dir, layer_id);
    if !path.exists() {
        debug!("no join document for layer {layer_id}, starting empty");
        return Ok(JoinDocument::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a layer's join document into the working directory.
pub fn save_joined(work_dir: &Path, layer_id: &str, document: &JoinDocument) -> Result<()> {
    if !work_dir.is_dir() {
        return Err(Error::FileSystem(work_dir.to_path_buf()));
    }
    let path = joined_path(work_dir, layer_id);
    debug!(
        "writing join document for layer {layer_id} ({} records)",
        document.joined_layers.len()
    );
    fs::write(&path, serde_json::to_string(document)?)?;
    Ok(())
}
