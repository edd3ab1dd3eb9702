use serde::{Deserialize, Serialize};

/// An `[offset, count]` reference into a sibling `.data` file, counted in
/// elements of the array kind it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedRef(pub u64, pub u64);

impl PackedRef {
    pub fn offset(&self) -> usize {
        self.0 as usize
    }

    pub fn count(&self) -> usize {
        self.1 as usize
    }
}

/// A numeric geometry field, either inline values or a packed reference.
///
/// The wire format cannot fully distinguish the two: a reference is a plain
/// two-element array of non-negative integers, so an inline integer array of
/// length two parses as `Packed`. Interpretation is contextual, exactly as in
/// the layer files this crate exchanges: the codec's `encode` replaces inline
/// arrays with references and `decode` resolves references back to values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField<T> {
    Packed(PackedRef),
    Inline(Vec<T>),
}

impl<T> NumericField<T> {
    pub fn inline(&self) -> Option<&[T]> {
        match self {
            NumericField::Inline(values) => Some(values),
            NumericField::Packed(_) => None,
        }
    }

    pub fn packed(&self) -> Option<PackedRef> {
        match self {
            NumericField::Packed(r) => Some(*r),
            NumericField::Inline(_) => None,
        }
    }
}

impl<T> From<Vec<T>> for NumericField<T> {
    fn from(values: Vec<T>) -> Self {
        NumericField::Inline(values)
    }
}

/// Per-feature geometry record as it appears in a layer JSON file.
///
/// `coordinates` is a flat list. `section_footprint` is the distinguished 2D
/// base polygon of an extruded solid (buildings): when present it supplies
/// the object polygon for 2D joins while `coordinates` supplies the full 3D
/// vertex cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<NumericField<f64>>,
    #[serde(
        rename = "sectionFootprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub section_footprint: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<NumericField<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<NumericField<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<NumericField<u32>>,
}

/// One feature: a geometry record plus arbitrary attribute fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: GeometryRecord,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    pub fn from_geometry(geometry: GeometryRecord) -> Self {
        Self {
            geometry,
            attributes: serde_json::Map::new(),
        }
    }
}

/// Render type of a physical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerType {
    #[serde(rename = "TRIANGLES_3D_LAYER")]
    Triangles3d,
    #[serde(rename = "LINES_3D_LAYER")]
    Lines3d,
    #[serde(rename = "POINTS_LAYER")]
    Points,
}

/// A physical layer file: `{ id, type, renderStyle, styleKey, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerFile {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    #[serde(rename = "renderStyle")]
    pub render_style: Vec<String>,
    #[serde(rename = "styleKey")]
    pub style_key: String,
    pub data: Vec<Feature>,
}

/// An abstract layer: a flat coordinate array with a parallel scalar per
/// vertex, representing a continuous data field rather than objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractLayerFile {
    pub id: String,
    pub coordinates: Vec<f64>,
    pub values: Vec<f64>,
}
