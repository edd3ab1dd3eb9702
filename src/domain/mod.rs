pub mod feature;
pub mod layer;

pub use feature::{
    AbstractLayerFile, Feature, GeometryRecord, LayerFile, LayerType, NumericField, PackedRef,
};
pub use layer::{Dimension, Layer};
