pub mod projection;
pub mod views;

pub use projection::{Reproject, WorldMercator};
pub use views::{
    LayerViews, LevelGeometry, ObjectEntry, ObjectGeometry, Vertex3dEntry, VertexEntry,
};
