pub mod surface;
pub mod triangulation;

pub use surface::{layer_from_points, layer_from_wkt, mesh_from_geometries, mesh_layer};
pub use triangulation::{deviation, triangulate_ring};
