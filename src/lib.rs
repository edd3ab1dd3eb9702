//! Geospatial layer joins and mesh serialization for urban scenes.
//!
//! Layers are collections of features kept in three parallel geometric
//! resolutions (objects, vertices, 3D vertices). The crate joins layer
//! pairs spatially, persists the results as per-layer join documents,
//! triangulates polygon soup into render-ready meshes and packs the
//! resulting flat arrays into sidecar binary buffers.

pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod geometry;
pub mod join;
pub mod mesh;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use session::Session;
