use geo::Geometry;
use log::debug;
use wkt::TryFromWkt;

use crate::domain::{Dimension, Feature, GeometryRecord, LayerFile, LayerType};
use crate::error::{Error, Result};
use crate::geometry::Reproject;
use crate::mesh::triangulation::triangulate_ring;

/// Coordinates are rounded to 4 decimal digits to bound output size.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Insert a zero z component (plus optional offset) into a flat 2D array.
pub fn promote_to_3d(nodes: &[f64], z_offset: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(nodes.len() / 2 * 3);
    for chunk in nodes.chunks_exact(2) {
        out.push(chunk[0]);
        out.push(chunk[1]);
        out.push(z_offset);
    }
    out
}

fn flatten_polygons(geometry: &Geometry<f64>) -> Result<Vec<&geo::Polygon<f64>>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![polygon]),
        Geometry::MultiPolygon(multi) => Ok(multi.0.iter().collect()),
        other => Err(Error::InvalidGeometry(format!(
            "expected Polygon or MultiPolygon, got {}",
            geometry_name(other)
        ))),
    }
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Triangulate polygonal geometries into render-ready mesh features.
///
/// Each input geometry becomes one feature. MultiPolygons are flattened into
/// their constituent polygons, and the indices of every polygon after the
/// first are offset by the vertices already emitted, so they stay valid into
/// the feature's shared coordinate buffer. Vertices get an explicit zero z.
pub fn mesh_from_geometries(geometries: &[Geometry<f64>]) -> Result<Vec<Feature>> {
    let mut features = Vec::with_capacity(geometries.len());

    for geometry in geometries {
        let mut coordinates: Vec<f64> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();

        for polygon in flatten_polygons(geometry)? {
            let exterior = polygon.exterior();
            // drop the closing point, it repeats the first
            let open = &exterior.0[..exterior.0.len().saturating_sub(1)];
            let ring: Vec<(f64, f64)> = open.iter().map(|c| (c.x, c.y)).collect();

            let offset = (coordinates.len() / 3) as u32;
            indices.extend(triangulate_ring(&ring).into_iter().map(|i| i + offset));

            let flat: Vec<f64> = ring.iter().flat_map(|&(x, y)| [x, y]).collect();
            coordinates.extend(promote_to_3d(&flat, 0.0).into_iter().map(round4));
        }

        features.push(Feature::from_geometry(GeometryRecord {
            coordinates: Some(coordinates.into()),
            indices: Some(indices.into()),
            ..Default::default()
        }));
    }

    Ok(features)
}

/// Build a triangulated layer from polygonal geometries.
pub fn mesh_layer(
    id: &str,
    geometries: &[Geometry<f64>],
    render_style: Vec<String>,
    style_key: &str,
) -> Result<LayerFile> {
    let data = mesh_from_geometries(geometries)?;
    debug!("meshed {} features for layer {id}", data.len());
    Ok(LayerFile {
        id: id.to_string(),
        layer_type: LayerType::Triangles3d,
        render_style,
        style_key: style_key.to_string(),
        data,
    })
}

/// Build a triangulated layer from WKT polygon records.
///
/// WKT coordinates are `(lon lat)` when `src_crs` is 4326; rings are
/// reprojected to world-mercator meters before triangulation.
pub fn layer_from_wkt(
    id: &str,
    records: &[&str],
    src_crs: &str,
    reprojector: &dyn Reproject,
) -> Result<LayerFile> {
    let mut geometries = Vec::with_capacity(records.len());

    for record in records {
        let geometry: Geometry<f64> = Geometry::try_from_wkt_str(record)
            .map_err(|e| Error::InvalidGeometry(format!("bad WKT record: {e}")))?;
        geometries.push(reproject_geometry(&geometry, src_crs, reprojector)?);
    }

    mesh_layer(id, &geometries, vec!["FLAT_COLOR".to_string()], "surface")
}

fn reproject_geometry(
    geometry: &Geometry<f64>,
    src_crs: &str,
    reprojector: &dyn Reproject,
) -> Result<Geometry<f64>> {
    let mut out = Vec::new();

    for polygon in flatten_polygons(geometry)? {
        // WKT order is (x y) = (lon lat); the reprojector wants lat first
        let flat: Vec<f64> = polygon
            .exterior()
            .0
            .iter()
            .flat_map(|c| [c.y, c.x])
            .collect();
        let projected = reprojector.reproject(&flat, Dimension::Two, src_crs, "3395")?;
        let ring: Vec<(f64, f64)> = projected.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        out.push(geo::Polygon::new(geo::LineString::from(ring), vec![]));
    }

    Ok(Geometry::MultiPolygon(geo::MultiPolygon(out)))
}

/// Build a points layer from a raw numeric point cloud (flat 3D triples,
/// already in meters). A single feature holds the whole cloud, optionally
/// translated so its centroid sits at `center_around`.
pub fn layer_from_points(id: &str, coordinates: &[f64], center_around: Option<[f64; 3]>) -> LayerFile {
    let mut coordinates = coordinates.to_vec();

    if let Some(center) = center_around {
        let count = (coordinates.len() / 3).max(1) as f64;
        let mut mean = [0.0f64; 3];
        for chunk in coordinates.chunks_exact(3) {
            for axis in 0..3 {
                mean[axis] += chunk[axis];
            }
        }
        for axis in 0..3 {
            mean[axis] /= count;
        }
        for chunk in coordinates.chunks_exact_mut(3) {
            for axis in 0..3 {
                chunk[axis] += center[axis] - mean[axis];
            }
        }
    }

    let coordinates: Vec<f64> = coordinates.into_iter().map(round4).collect();

    LayerFile {
        id: id.to_string(),
        layer_type: LayerType::Points,
        render_style: vec!["FLAT_COLOR_POINTS".to_string()],
        style_key: "surface".to_string(),
        data: vec![Feature::from_geometry(GeometryRecord {
            coordinates: Some(coordinates.into()),
            ..Default::default()
        })],
    }
}
