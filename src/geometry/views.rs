use geo::{Coord, LineString, Point, Polygon, coord};

use crate::domain::{AbstractLayerFile, Dimension, LayerFile};
use crate::error::{Error, Result};

/// Geometry of one object: single-vertex features are points, features
/// with 3 or more vertices close into a polygon.
#[derive(Debug, Clone)]
pub enum ObjectGeometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
}

/// One object, keyed by the id of the feature it came from.
///
/// Two-vertex features are degenerate and never appear here, so ids may
/// skip but always point back at the source feature.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub id: u32,
    pub geometry: ObjectGeometry,
}

/// One 2D vertex point. Ids increase monotonically across all features of
/// the layer. Abstract layers carry the vertex scalar in `value`.
#[derive(Debug, Clone)]
pub struct VertexEntry {
    pub id: u32,
    pub point: Point<f64>,
    pub value: Option<f64>,
}

/// One 3D vertex, present only when the source geometry has a third
/// dimension (or one was reconstructed for a triangulated mesh).
#[derive(Debug, Clone)]
pub struct Vertex3dEntry {
    pub id: u32,
    pub position: [f64; 3],
    pub value: Option<f64>,
}

/// The three parallel geometric resolutions of a layer.
#[derive(Debug, Clone, Default)]
pub struct LayerViews {
    pub objects: Vec<ObjectEntry>,
    pub coordinates: Vec<VertexEntry>,
    pub coordinates3d: Option<Vec<Vertex3dEntry>>,
}

/// A borrowed geometry from one of the 2D views, used by spatial joins.
#[derive(Debug, Clone, Copy)]
pub enum LevelGeometry<'a> {
    Point(&'a Point<f64>),
    Polygon(&'a Polygon<f64>),
}

fn inline_coordinates(layer_id: &str, index: usize, geometry: &crate::domain::GeometryRecord) -> Result<Vec<f64>> {
    match &geometry.coordinates {
        Some(field) => field.inline().map(|v| v.to_vec()).ok_or_else(|| {
            Error::InvalidGeometry(format!(
                "feature {index} of layer {layer_id} has packed coordinates; decode the layer first"
            ))
        }),
        None => Err(Error::InvalidGeometry(format!(
            "feature {index} of layer {layer_id} has no coordinates"
        ))),
    }
}

/// Derive the three views of a physical layer.
///
/// For every feature the flat coordinate list is grouped into 2D pairs (a
/// third dimension, when present, feeds the 3D view instead); pairs become
/// vertex points and, when at least 3 exist, a closed object polygon. A
/// single pair yields a point object instead. A footprint replaces the flat
/// list for the 2D views while the full vertex cloud still populates the 3D
/// view.
pub fn physical_views(file: &LayerFile, dim: Dimension) -> Result<LayerViews> {
    let mut views = LayerViews::default();
    let mut tridimensional: Vec<Vertex3dEntry> = Vec::new();
    let mut vertex_id: u32 = 0;
    let mut vertex3d_id: u32 = 0;

    for (index, feature) in file.data.iter().enumerate() {
        let geometry = &feature.geometry;

        let (flat, step) = match &geometry.section_footprint {
            Some(rings) => {
                let outer = rings.first().ok_or_else(|| {
                    Error::InvalidGeometry(format!(
                        "feature {index} of layer {} has an empty footprint",
                        file.id
                    ))
                })?;
                // footprints are the 2D base polygon of an extruded solid
                (outer.clone(), 2)
            }
            None => (inline_coordinates(&file.id, index, geometry)?, dim.size()),
        };

        let mut grouped: Vec<Coord<f64>> = Vec::with_capacity(flat.len() / step);

        for chunk in flat.chunks_exact(step) {
            let (x, y) = (chunk[0], chunk[1]);
            views.coordinates.push(VertexEntry {
                id: vertex_id,
                point: Point::new(x, y),
                value: None,
            });
            vertex_id += 1;
            grouped.push(coord! { x: x, y: y });

            if step == 3 {
                tridimensional.push(Vertex3dEntry {
                    id: vertex3d_id,
                    position: [x, y, chunk[2]],
                    value: None,
                });
                vertex3d_id += 1;
            }
        }

        // an extruded solid keeps its full vertex cloud in the 3D view
        if geometry.section_footprint.is_some() {
            if let Some(cloud) = geometry.coordinates.as_ref().and_then(|c| c.inline()) {
                for chunk in cloud.chunks_exact(3) {
                    tridimensional.push(Vertex3dEntry {
                        id: vertex3d_id,
                        position: [chunk[0], chunk[1], chunk[2]],
                        value: None,
                    });
                    vertex3d_id += 1;
                }
            }
        }

        if grouped.len() >= 3 {
            views.objects.push(ObjectEntry {
                id: index as u32,
                geometry: ObjectGeometry::Polygon(Polygon::new(LineString::from(grouped), vec![])),
            });
        } else if let [only] = grouped.as_slice() {
            views.objects.push(ObjectEntry {
                id: index as u32,
                geometry: ObjectGeometry::Point(Point::from(*only)),
            });
        }
    }

    if !tridimensional.is_empty() {
        views.coordinates3d = Some(tridimensional);
    }

    Ok(views)
}

/// Derive the views of an abstract layer: one vertex per coordinate group,
/// each carrying its scalar. No objects view is produced.
pub fn abstract_views(file: &AbstractLayerFile, dim: Dimension) -> Result<LayerViews> {
    let step = dim.size();
    let count = file.coordinates.len() / step;

    if file.values.len() != count {
        return Err(Error::InvalidArgument(format!(
            "abstract layer {} has {} values for {} vertices",
            file.id,
            file.values.len(),
            count
        )));
    }

    let mut views = LayerViews::default();
    let mut tridimensional: Vec<Vertex3dEntry> = Vec::new();

    for (id, chunk) in file.coordinates.chunks_exact(step).enumerate() {
        let value = file.values[id];
        views.coordinates.push(VertexEntry {
            id: id as u32,
            point: Point::new(chunk[0], chunk[1]),
            value: Some(value),
        });

        if step == 3 {
            tridimensional.push(Vertex3dEntry {
                id: id as u32,
                position: [chunk[0], chunk[1], chunk[2]],
                value: Some(value),
            });
        }
    }

    if !tridimensional.is_empty() {
        views.coordinates3d = Some(tridimensional);
    }

    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Feature, GeometryRecord, LayerType};

    fn physical_file(id: &str, features: Vec<Feature>) -> LayerFile {
        LayerFile {
            id: id.to_string(),
            layer_type: LayerType::Triangles3d,
            render_style: vec!["FLAT_COLOR".to_string()],
            style_key: "surface".to_string(),
            data: features,
        }
    }

    fn polygon_feature(flat: Vec<f64>) -> Feature {
        Feature::from_geometry(GeometryRecord {
            coordinates: Some(flat.into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_physical_views_2d() {
        let file = physical_file(
            "squares",
            vec![polygon_feature(vec![
                0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0,
            ])],
        );

        let views = physical_views(&file, Dimension::Two).unwrap();
        assert_eq!(views.objects.len(), 1);
        assert_eq!(views.objects[0].id, 0);
        assert_eq!(views.coordinates.len(), 4);
        assert_eq!(views.coordinates[3].id, 3);
        assert!(views.coordinates3d.is_none());
    }

    #[test]
    fn test_physical_views_3d() {
        let file = physical_file(
            "terrain",
            vec![polygon_feature(vec![
                0.0, 0.0, 5.0, 1.0, 0.0, 5.0, 1.0, 1.0, 5.0,
            ])],
        );

        let views = physical_views(&file, Dimension::Three).unwrap();
        assert_eq!(views.objects.len(), 1);
        assert_eq!(views.coordinates.len(), 3);
        let tri = views.coordinates3d.as_ref().unwrap();
        assert_eq!(tri.len(), 3);
        assert_eq!(tri[0].position, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_degenerate_polygon_excluded() {
        let file = physical_file(
            "lines",
            vec![
                polygon_feature(vec![0.0, 0.0, 1.0, 0.0]),
                polygon_feature(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]),
            ],
        );

        let views = physical_views(&file, Dimension::Two).unwrap();
        // the 2-vertex feature is degenerate but its id survives on the kept one
        assert_eq!(views.objects.len(), 1);
        assert_eq!(views.objects[0].id, 1);
        assert_eq!(views.coordinates.len(), 6);
    }

    #[test]
    fn test_footprint_splits_views() {
        let footprint = vec![0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0];
        let cloud = vec![
            0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 10.0, 2.0, 0.0,
            10.0, 2.0, 2.0, 10.0, 0.0, 2.0, 10.0,
        ];
        let feature = Feature::from_geometry(GeometryRecord {
            coordinates: Some(cloud.into()),
            section_footprint: Some(vec![footprint]),
            ..Default::default()
        });
        let file = physical_file("buildings", vec![feature]);

        let views = physical_views(&file, Dimension::Three).unwrap();
        // 2D views come from the footprint, the 3D view from the vertex cloud
        assert_eq!(views.objects.len(), 1);
        assert_eq!(views.coordinates.len(), 4);
        assert_eq!(views.coordinates3d.as_ref().unwrap().len(), 8);
    }

    #[test]
    fn test_single_vertex_feature_is_point_object() {
        let file = physical_file("pois", vec![polygon_feature(vec![3.0, 4.0])]);

        let views = physical_views(&file, Dimension::Two).unwrap();
        assert_eq!(views.objects.len(), 1);
        assert!(matches!(
            &views.objects[0].geometry,
            ObjectGeometry::Point(p) if *p == Point::new(3.0, 4.0)
        ));
    }

    #[test]
    fn test_abstract_views_carry_values() {
        let file = AbstractLayerFile {
            id: "noise".to_string(),
            coordinates: vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0],
            values: vec![10.0, 20.0, 30.0],
        };

        let views = abstract_views(&file, Dimension::Two).unwrap();
        assert!(views.objects.is_empty());
        assert_eq!(views.coordinates.len(), 3);
        assert_eq!(views.coordinates[1].value, Some(20.0));
        assert!(views.coordinates3d.is_none());
    }

    #[test]
    fn test_abstract_views_value_count_mismatch() {
        let file = AbstractLayerFile {
            id: "noise".to_string(),
            coordinates: vec![0.0, 0.0, 1.0, 1.0],
            values: vec![10.0],
        };

        assert!(matches!(
            abstract_views(&file, Dimension::Two),
            Err(Error::InvalidArgument(_))
        ));
    }
}
