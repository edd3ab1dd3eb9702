//! A session owns the registered layers, the join documents computed
//! against them and the working directory they persist into.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::domain::Layer;
use crate::error::{Error, Result};
use crate::geometry::views::{LevelGeometry, ObjectGeometry};
use crate::join::persist::{self, JoinDocument, JoinRecord, JoinedObjects};
use crate::join::{
    Aggregation, JoinOptions, Level, MatchPair, MatchTable, SpatialRelation, nearest_matches,
    nearest_matches_3d, predicate_matches,
};
use crate::store::LayerStore;

#[derive(Debug, Default)]
pub struct Session {
    store: LayerStore,
    joined: HashMap<String, JoinDocument>,
    work_dir: Option<PathBuf>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the session at the directory join documents load from and
    /// save into.
    pub fn set_work_dir(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if !path.is_dir() {
            return Err(Error::FileSystem(path));
        }
        self.work_dir = Some(path);
        Ok(())
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        debug!("registering layer {}", layer.id());
        self.store.insert(layer)
    }

    pub fn layer(&self, id: &str) -> Result<&Layer> {
        self.store.get(id)
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    /// Join two registered layers and fold the result into the left
    /// layer's join document.
    ///
    /// Recomputing the same join replaces its previous results instead of
    /// appending a duplicate record. With a working directory configured
    /// the updated document is written back immediately.
    pub fn attach_layers(
        &mut self,
        left_id: &str,
        right_id: &str,
        options: JoinOptions,
    ) -> Result<MatchTable> {
        let left_3d = options.left_level == Level::Coordinates3d;
        let right_3d = options.right_level == Level::Coordinates3d;

        if left_3d != right_3d {
            return Err(Error::DimensionMismatch {
                left: options.left_level,
                right: options.right_level,
            });
        }
        if left_3d
            && !matches!(
                options.relation,
                SpatialRelation::Nearest | SpatialRelation::Direct
            )
        {
            return Err(Error::UnsupportedPredicate(options.relation));
        }
        if options.max_distance.is_some() && options.relation != SpatialRelation::Nearest {
            return Err(Error::InvalidArgument(
                "a maximum distance only applies to NEAREST joins".to_string(),
            ));
        }

        let left = self.store.get(left_id)?;
        let right = self.store.get(right_id)?;

        if left.is_abstract() {
            return Err(Error::InvalidArgument(format!(
                "left layer {left_id} is abstract; joins attach to physical layers"
            )));
        }
        if options.abstract_join != right.is_abstract() {
            return Err(Error::InvalidArgument(format!(
                "layer {right_id} does not match the requested join kind: an \
                 abstract join needs an abstract right layer, an object join a \
                 physical one"
            )));
        }

        info!(
            "joining {left_id} {:?} {right_id} at {:?}/{:?}",
            options.relation, options.left_level, options.right_level
        );

        // matched[i] lists right entry indices for the i-th left entry
        let (left_ids, right_ids, right_values, matched) = if left_3d {
            let lv = tridimensional(left, left_id)?;
            let rv = tridimensional(right, right_id)?;
            let matched = match options.relation {
                SpatialRelation::Nearest => {
                    singletons(nearest_matches_3d(lv, rv, options.max_distance))
                }
                _ => direct_matches(lv.len(), rv.len())?,
            };
            (
                lv.iter().map(|e| e.id).collect::<Vec<_>>(),
                rv.iter().map(|e| e.id).collect::<Vec<_>>(),
                rv.iter().map(|e| e.value).collect::<Vec<_>>(),
                matched,
            )
        } else {
            let (lids, lgeoms, _) = planar_entries(left, options.left_level)?;
            let (rids, rgeoms, rvals) = planar_entries(right, options.right_level)?;
            let matched = match options.relation {
                SpatialRelation::Nearest => {
                    singletons(nearest_matches(&lgeoms, &rgeoms, options.max_distance))
                }
                SpatialRelation::Direct => direct_matches(lgeoms.len(), rgeoms.len())?,
                predicate => predicate_matches(predicate, &lgeoms, &rgeoms),
            };
            (lids, rids, rvals, matched)
        };

        // object-level slots are indexed by feature id so degenerate
        // features keep an explicit unmatched slot
        let slot_count = match options.left_level {
            Level::Objects => left.feature_count(),
            _ => left_ids.len(),
        };

        let mut table = MatchTable::default();
        for (entry, matches) in matched.iter().enumerate() {
            let lid = left_ids[entry];
            if matches.is_empty() {
                table.pairs.push(MatchPair {
                    left_id: lid,
                    right_id: None,
                    right_value: None,
                });
            } else {
                for &ri in matches {
                    table.pairs.push(MatchPair {
                        left_id: lid,
                        right_id: Some(right_ids[ri]),
                        right_value: right_values[ri],
                    });
                }
            }
        }

        let mut objects = if options.abstract_join {
            let mut values = vec![options.default_value; slot_count];
            for (entry, matches) in matched.iter().enumerate() {
                let folded: Vec<f64> = matches
                    .iter()
                    .map(|&ri| right_values[ri].unwrap_or(options.default_value))
                    .collect();
                if let Some(value) = options.operation.apply(&folded) {
                    values[left_ids[entry] as usize] = value;
                }
            }
            JoinedObjects {
                joined_layer_index: 0,
                in_ids: None,
                in_values: Some(values),
            }
        } else {
            let mut ids: Vec<Option<Vec<u32>>> = vec![None; slot_count];
            for (entry, matches) in matched.iter().enumerate() {
                ids[left_ids[entry] as usize] =
                    Some(matches.iter().map(|&ri| right_ids[ri]).collect());
            }
            JoinedObjects {
                joined_layer_index: 0,
                in_ids: Some(ids),
                in_values: None,
            }
        };

        let record = record_for(right_id, &options);
        let document = self.document_mut(left_id)?;
        objects.joined_layer_index = document.upsert_record(record);
        document.set_objects(objects);

        if self.work_dir.is_some() {
            self.save_joined(left_id)?;
        }
        Ok(table)
    }

    /// Object join between two physical layers: which right features each
    /// left feature relates to.
    pub fn attach_physical_layers(
        &mut self,
        left_id: &str,
        right_id: &str,
        relation: SpatialRelation,
        left_level: Level,
        right_level: Level,
    ) -> Result<MatchTable> {
        self.attach_layers(
            left_id,
            right_id,
            JoinOptions {
                relation,
                left_level,
                right_level,
                ..Default::default()
            },
        )
    }

    /// Abstract join: fold the right layer's scalars onto the left layer's
    /// features.
    pub fn attach_abstract_to_physical(
        &mut self,
        left_id: &str,
        right_id: &str,
        relation: SpatialRelation,
        level: Level,
        operation: Aggregation,
        default_value: f64,
    ) -> Result<MatchTable> {
        self.attach_layers(
            left_id,
            right_id,
            JoinOptions {
                relation,
                left_level: level,
                right_level: level,
                abstract_join: true,
                operation,
                default_value,
                ..Default::default()
            },
        )
    }

    /// Whether this exact join was already computed, in memory or on disk.
    ///
    /// Checking disk needs a configured working directory; without one,
    /// only joins cached in this session are visible and anything else is
    /// [`Error::WorkDirNotConfigured`] rather than a silent "absent".
    pub fn exists_join(
        &self,
        left_id: &str,
        right_id: &str,
        options: &JoinOptions,
    ) -> Result<bool> {
        let record = record_for(right_id, options);
        if let Some(document) = self.joined.get(left_id) {
            return Ok(document.find_record(&record).is_some());
        }
        match &self.work_dir {
            Some(dir) => {
                let document = persist::load_joined(dir, left_id)?;
                Ok(document.find_record(&record).is_some())
            }
            None => Err(Error::WorkDirNotConfigured),
        }
    }

    /// The join document of a layer, loading it from the working directory
    /// on first access.
    pub fn joined_document(&mut self, layer_id: &str) -> Result<&JoinDocument> {
        self.document_mut(layer_id).map(|d| &*d)
    }

    /// Load one layer's join document from the working directory. The
    /// session's cached copy wins if the document was already touched.
    pub fn load_joined(&mut self, layer_id: &str) -> Result<&JoinDocument> {
        let dir = self
            .work_dir
            .clone()
            .ok_or(Error::WorkDirNotConfigured)?;
        match self.joined.entry(layer_id.to_string()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(persist::load_joined(&dir, layer_id)?)),
        }
    }

    /// Write one layer's join document to the working directory. A layer
    /// with no computed joins is a no-op.
    pub fn save_joined(&self, layer_id: &str) -> Result<()> {
        let dir = self.work_dir.as_deref().ok_or(Error::WorkDirNotConfigured)?;
        match self.joined.get(layer_id) {
            Some(document) => persist::save_joined(dir, layer_id, document),
            None => Ok(()),
        }
    }

    /// Write every cached join document to the working directory.
    pub fn save_all_joined(&self) -> Result<()> {
        for layer_id in self.joined.keys() {
            self.save_joined(layer_id)?;
        }
        Ok(())
    }

    fn document_mut(&mut self, layer_id: &str) -> Result<&mut JoinDocument> {
        match self.joined.entry(layer_id.to_string()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let document = match &self.work_dir {
                    Some(dir) => persist::load_joined(dir, layer_id)?,
                    None => JoinDocument::default(),
                };
                Ok(slot.insert(document))
            }
        }
    }
}

fn record_for(right_id: &str, options: &JoinOptions) -> JoinRecord {
    JoinRecord {
        spatial_relation: options.relation,
        layer_id: right_id.to_string(),
        out_level: options.left_level,
        in_level: options.right_level,
        is_abstract: options.abstract_join,
    }
}

fn direct_matches(left: usize, right: usize) -> Result<Vec<Vec<usize>>> {
    if left != right {
        return Err(Error::InvalidArgument(format!(
            "a direct join needs equal cardinality on both sides, got {left} and {right}"
        )));
    }
    Ok((0..left).map(|i| vec![i]).collect())
}

fn singletons(matches: Vec<Option<usize>>) -> Vec<Vec<usize>> {
    matches
        .into_iter()
        .map(|m| m.into_iter().collect())
        .collect()
}

fn tridimensional<'a>(
    layer: &'a Layer,
    id: &str,
) -> Result<&'a [crate::geometry::views::Vertex3dEntry]> {
    layer
        .views()
        .coordinates3d
        .as_deref()
        .ok_or_else(|| Error::MissingDimension(format!("layer {id} has no tridimensional view")))
}

type PlanarEntries<'a> = (Vec<u32>, Vec<LevelGeometry<'a>>, Vec<Option<f64>>);

fn planar_entries(layer: &Layer, level: Level) -> Result<PlanarEntries<'_>> {
    let views = layer.views();
    match level {
        Level::Objects => {
            if layer.is_abstract() {
                return Err(Error::InvalidArgument(format!(
                    "abstract layer {} has no objects view",
                    layer.id()
                )));
            }
            Ok((
                views.objects.iter().map(|e| e.id).collect(),
                views
                    .objects
                    .iter()
                    .map(|e| match &e.geometry {
                        ObjectGeometry::Point(point) => LevelGeometry::Point(point),
                        ObjectGeometry::Polygon(polygon) => LevelGeometry::Polygon(polygon),
                    })
                    .collect(),
                vec![None; views.objects.len()],
            ))
        }
        Level::Coordinates => Ok((
            views.coordinates.iter().map(|e| e.id).collect(),
            views
                .coordinates
                .iter()
                .map(|e| LevelGeometry::Point(&e.point))
                .collect(),
            views.coordinates.iter().map(|e| e.value).collect(),
        )),
        Level::Coordinates3d => Err(Error::DimensionMismatch {
            left: level,
            right: level,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AbstractLayerFile, Dimension, Feature, GeometryRecord, LayerFile, LayerType};

    fn physical_layer(id: &str, polygons: Vec<Vec<f64>>) -> Layer {
        let data = polygons
            .into_iter()
            .map(|flat| {
                Feature::from_geometry(GeometryRecord {
                    coordinates: Some(flat.into()),
                    ..Default::default()
                })
            })
            .collect();
        let file = LayerFile {
            id: id.to_string(),
            layer_type: LayerType::Triangles3d,
            render_style: vec!["FLAT_COLOR".to_string()],
            style_key: "surface".to_string(),
            data,
        };
        Layer::physical(file, Dimension::Two).unwrap()
    }

    fn abstract_layer(id: &str, coordinates: Vec<f64>, values: Vec<f64>) -> Layer {
        Layer::abstract_field(
            AbstractLayerFile {
                id: id.to_string(),
                coordinates,
                values,
            },
            Some(Dimension::Two),
        )
        .unwrap()
    }

    fn unit_square(x: f64, y: f64) -> Vec<f64> {
        vec![x, y, x + 1.0, y, x + 1.0, y + 1.0, x, y + 1.0]
    }

    fn two_squares_session() -> Session {
        let mut session = Session::new();
        session
            .add_layer(physical_layer(
                "cells",
                vec![unit_square(0.0, 0.0), unit_square(10.0, 10.0)],
            ))
            .unwrap();
        session
            .add_layer(abstract_layer(
                "sensors",
                vec![0.5, 0.5, 0.25, 0.75, 10.5, 10.5],
                vec![10.0, 20.0, 7.0],
            ))
            .unwrap();
        session
    }

    #[test]
    fn test_abstract_join_aggregates_per_object() {
        let mut session = two_squares_session();
        session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Intersects,
                    left_level: Level::Objects,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    operation: Aggregation::Avg,
                    ..Default::default()
                },
            )
            .unwrap();

        let document = session.joined_document("cells").unwrap();
        assert_eq!(document.joined_layers.len(), 1);
        assert_eq!(document.joined_layers[0].layer_id, "sensors");
        assert!(document.joined_layers[0].is_abstract);
        assert_eq!(
            document.joined_objects[0].in_values,
            Some(vec![15.0, 7.0])
        );
    }

    #[test]
    fn test_unmatched_object_gets_default_value() {
        let mut session = two_squares_session();
        session
            .add_layer(physical_layer("empty_cells", vec![unit_square(100.0, 100.0)]))
            .unwrap();
        session
            .attach_layers(
                "empty_cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Intersects,
                    left_level: Level::Objects,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    operation: Aggregation::Sum,
                    default_value: -1.0,
                    ..Default::default()
                },
            )
            .unwrap();

        let document = session.joined_document("empty_cells").unwrap();
        assert_eq!(document.joined_objects[0].in_values, Some(vec![-1.0]));
    }

    #[test]
    fn test_object_join_collects_right_ids() {
        let mut session = two_squares_session();
        session
            .add_layer(physical_layer(
                "blocks",
                vec![unit_square(0.25, 0.25), unit_square(50.0, 50.0)],
            ))
            .unwrap();

        let table = session
            .attach_physical_layers(
                "cells",
                "blocks",
                SpatialRelation::Intersects,
                Level::Objects,
                Level::Objects,
            )
            .unwrap();

        assert_eq!(table.pairs.len(), 2);
        assert_eq!(table.pairs[0].right_id, Some(0));
        assert_eq!(table.pairs[1].right_id, None);

        let document = session.joined_document("cells").unwrap();
        assert_eq!(
            document.joined_objects[0].in_ids,
            Some(vec![Some(vec![0]), Some(vec![])])
        );
    }

    #[test]
    fn test_point_layer_joins_at_objects_level() {
        let mut session = two_squares_session();
        // a single point inside the first square, as its own physical layer
        session
            .add_layer(physical_layer("pois", vec![vec![0.5, 0.5]]))
            .unwrap();

        session
            .attach_physical_layers(
                "cells",
                "pois",
                SpatialRelation::Intersects,
                Level::Objects,
                Level::Objects,
            )
            .unwrap();

        let document = session.joined_document("cells").unwrap();
        assert_eq!(
            document.joined_objects[0].in_ids,
            Some(vec![Some(vec![0]), Some(vec![])])
        );
    }

    #[test]
    fn test_recomputed_join_does_not_duplicate() {
        let mut session = two_squares_session();
        let options = JoinOptions {
            relation: SpatialRelation::Intersects,
            left_level: Level::Objects,
            right_level: Level::Coordinates,
            abstract_join: true,
            ..Default::default()
        };

        session.attach_layers("cells", "sensors", options).unwrap();
        session.attach_layers("cells", "sensors", options).unwrap();

        let document = session.joined_document("cells").unwrap();
        assert_eq!(document.joined_layers.len(), 1);
        assert_eq!(document.joined_objects.len(), 1);
    }

    #[test]
    fn test_level_and_relation_validation() {
        let mut session = two_squares_session();

        let err = session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    left_level: Level::Coordinates3d,
                    right_level: Level::Objects,
                    abstract_join: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        let err = session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Intersects,
                    left_level: Level::Coordinates3d,
                    right_level: Level::Coordinates3d,
                    abstract_join: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedPredicate(_)));

        let err = session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Intersects,
                    left_level: Level::Objects,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    max_distance: Some(5.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = session
            .attach_layers("missing", "sensors", JoinOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::LayerNotFound(_)));
    }

    #[test]
    fn test_direct_join_cardinality() {
        let mut session = two_squares_session();
        // 8 left vertices against 3 right vertices
        let err = session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Direct,
                    left_level: Level::Coordinates,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_nearest_join_at_coordinates_level() {
        let mut session = two_squares_session();
        let table = session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Nearest,
                    left_level: Level::Coordinates,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    operation: Aggregation::Discard,
                    ..Default::default()
                },
            )
            .unwrap();

        // every left vertex pairs with exactly one sensor
        assert_eq!(table.pairs.len(), 8);
        assert!(table.pairs.iter().all(|p| p.right_id.is_some()));

        let document = session.joined_document("cells").unwrap();
        let values = document.joined_objects[0].in_values.as_ref().unwrap();
        assert_eq!(values.len(), 8);
        // the far square's vertices all resolve to the sensor at (10.5, 10.5)
        assert!(values[4..].iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_nearest_beyond_bound_falls_back_to_default() {
        let mut session = two_squares_session();
        // the closest sensor is ~0.35 away from any cell vertex, so this
        // bound leaves every vertex unmatched
        session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Nearest,
                    left_level: Level::Coordinates,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    operation: Aggregation::Discard,
                    max_distance: Some(0.0001),
                    default_value: -42.0,
                },
            )
            .unwrap();

        let document = session.joined_document("cells").unwrap();
        assert_eq!(document.joined_objects[0].in_values, Some(vec![-42.0; 8]));

        // the object-join half: out-of-range nearest leaves empty id lists
        session
            .add_layer(physical_layer("blocks", vec![unit_square(50.0, 50.0)]))
            .unwrap();
        session
            .attach_layers(
                "cells",
                "blocks",
                JoinOptions {
                    relation: SpatialRelation::Nearest,
                    left_level: Level::Objects,
                    right_level: Level::Objects,
                    max_distance: Some(1.0),
                    ..Default::default()
                },
            )
            .unwrap();

        let document = session.joined_document("cells").unwrap();
        assert_eq!(
            document.joined_objects[1].in_ids,
            Some(vec![Some(vec![]), Some(vec![])])
        );
    }

    #[test]
    fn test_join_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let options = JoinOptions {
            relation: SpatialRelation::Intersects,
            left_level: Level::Objects,
            right_level: Level::Coordinates,
            abstract_join: true,
            ..Default::default()
        };

        let mut session = two_squares_session();
        session.set_work_dir(dir.path()).unwrap();
        assert!(!session.exists_join("cells", "sensors", &options).unwrap());
        session.attach_layers("cells", "sensors", options).unwrap();
        assert!(dir.path().join("cells_joined.json").exists());

        let mut fresh = two_squares_session();
        fresh.set_work_dir(dir.path()).unwrap();
        assert!(fresh.exists_join("cells", "sensors", &options).unwrap());

        // a different relation against the same pair appends a second record
        fresh
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    relation: SpatialRelation::Nearest,
                    left_level: Level::Coordinates,
                    right_level: Level::Coordinates,
                    abstract_join: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let document = fresh.joined_document("cells").unwrap();
        assert_eq!(document.joined_layers.len(), 2);
    }

    #[test]
    fn test_save_without_work_dir_fails() {
        let mut session = two_squares_session();
        session
            .attach_layers(
                "cells",
                "sensors",
                JoinOptions {
                    abstract_join: true,
                    right_level: Level::Coordinates,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(matches!(
            session.save_joined("cells"),
            Err(Error::WorkDirNotConfigured)
        ));
        assert!(matches!(
            session.load_joined("cells"),
            Err(Error::WorkDirNotConfigured)
        ));

        // the join above is cached, so existence checks still answer for it
        assert!(
            session
                .exists_join(
                    "cells",
                    "sensors",
                    &JoinOptions {
                        abstract_join: true,
                        right_level: Level::Coordinates,
                        ..Default::default()
                    },
                )
                .unwrap()
        );
        // anything uncached would need the working directory
        assert!(matches!(
            session.exists_join("other", "sensors", &JoinOptions::default()),
            Err(Error::WorkDirNotConfigured)
        ));
    }
}
