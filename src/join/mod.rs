//! Spatial join primitives: the closed relation/level/aggregation enums and
//! the pure match computations the session-level engine dispatches to.

pub mod persist;

use clap::ValueEnum;
use geo::EuclideanDistance;
use geo::Relate;
use geo::algorithm::coordinate_position::CoordPos;
use geo::algorithm::dimensions::Dimensions;
use geo::algorithm::relate::IntersectionMatrix;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::geometry::views::{LevelGeometry, Vertex3dEntry};

pub use persist::{JoinDocument, JoinRecord, JoinedObjects};

/// Spatial relation between a left and a right layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpatialRelation {
    Intersects,
    Contains,
    Within,
    Touches,
    Crosses,
    Overlaps,
    /// Nearest geometry, optionally bounded by a maximum distance
    Nearest,
    /// Positional pairing: left feature i with right feature i
    Direct,
}

/// Geometric resolution a join runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Level {
    #[serde(rename = "OBJECTS")]
    Objects,
    #[serde(rename = "COORDINATES")]
    Coordinates,
    #[serde(rename = "COORDINATES3D")]
    Coordinates3d,
}

/// How multiple matched scalar values collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Sum,
    Count,
    /// Keep only the first matched value
    Discard,
}

impl Aggregation {
    /// Collapse a list of matched values. `None` when the list is empty.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Count => values.len() as f64,
            Aggregation::Discard => values[0],
        })
    }
}

/// Parameters of one join between two registered layers.
#[derive(Debug, Clone, Copy)]
pub struct JoinOptions {
    pub relation: SpatialRelation,
    pub left_level: Level,
    pub right_level: Level,
    /// Abstract joins carry the right layer's scalar values; object joins
    /// carry right feature ids.
    pub abstract_join: bool,
    pub operation: Aggregation,
    /// Only meaningful with `Nearest`
    pub max_distance: Option<f64>,
    /// Value an unmatched left feature resolves to in an abstract join
    pub default_value: f64,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            relation: SpatialRelation::Intersects,
            left_level: Level::Objects,
            right_level: Level::Objects,
            abstract_join: false,
            operation: Aggregation::Avg,
            max_distance: None,
            default_value: 0.0,
        }
    }
}

/// One row of the computed match table: a left view id and the right view
/// id (object join) or value (abstract join) it matched, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPair {
    pub left_id: u32,
    pub right_id: Option<u32>,
    pub right_value: Option<f64>,
}

/// The pairwise match table of one join, for inspection and debugging. The
/// durable output is the persisted join document.
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    pub pairs: Vec<MatchPair>,
}

impl LevelGeometry<'_> {
    fn matrix(&self, other: &LevelGeometry<'_>) -> IntersectionMatrix {
        match (self, other) {
            (LevelGeometry::Point(a), LevelGeometry::Point(b)) => a.relate(*b),
            (LevelGeometry::Point(a), LevelGeometry::Polygon(b)) => a.relate(*b),
            (LevelGeometry::Polygon(a), LevelGeometry::Point(b)) => a.relate(*b),
            (LevelGeometry::Polygon(a), LevelGeometry::Polygon(b)) => a.relate(*b),
        }
    }

    /// Topological dimension: 0 for points, 2 for polygons.
    fn dimension_rank(&self) -> u8 {
        match self {
            LevelGeometry::Point(_) => 0,
            LevelGeometry::Polygon(_) => 2,
        }
    }

    fn distance(&self, other: &LevelGeometry<'_>) -> f64 {
        match (self, other) {
            (LevelGeometry::Point(a), LevelGeometry::Point(b)) => a.euclidean_distance(*b),
            (LevelGeometry::Point(a), LevelGeometry::Polygon(b)) => a.euclidean_distance(*b),
            (LevelGeometry::Polygon(a), LevelGeometry::Point(b)) => a.euclidean_distance(*b),
            (LevelGeometry::Polygon(a), LevelGeometry::Polygon(b)) => a.euclidean_distance(*b),
        }
    }
}

/// Evaluate a topological predicate between two view geometries.
///
/// `Nearest` and `Direct` are not predicates and are dispatched before this
/// point by the engine.
pub(crate) fn predicate_holds(
    relation: SpatialRelation,
    left: &LevelGeometry<'_>,
    right: &LevelGeometry<'_>,
) -> bool {
    let im = left.matrix(right);
    let interiors = im.get(CoordPos::Inside, CoordPos::Inside);

    match relation {
        SpatialRelation::Intersects => im.is_intersects(),
        SpatialRelation::Contains => im.is_contains(),
        SpatialRelation::Within => im.is_within(),
        // DE-9IM: boundaries meet but interiors never do
        SpatialRelation::Touches => {
            interiors == Dimensions::Empty
                && (im.get(CoordPos::Inside, CoordPos::OnBoundary) != Dimensions::Empty
                    || im.get(CoordPos::OnBoundary, CoordPos::Inside) != Dimensions::Empty
                    || im.get(CoordPos::OnBoundary, CoordPos::OnBoundary) != Dimensions::Empty)
        }
        // DE-9IM: lower-dimensional left passes through the right
        SpatialRelation::Crosses => {
            left.dimension_rank() < right.dimension_rank()
                && interiors != Dimensions::Empty
                && im.get(CoordPos::Inside, CoordPos::Outside) != Dimensions::Empty
                || left.dimension_rank() > right.dimension_rank()
                    && interiors != Dimensions::Empty
                    && im.get(CoordPos::Outside, CoordPos::Inside) != Dimensions::Empty
        }
        // DE-9IM: same dimension, interiors intersect, neither covers the other
        SpatialRelation::Overlaps => {
            left.dimension_rank() == right.dimension_rank()
                && interiors != Dimensions::Empty
                && im.get(CoordPos::Inside, CoordPos::Outside) != Dimensions::Empty
                && im.get(CoordPos::Outside, CoordPos::Inside) != Dimensions::Empty
        }
        SpatialRelation::Nearest | SpatialRelation::Direct => false,
    }
}

/// All right-side indices satisfying a predicate, per left geometry.
pub(crate) fn predicate_matches(
    relation: SpatialRelation,
    left: &[LevelGeometry<'_>],
    right: &[LevelGeometry<'_>],
) -> Vec<Vec<usize>> {
    left.iter()
        .map(|l| {
            right
                .iter()
                .enumerate()
                .filter(|(_, r)| predicate_holds(relation, l, r))
                .map(|(i, _)| i)
                .collect()
        })
        .collect()
}

/// Nearest right-side index per left geometry, bounded by `max_distance`
/// when given. Out-of-range geometries stay unmatched.
pub(crate) fn nearest_matches(
    left: &[LevelGeometry<'_>],
    right: &[LevelGeometry<'_>],
    max_distance: Option<f64>,
) -> Vec<Option<usize>> {
    left.iter()
        .map(|l| {
            let mut best: Option<(usize, f64)> = None;
            for (i, r) in right.iter().enumerate() {
                let d = l.distance(r);
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((i, d));
                }
            }
            best.and_then(|(i, d)| match max_distance {
                Some(bound) if d > bound => None,
                _ => Some(i),
            })
        })
        .collect()
}

/// Nearest right-side index per left 3D vertex, via an R-tree over the
/// right view.
pub(crate) fn nearest_matches_3d(
    left: &[Vertex3dEntry],
    right: &[Vertex3dEntry],
    max_distance: Option<f64>,
) -> Vec<Option<usize>> {
    let tree: RTree<GeomWithData<[f64; 3], usize>> = RTree::bulk_load(
        right
            .iter()
            .enumerate()
            .map(|(i, entry)| GeomWithData::new(entry.position, i))
            .collect(),
    );

    left.iter()
        .map(|entry| {
            tree.nearest_neighbor(&entry.position).and_then(|found| {
                match max_distance {
                    Some(bound) => {
                        let [qx, qy, qz] = entry.position;
                        let [px, py, pz] = *found.geom();
                        let dist2 = (qx - px).powi(2) + (qy - py).powi(2) + (qz - pz).powi(2);
                        (dist2 <= bound * bound).then_some(found.data)
                    }
                    None => Some(found.data),
                }
            })
        })
        .collect()
}
