use crate::domain::{AbstractLayerFile, LayerFile};
use crate::error::{Error, Result};
use crate::geometry::views::{self, LayerViews};

/// Dimensionality of a flat coordinate array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Two,
    Three,
}

impl Dimension {
    /// Number of components per vertex
    pub fn size(self) -> usize {
        match self {
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }
}

/// The raw records a layer was built from.
#[derive(Debug, Clone)]
pub enum LayerSource {
    Physical(LayerFile),
    Abstract(AbstractLayerFile),
}

/// A registered layer: its source records plus the three derived geometric
/// views. The views are rebuilt whenever the layer is (re)loaded and never
/// mutated independently.
#[derive(Debug, Clone)]
pub struct Layer {
    source: LayerSource,
    views: LayerViews,
}

impl Layer {
    /// Build a physical layer, deriving all three views from its features.
    ///
    /// `dim` describes the flat `coordinates` arrays of features without a
    /// footprint; footprints are always 2D pairs and the accompanying vertex
    /// cloud is always 3D triples.
    pub fn physical(file: LayerFile, dim: Dimension) -> Result<Self> {
        let views = views::physical_views(&file, dim)?;
        Ok(Self {
            source: LayerSource::Physical(file),
            views,
        })
    }

    /// Build an abstract layer carrying one scalar per vertex.
    ///
    /// The dimensionality of the flat coordinate array must be supplied
    /// unless precomputed views are attached via [`Layer::with_views`].
    pub fn abstract_field(file: AbstractLayerFile, dim: Option<Dimension>) -> Result<Self> {
        let dim = dim.ok_or_else(|| {
            Error::MissingDimension(format!(
                "abstract layer {} needs an explicit dimensionality when no precomputed views are supplied",
                file.id
            ))
        })?;
        let views = views::abstract_views(&file, dim)?;
        Ok(Self {
            source: LayerSource::Abstract(file),
            views,
        })
    }

    /// Attach precomputed views to a source, bypassing the view builder.
    pub fn with_views(source: LayerSource, views: LayerViews) -> Self {
        Self { source, views }
    }

    pub fn id(&self) -> &str {
        match &self.source {
            LayerSource::Physical(file) => &file.id,
            LayerSource::Abstract(file) => &file.id,
        }
    }

    /// Whether this layer carries scalar values rather than object identity.
    pub fn is_abstract(&self) -> bool {
        matches!(self.source, LayerSource::Abstract(_))
    }

    pub fn views(&self) -> &LayerViews {
        &self.views
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    pub fn file(&self) -> Option<&LayerFile> {
        match &self.source {
            LayerSource::Physical(file) => Some(file),
            LayerSource::Abstract(_) => None,
        }
    }

    /// Number of source features. For abstract layers every vertex is its
    /// own feature, so this is the vertex count.
    pub fn feature_count(&self) -> usize {
        match &self.source {
            LayerSource::Physical(file) => file.data.len(),
            LayerSource::Abstract(_) => self.views.coordinates.len(),
        }
    }
}
