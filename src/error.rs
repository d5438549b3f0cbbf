//! Error taxonomy for grid construction.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure is terminal for the run that raised it.
#[derive(Debug, Error)]
pub enum GridError {
    /// Longitude/latitude outside the geographic domain.
    #[error("invalid coordinate: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },

    /// No usable boundary polygon after load and dissolve.
    #[error("boundary '{0}' contains no polygon area")]
    EmptyBoundary(String),

    /// A feature that should be polygonal is not.
    #[error("unsupported geometry in '{source_label}': expected polygon, found {kind}")]
    UnsupportedGeometry { source_label: String, kind: String },

    #[error("invalid cell size {width} x {height}: both dimensions must be positive")]
    InvalidCellSize { width: f64, height: f64 },

    /// An auxiliary coverage layer could not be read or reprojected.
    #[error("coverage layer '{layer}' failed to load: {reason}")]
    LayerLoadFailure {
        layer: String,
        #[source]
        reason: Box<GridError>,
    },

    /// The lattice over the bounding rectangle would hold too many cells.
    #[error("grid of {cols} x {rows} cells is too large")]
    GridTooLarge { cols: usize, rows: usize },
    #[error("unsupported reference system '{0}'")]
    UnsupportedCrs(String),

    #[error("minimum coverage threshold {0} is outside 0..=100")]
    InvalidThreshold(f64),

    #[error("snap precision {0} must be positive")]
    InvalidPrecision(f64),

    #[error("coverage layer name '{0}' is used more than once")]
    DuplicateLayer(String),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl GridError {
    pub fn layer(name: impl Into<String>, reason: GridError) -> Self {
        Self::LayerLoadFailure {
            layer: name.into(),
            reason: Box::new(reason),
        }
    }

    pub fn unsupported_geometry(source_label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnsupportedGeometry {
            source_label: source_label.into(),
            kind: kind.into(),
        }
    }
}

pub type GridResult<T> = Result<T, GridError>;
