//! Coverage accumulation: per-cell intersection area with auxiliary layers.

use std::path::Path;

use geo::{Area, BooleanOps, MultiPolygon};
use thiserror::Error;
use tracing::debug;

use crate::error::{GridError, GridResult};
use crate::grid::{map_ordered, CellGrid};
use crate::projection::reproject;
use crate::source::{dissolve, VectorSource};

/// A named auxiliary polygon set.
#[derive(Debug, Clone)]
pub struct CoverageLayer {
    name: String,
    source: VectorSource,
}

impl CoverageLayer {
    pub fn new(name: impl Into<String>, source: VectorSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &VectorSource {
        &self.source
    }

    /// Dissolved layer geometry in the grid's reference system.
    fn prepare(&self, grid: &CellGrid) -> GridResult<MultiPolygon<f64>> {
        let parts = MultiPolygon::new(self.source.polygons()?);
        let projected = reproject(&parts, self.source.crs_or_default(), grid.crs())?;
        Ok(dissolve(projected.0))
    }
}

/// Default attribute name for a layer file: the name of the directory that
/// holds it, or the file stem when there is no named parent.
pub fn derive_layer_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(Path::file_name)
        .or_else(|| path.file_stem())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

fn measure(grid: &CellGrid, layer: &CoverageLayer, parallel: bool) -> GridResult<Vec<f64>> {
    if grid.layers().iter().any(|name| name == layer.name()) {
        return Err(GridError::DuplicateLayer(layer.name().to_string()));
    }

    let geometry = layer
        .prepare(grid)
        .map_err(|err| GridError::layer(layer.name(), err))?;

    let areas = if geometry.0.is_empty() {
        vec![0.0; grid.len()]
    } else {
        map_ordered(grid.cells().iter().collect::<Vec<_>>(), parallel, |cell| {
            cell.geometry.intersection(&geometry).unsigned_area()
        })
    };

    debug!(
        layer = layer.name(),
        cells = grid.len(),
        covered = areas.iter().filter(|area| **area > 0.0).count(),
        "measured coverage layer"
    );
    Ok(areas)
}

/// Returns `grid` extended with one area attribute for `layer`. Cells that
/// miss the layer get exactly 0.0.
pub fn accumulate(grid: CellGrid, layer: &CoverageLayer, parallel: bool) -> GridResult<CellGrid> {
    let areas = measure(&grid, layer, parallel)?;
    Ok(grid.with_layer(layer.name().to_string(), areas))
}

/// A fold over several layers stopped early. `completed` holds every layer
/// accumulated before the failing one.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CoverageFailure {
    pub completed: CellGrid,
    #[source]
    pub error: GridError,
}

/// Folds `accumulate` over `layers` in order.
pub fn accumulate_all(
    grid: CellGrid,
    layers: &[CoverageLayer],
    parallel: bool,
) -> Result<CellGrid, CoverageFailure> {
    let mut grid = grid;
    for layer in layers {
        match measure(&grid, layer, parallel) {
            Ok(areas) => grid = grid.with_layer(layer.name().to_string(), areas),
            Err(error) => {
                return Err(CoverageFailure {
                    completed: grid,
                    error,
                })
            }
        }
    }
    Ok(grid)
}
