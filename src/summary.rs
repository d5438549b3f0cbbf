//! Run summary written next to the grid output.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::{GridError, GridResult};
use crate::grid::CellGrid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    /// Total covered area across all cells, square meters.
    pub total_area: f64,
    pub cells_covered: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub boundary: String,
    pub projected_crs: Crs,
    pub cell_width: f64,
    pub cell_height: f64,
    pub tiled_cells: usize,
    pub surviving_cells: usize,
    /// Sum of clipped cell areas in square meters.
    pub grid_area: f64,
    pub layers: Vec<LayerSummary>,
}

impl RunSummary {
    pub(crate) fn layer_summaries(grid: &CellGrid) -> Vec<LayerSummary> {
        grid.layers()
            .iter()
            .map(|name| LayerSummary {
                name: name.clone(),
                total_area: grid.layer_total(name).unwrap_or(0.0),
                cells_covered: grid
                    .cells()
                    .iter()
                    .filter(|cell| cell.coverage(name).is_some_and(|area| area > 0.0))
                    .count(),
            })
            .collect()
    }

    pub fn write(&self, path: &Path) -> GridResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|err| GridError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| GridError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| GridError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> GridResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| GridError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|err| GridError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}
