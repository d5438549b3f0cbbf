//! Grid cells: tiling in projected meters, clipping to the boundary, and
//! the optional minimum-coverage filter.

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, BoundingRect, Coord, MultiPolygon, Rect};
use rayon::prelude::*;

use crate::crs::Crs;
use crate::error::{GridError, GridResult};

/// Counts that land within this fraction of a whole cell are rounded down,
/// so a boundary whose span overshoots an exact multiple by projection noise
/// does not grow a sliver row or column.
const SPAN_TOLERANCE: f64 = 1e-9;

/// Upper bound on the tiled lattice, checked before any cell is allocated.
pub const MAX_TILED_CELLS: usize = 25_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    width: f64,
    height: f64,
}

impl CellSize {
    /// Width and height in meters, both strictly positive.
    pub fn new(width: f64, height: f64) -> GridResult<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(GridError::InvalidCellSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

#[derive(Debug, Clone)]
pub struct GridCell {
    /// Positional id; provisional before clipping, contiguous from 0 after.
    pub id: usize,
    pub row: usize,
    pub col: usize,
    pub geometry: MultiPolygon<f64>,
    /// Area of the tile rectangle before clipping.
    pub tile_area: f64,
    /// Intersection area in square meters, keyed by layer name.
    pub coverage: BTreeMap<String, f64>,
}

impl GridCell {
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn coverage(&self, layer: &str) -> Option<f64> {
        self.coverage.get(layer).copied()
    }

    /// Percentage of the original tile still inside the boundary.
    pub fn coverage_pct(&self) -> f64 {
        if self.tile_area <= 0.0 {
            0.0
        } else {
            self.area() / self.tile_area * 100.0
        }
    }
}

/// An ordered cell set together with its reference system and the coverage
/// layers accumulated so far.
#[derive(Debug, Clone)]
pub struct CellGrid {
    crs: Crs,
    cells: Vec<GridCell>,
    layers: Vec<String>,
}

impl CellGrid {
    pub fn new(crs: Crs, cells: Vec<GridCell>) -> Self {
        Self {
            crs,
            cells,
            layers: Vec::new(),
        }
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<GridCell> {
        self.cells
    }

    /// Layer names in the order they were accumulated.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_area(&self) -> f64 {
        self.cells.iter().map(GridCell::area).sum()
    }

    pub fn layer_total(&self, layer: &str) -> Option<f64> {
        if !self.layers.iter().any(|name| name == layer) {
            return None;
        }
        Some(self.cells.iter().filter_map(|cell| cell.coverage(layer)).sum())
    }

    pub(crate) fn with_layer(mut self, name: String, areas: Vec<f64>) -> Self {
        debug_assert_eq!(areas.len(), self.cells.len());
        for (cell, area) in self.cells.iter_mut().zip(areas) {
            cell.coverage.insert(name.clone(), area);
        }
        self.layers.push(name);
        self
    }

    pub(crate) fn with_geometry(self, crs: Crs, geometries: Vec<MultiPolygon<f64>>) -> Self {
        let cells = self
            .cells
            .into_iter()
            .zip(geometries)
            .map(|(cell, geometry)| GridCell { geometry, ..cell })
            .collect();
        Self {
            crs,
            cells,
            layers: self.layers,
        }
    }
}

/// Applies `f` to every item, on the rayon pool when `parallel` is set.
/// Output order always matches input order.
pub(crate) fn map_ordered<T, R, F>(items: Vec<T>, parallel: bool, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if parallel {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}

fn span_count(extent: f64, step: f64) -> usize {
    let count = (extent / step - SPAN_TOLERANCE).ceil();
    if count.is_finite() && count >= 1.0 {
        count as usize
    } else {
        1
    }
}

/// Covers the bounding rectangle of `boundary` with a column-major lattice
/// of `size` rectangles. The last row and column end exactly on the
/// bounding rectangle, so the lattice never extends past it.
pub fn tile(boundary: &MultiPolygon<f64>, size: CellSize) -> GridResult<Vec<GridCell>> {
    let bounds = boundary
        .bounding_rect()
        .ok_or_else(|| GridError::EmptyBoundary("projected boundary".to_string()))?;
    let (min, max) = (bounds.min(), bounds.max());

    let cols = span_count(max.x - min.x, size.width);
    let rows = span_count(max.y - min.y, size.height);

    let total = cols
        .checked_mul(rows)
        .filter(|total| *total <= MAX_TILED_CELLS)
        .ok_or(GridError::GridTooLarge { cols, rows })?;

    let mut cells = Vec::with_capacity(total);
    for col in 0..cols {
        let x_min = min.x + col as f64 * size.width;
        let x_max = if col + 1 == cols {
            max.x
        } else {
            (x_min + size.width).min(max.x)
        };
        for row in 0..rows {
            let y_min = min.y + row as f64 * size.height;
            let y_max = if row + 1 == rows {
                max.y
            } else {
                (y_min + size.height).min(max.y)
            };

            let rect = Rect::new(Coord { x: x_min, y: y_min }, Coord { x: x_max, y: y_max });
            cells.push(GridCell {
                id: cells.len(),
                row,
                col,
                geometry: MultiPolygon::new(vec![rect.to_polygon()]),
                tile_area: rect.unsigned_area(),
                coverage: BTreeMap::new(),
            });
        }
    }
    Ok(cells)
}

fn renumber(cells: Vec<GridCell>) -> Vec<GridCell> {
    cells
        .into_iter()
        .enumerate()
        .map(|(id, cell)| GridCell { id, ..cell })
        .collect()
}

/// Replaces each cell geometry by its intersection with `boundary`, drops
/// cells left with no area, and renumbers survivors from 0 in order.
pub fn clip(cells: Vec<GridCell>, boundary: &MultiPolygon<f64>, parallel: bool) -> Vec<GridCell> {
    let clipped = map_ordered(cells, parallel, |cell| {
        let geometry = cell.geometry.intersection(boundary);
        if geometry.0.is_empty() || geometry.unsigned_area() <= 0.0 {
            None
        } else {
            Some(GridCell { geometry, ..cell })
        }
    });
    renumber(clipped.into_iter().flatten().collect())
}

/// Drops cells whose clipped area is below `min_pct` percent of their tile,
/// then renumbers. Row and column indices are left untouched.
pub fn filter_min_coverage(cells: Vec<GridCell>, min_pct: f64) -> GridResult<Vec<GridCell>> {
    if !(0.0..=100.0).contains(&min_pct) {
        return Err(GridError::InvalidThreshold(min_pct));
    }
    let kept = cells
        .into_iter()
        .filter(|cell| cell.coverage_pct() >= min_pct)
        .collect();
    Ok(renumber(kept))
}
