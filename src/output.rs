//! Final reprojection to WGS84 and coordinate snapping.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use tracing::warn;

use crate::crs::Crs;
use crate::error::{GridError, GridResult};
use crate::grid::{map_ordered, CellGrid};
use crate::projection::reproject;

/// Default snapping grid in degrees, about 0.11 m at the equator.
pub const DEFAULT_PRECISION: f64 = 1e-6;

fn snap_ring(ring: &LineString<f64>, grid_size: f64) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = ring
        .coords()
        .map(|c| Coord {
            x: (c.x / grid_size).round() * grid_size,
            y: (c.y / grid_size).round() * grid_size,
        })
        .collect();
    coords.dedup();
    // A closed ring needs three distinct vertices plus the closing one.
    if coords.len() < 4 {
        None
    } else {
        Some(LineString::new(coords))
    }
}

/// Rounds every vertex to a multiple of `grid_size`, dropping rings that
/// collapse in the process.
pub fn snap(geometry: &MultiPolygon<f64>, grid_size: f64) -> MultiPolygon<f64> {
    let polygons = geometry
        .iter()
        .filter_map(|polygon| {
            let exterior = snap_ring(polygon.exterior(), grid_size)?;
            let interiors = polygon
                .interiors()
                .iter()
                .filter_map(|ring| snap_ring(ring, grid_size))
                .collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();
    MultiPolygon::new(polygons)
}

/// Moves every cell back to WGS84 for interchange and optionally snaps the
/// result. Snapping happens only here, after all metric computation.
pub fn finalize(grid: CellGrid, precision: Option<f64>, parallel: bool) -> GridResult<CellGrid> {
    if let Some(size) = precision {
        if !size.is_finite() || size <= 0.0 {
            return Err(GridError::InvalidPrecision(size));
        }
    }

    let from = grid.crs();
    let geometries = map_ordered(grid.cells().iter().collect::<Vec<_>>(), parallel, |cell| {
        let geographic = reproject(&cell.geometry, from, Crs::Wgs84)?;
        let Some(size) = precision else {
            return Ok(geographic);
        };
        let snapped = snap(&geographic, size);
        if snapped.0.is_empty() {
            warn!(cell = cell.id, "cell collapses at snap precision, keeping full precision");
            Ok(geographic)
        } else {
            Ok(snapped)
        }
    })
    .into_iter()
    .collect::<GridResult<Vec<_>>>()?;

    Ok(grid.with_geometry(Crs::Wgs84, geometries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{Hemisphere, UtmZone};
    use crate::grid::{tile, CellSize};
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    #[test]
    fn snapping_rounds_to_grid() {
        let shape = MultiPolygon::new(vec![polygon![
            (x: 10.000_000_4, y: 50.000_000_6),
            (x: 10.010_000_2, y: 50.0),
            (x: 10.010_000_0, y: 50.010_000_7),
        ]]);
        let snapped = snap(&shape, 1e-6);
        let first = snapped.0[0].exterior().0[0];
        assert_abs_diff_eq!(first.x, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(first.y, 50.000_001, epsilon = 1e-12);
    }

    #[test]
    fn collapsed_rings_are_dropped() {
        let tiny = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1e-8, y: 0.0),
            (x: 1e-8, y: 1e-8),
        ]]);
        assert!(snap(&tiny, 1e-6).0.is_empty());
    }

    #[test]
    fn finalize_reprojects_to_geographic() {
        let zone = Crs::Utm(UtmZone::new(33, Hemisphere::North).unwrap());
        let boundary = MultiPolygon::new(vec![polygon![
            (x: 500_000.0, y: 5_000_000.0),
            (x: 500_500.0, y: 5_000_000.0),
            (x: 500_500.0, y: 5_000_500.0),
            (x: 500_000.0, y: 5_000_500.0),
        ]]);
        let cells = tile(&boundary, CellSize::new(500.0, 500.0).unwrap()).unwrap();
        let grid = finalize(CellGrid::new(zone, cells), Some(DEFAULT_PRECISION), false).unwrap();
        assert_eq!(grid.crs(), Crs::Wgs84);
        let ring = grid.cells()[0].geometry.0[0].exterior();
        let south_west = ring
            .coords()
            .min_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .unwrap();
        assert_abs_diff_eq!(south_west.x, 15.0, epsilon = 1e-6);
        assert_abs_diff_eq!(south_west.y, 45.153_477, epsilon = 1e-6);
    }

    #[test]
    fn invalid_precision_is_rejected() {
        let grid = CellGrid::new(Crs::Wgs84, Vec::new());
        assert!(matches!(
            finalize(grid, Some(0.0), false),
            Err(GridError::InvalidPrecision(_))
        ));
    }
}
