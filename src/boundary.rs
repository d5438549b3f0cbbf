//! Boundary normalization: one polygon set in WGS84.

use geo::{Area, Centroid, MultiPolygon, Point};

use crate::crs::{select_projection, Crs};
use crate::error::{GridError, GridResult};
use crate::projection::reproject;
use crate::source::{dissolve, VectorSource};

/// The area to be gridded, always non-empty.
#[derive(Debug, Clone)]
pub struct Boundary {
    label: String,
    geometry: MultiPolygon<f64>,
    crs: Crs,
}

impl Boundary {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Centroid in the boundary's own (geographic) coordinates.
    pub fn centroid(&self) -> GridResult<Point<f64>> {
        self.geometry
            .centroid()
            .ok_or_else(|| GridError::EmptyBoundary(self.label.clone()))
    }

    /// Local UTM system derived from the geographic centroid.
    pub fn local_projection(&self) -> GridResult<Crs> {
        let centroid = self.centroid()?;
        select_projection(centroid.x(), centroid.y())
    }

    /// Returns the boundary geometry expressed in `target`.
    pub fn project(&self, target: Crs) -> GridResult<MultiPolygon<f64>> {
        reproject(&self.geometry, self.crs, target)
    }
}

/// Dissolves all boundary features into one polygon set and moves it to
/// WGS84. Sources without reference-system metadata are taken as WGS84.
pub fn normalize_boundary(source: &VectorSource) -> GridResult<Boundary> {
    if source.is_empty() {
        return Err(GridError::EmptyBoundary(source.label.clone()));
    }

    let polygons = source.polygons()?;
    let merged = dissolve(polygons);
    let geometry = reproject(&merged, source.crs_or_default(), Crs::Wgs84)?;

    if geometry.0.is_empty() || geometry.unsigned_area() <= 0.0 {
        return Err(GridError::EmptyBoundary(source.label.clone()));
    }

    Ok(Boundary {
        label: source.label.clone(),
        geometry,
        crs: Crs::Wgs84,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{Hemisphere, UtmZone};
    use crate::projection::from_geographic;
    use geo::{polygon, Coord, Geometry, LineString, Polygon};

    fn degree_square(lon: f64, lat: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: lon, y: lat),
            (x: lon + size, y: lat),
            (x: lon + size, y: lat + size),
            (x: lon, y: lat + size),
        ]
    }

    #[test]
    fn empty_source_is_rejected() {
        let source = VectorSource::new("empty", None, Vec::new());
        assert!(matches!(
            normalize_boundary(&source),
            Err(GridError::EmptyBoundary(_))
        ));
    }

    #[test]
    fn line_features_are_rejected() {
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        let source = VectorSource::new("lines", None, vec![Geometry::LineString(line)]);
        assert!(matches!(
            normalize_boundary(&source),
            Err(GridError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn multiple_features_are_dissolved() {
        let source = VectorSource::from_polygons(
            "two",
            None,
            vec![
                degree_square(10.0, 50.0, 0.1),
                degree_square(10.05, 50.0, 0.1),
            ],
        );
        let boundary = normalize_boundary(&source).unwrap();
        assert_eq!(boundary.geometry().0.len(), 1);
        assert_eq!(boundary.crs(), Crs::Wgs84);
        assert!((boundary.geometry().unsigned_area() - 0.015).abs() < 1e-9);
    }

    #[test]
    fn projected_source_is_moved_to_geographic() {
        let zone = Crs::Utm(UtmZone::new(32, Hemisphere::North).unwrap());
        let corner = from_geographic(zone, Coord { x: 9.0, y: 48.0 }).unwrap();
        let projected = polygon![
            (x: corner.x, y: corner.y),
            (x: corner.x + 1000.0, y: corner.y),
            (x: corner.x + 1000.0, y: corner.y + 1000.0),
            (x: corner.x, y: corner.y + 1000.0),
        ];
        let source = VectorSource::from_polygons("utm", Some(zone), vec![projected]);
        let boundary = normalize_boundary(&source).unwrap();
        let first = boundary.geometry().0[0].exterior().0[0];
        assert!((first.x - 9.0).abs() < 1e-9);
        assert!((first.y - 48.0).abs() < 1e-9);
        assert_eq!(boundary.local_projection().unwrap(), zone);
    }

    #[test]
    fn degenerate_polygon_is_empty() {
        let flat = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 2.0, y: 0.0)];
        let source = VectorSource::from_polygons("flat", None, vec![flat]);
        assert!(matches!(
            normalize_boundary(&source),
            Err(GridError::EmptyBoundary(_))
        ));
    }
}
