//! In-memory polygon feature sets handed over by the I/O layer.

use geo::{Geometry, MultiPolygon, Polygon};

use crate::crs::Crs;
use crate::error::{GridError, GridResult};

/// A loaded vector source: its features and the reference system they are
/// expressed in. `crs: None` means the source carried no metadata.
#[derive(Debug, Clone)]
pub struct VectorSource {
    pub label: String,
    pub crs: Option<Crs>,
    pub features: Vec<Geometry<f64>>,
}

impl VectorSource {
    pub fn new(label: impl Into<String>, crs: Option<Crs>, features: Vec<Geometry<f64>>) -> Self {
        Self {
            label: label.into(),
            crs,
            features,
        }
    }

    pub fn from_polygons(
        label: impl Into<String>,
        crs: Option<Crs>,
        polygons: impl IntoIterator<Item = Polygon<f64>>,
    ) -> Self {
        let features = polygons.into_iter().map(Geometry::Polygon).collect();
        Self::new(label, crs, features)
    }

    /// Missing metadata means unprojected longitude/latitude.
    pub fn crs_or_default(&self) -> Crs {
        self.crs.unwrap_or(Crs::Wgs84)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Splits every feature into its polygon parts, rejecting anything that
    /// is not polygonal.
    pub fn polygons(&self) -> GridResult<Vec<Polygon<f64>>> {
        let mut polygons = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            match feature {
                Geometry::Polygon(polygon) => polygons.push(polygon.clone()),
                Geometry::MultiPolygon(multi) => polygons.extend(multi.0.iter().cloned()),
                other => {
                    return Err(GridError::unsupported_geometry(
                        &self.label,
                        geometry_kind(other),
                    ))
                }
            }
        }
        Ok(polygons)
    }
}

pub(crate) fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Merges polygon parts into one polygon set. A single part is returned
/// untouched; more than one is dissolved through pairwise union.
pub(crate) fn dissolve(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    use geo::BooleanOps;

    if polygons.len() <= 1 {
        return MultiPolygon::new(polygons);
    }
    polygons
        .iter()
        .fold(MultiPolygon::new(Vec::new()), |merged, polygon| {
            merged.union(polygon)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, Point};

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]
    }

    #[test]
    fn missing_crs_defaults_to_geographic() {
        let source = VectorSource::from_polygons("b", None, vec![square(0.0, 0.0, 1.0)]);
        assert_eq!(source.crs_or_default(), Crs::Wgs84);
    }

    #[test]
    fn rejects_non_polygonal_features() {
        let source = VectorSource::new(
            "points",
            None,
            vec![Geometry::Point(Point::new(1.0, 2.0))],
        );
        let err = source.polygons().unwrap_err();
        assert!(matches!(
            err,
            GridError::UnsupportedGeometry { ref kind, .. } if kind == "Point"
        ));
    }

    #[test]
    fn dissolve_merges_overlapping_parts() {
        let merged = dissolve(vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)]);
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn dissolve_keeps_disjoint_parts() {
        let merged = dissolve(vec![square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)]);
        assert_eq!(merged.0.len(), 2);
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-9);
    }
}
