//! Coordinate conversion between reference systems.
//!
//! Web Mercator is converted in closed form. Every other system goes
//! through proj4rs, pivoting on WGS84 longitude/latitude.

use std::f64::consts::PI;

use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::crs::{Crs, Hemisphere};
use crate::error::{GridError, GridResult};

const EARTH_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";
const WEB_MERCATOR: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";
const OSGB36_TOWGS84: &str = "+towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489";
const ETRS89_TOWGS84: &str = "+towgs84=0,0,0,0,0,0,0";

/// Proj definitions for the EPSG codes carried as `Crs::Epsg`.
pub(crate) fn epsg_definition(code: u32) -> Option<String> {
    let definition = match code {
        // ETRS89 / NAD83 geographic
        4258 | 4269 => format!("+proj=longlat +ellps=GRS80 {ETRS89_TOWGS84} +no_defs"),
        // OSGB36 geographic
        4277 => format!("+proj=longlat +ellps=airy {OSGB36_TOWGS84} +no_defs"),
        // British National Grid
        27700 => format!(
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
             +ellps=airy {OSGB36_TOWGS84} +units=m +no_defs"
        ),
        // Irish Transverse Mercator
        2157 => format!(
            "+proj=tmerc +lat_0=53.5 +lon_0=-8 +k=0.99982 +x_0=600000 +y_0=750000 \
             +ellps=GRS80 {ETRS89_TOWGS84} +units=m +no_defs"
        ),
        // RGF93 / Lambert-93
        2154 => format!(
            "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
             +ellps=GRS80 {ETRS89_TOWGS84} +units=m +no_defs"
        ),
        // ETRS89 / LAEA Europe
        3035 => format!(
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 \
             +ellps=GRS80 {ETRS89_TOWGS84} +units=m +no_defs"
        ),
        // WGS84 / World Mercator
        3395 => "+proj=merc +lon_0=0 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs".to_string(),
        // ETRS89 / UTM zones 28N-38N
        25828..=25838 => format!(
            "+proj=utm +zone={} +ellps=GRS80 {ETRS89_TOWGS84} +units=m +no_defs",
            code - 25800
        ),
        _ => return None,
    };
    Some(definition)
}

/// The proj string for `crs`, if one is known.
pub fn proj_definition(crs: Crs) -> Option<String> {
    match crs {
        Crs::Wgs84 => Some(WGS84_LONLAT.to_string()),
        Crs::WebMercator => Some(WEB_MERCATOR.to_string()),
        Crs::Utm(zone) => {
            let south = match zone.hemisphere() {
                Hemisphere::North => "",
                Hemisphere::South => " +south",
            };
            Some(format!(
                "+proj=utm +zone={}{south} +datum=WGS84 +units=m +no_defs",
                zone.zone()
            ))
        }
        Crs::Epsg(code) => epsg_definition(code),
    }
}

fn parse_proj(crs: Crs) -> GridResult<Proj> {
    let definition =
        proj_definition(crs).ok_or_else(|| GridError::UnsupportedCrs(crs.to_string()))?;
    Proj::from_proj_string(&definition)
        .map_err(|err| GridError::UnsupportedCrs(format!("{crs}: {err:?}")))
}

fn check_geographic(coord: Coord<f64>) -> GridResult<Coord<f64>> {
    let in_range = (-180.0..=180.0).contains(&coord.x) && (-90.0..=90.0).contains(&coord.y);
    if in_range {
        Ok(coord)
    } else {
        Err(GridError::InvalidCoordinate {
            lon: coord.x,
            lat: coord.y,
        })
    }
}

fn mercator_to_lonlat(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / EARTH_RADIUS).to_degrees(),
        y: (2.0 * (coord.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
    }
}

fn lonlat_to_mercator(coord: Coord<f64>) -> GridResult<Coord<f64>> {
    if !(-WEB_MERCATOR_MAX_LAT..=WEB_MERCATOR_MAX_LAT).contains(&coord.y) {
        return Err(GridError::InvalidCoordinate {
            lon: coord.x,
            lat: coord.y,
        });
    }
    Ok(Coord {
        x: EARTH_RADIUS * coord.x.to_radians(),
        y: EARTH_RADIUS * (PI / 4.0 + coord.y.to_radians() / 2.0).tan().ln(),
    })
}

/// How one end of a transformation reaches WGS84 longitude/latitude.
enum Leg {
    Wgs84,
    WebMercator,
    Proj(Proj),
}

impl Leg {
    fn new(crs: Crs) -> GridResult<Self> {
        match crs {
            Crs::Wgs84 => Ok(Leg::Wgs84),
            Crs::WebMercator => Ok(Leg::WebMercator),
            other => parse_proj(other).map(Leg::Proj),
        }
    }
}

/// Reusable conversion between two reference systems.
pub struct CoordTransformer {
    from: Crs,
    to: Crs,
    wgs84: Proj,
    source: Leg,
    target: Leg,
}

impl std::fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(from: Crs, to: Crs) -> GridResult<Self> {
        Ok(Self {
            from,
            to,
            wgs84: parse_proj(Crs::Wgs84)?,
            source: Leg::new(from)?,
            target: Leg::new(to)?,
        })
    }

    pub fn from_crs(&self) -> Crs {
        self.from
    }

    pub fn to_crs(&self) -> Crs {
        self.to
    }

    pub fn transform(&self, coord: Coord<f64>) -> GridResult<Coord<f64>> {
        if self.from == self.to {
            return Ok(coord);
        }
        let lonlat = self.to_lonlat(coord)?;
        self.from_lonlat(lonlat)
    }

    fn to_lonlat(&self, coord: Coord<f64>) -> GridResult<Coord<f64>> {
        let lonlat = match &self.source {
            Leg::Wgs84 => coord,
            Leg::WebMercator => mercator_to_lonlat(coord),
            Leg::Proj(proj) => run(proj, &self.wgs84, coord, self.from.is_geographic(), true)?,
        };
        check_geographic(lonlat)
    }

    fn from_lonlat(&self, lonlat: Coord<f64>) -> GridResult<Coord<f64>> {
        match &self.target {
            Leg::Wgs84 => Ok(lonlat),
            Leg::WebMercator => lonlat_to_mercator(lonlat),
            Leg::Proj(proj) => run(&self.wgs84, proj, lonlat, true, self.to.is_geographic()),
        }
    }
}

/// One proj4rs transformation. Geographic ends are exchanged in radians.
fn run(
    source: &Proj,
    target: &Proj,
    coord: Coord<f64>,
    source_degrees: bool,
    target_degrees: bool,
) -> GridResult<Coord<f64>> {
    let invalid = || GridError::InvalidCoordinate {
        lon: coord.x,
        lat: coord.y,
    };

    let mut point = if source_degrees {
        (coord.x.to_radians(), coord.y.to_radians(), 0.0)
    } else {
        (coord.x, coord.y, 0.0)
    };
    transform(source, target, &mut point).map_err(|_| invalid())?;

    let (x, y) = if target_degrees {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };
    if x.is_finite() && y.is_finite() {
        Ok(Coord { x, y })
    } else {
        Err(invalid())
    }
}

/// Converts a coordinate in `crs` to WGS84 longitude/latitude.
pub fn to_geographic(crs: Crs, coord: Coord<f64>) -> GridResult<Coord<f64>> {
    CoordTransformer::new(crs, Crs::Wgs84)?.to_lonlat(coord)
}

/// Converts WGS84 longitude/latitude into `crs`.
pub fn from_geographic(crs: Crs, coord: Coord<f64>) -> GridResult<Coord<f64>> {
    let transformer = CoordTransformer::new(Crs::Wgs84, crs)?;
    transformer.from_lonlat(check_geographic(coord)?)
}

/// Reprojects every vertex of a polygon set. Edges stay straight in the
/// target system; only vertices are transformed.
pub fn reproject(geometry: &MultiPolygon<f64>, from: Crs, to: Crs) -> GridResult<MultiPolygon<f64>> {
    if from == to {
        return Ok(geometry.clone());
    }
    let transformer = CoordTransformer::new(from, to)?;
    geometry.try_map_coords(|coord| transformer.transform(coord))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{select_projection, UtmZone};
    use approx::assert_abs_diff_eq;

    fn utm(zone: u8, hemisphere: Hemisphere) -> Crs {
        Crs::Utm(UtmZone::new(zone, hemisphere).unwrap())
    }

    #[test]
    fn central_meridian_on_equator_maps_to_false_easting() {
        let xy = from_geographic(utm(31, Hemisphere::North), Coord { x: 3.0, y: 0.0 }).unwrap();
        assert_abs_diff_eq!(xy.x, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(xy.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn matches_reference_utm_values() {
        // Eiffel Tower, UTM 31N.
        let xy = from_geographic(
            utm(31, Hemisphere::North),
            Coord {
                x: 2.294_481,
                y: 48.858_370,
            },
        )
        .unwrap();
        assert_abs_diff_eq!(xy.x, 448_250.577, epsilon = 0.05);
        assert_abs_diff_eq!(xy.y, 5_411_951.588, epsilon = 0.05);
    }

    #[test]
    fn southern_zone_uses_false_northing() {
        let crs = utm(33, Hemisphere::South);
        let xy = from_geographic(crs, Coord { x: 15.0, y: -10.0 }).unwrap();
        assert_abs_diff_eq!(xy.x, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(xy.y, 8_894_587.509, epsilon = 0.05);
    }

    #[test]
    fn utm_round_trip_reproduces_vertices() {
        for &(lon, lat) in &[(15.3, 45.1), (-71.06, 42.36), (151.2, -33.87), (-0.5, -0.2)] {
            let crs = select_projection(lon, lat).unwrap();
            let projected = from_geographic(crs, Coord { x: lon, y: lat }).unwrap();
            let back = to_geographic(crs, projected).unwrap();
            assert_abs_diff_eq!(back.x, lon, epsilon = 1e-8);
            assert_abs_diff_eq!(back.y, lat, epsilon = 1e-8);
        }
    }

    #[test]
    fn british_national_grid_matches_published_point() {
        // Caister water tower; the 7-parameter shift is good to a few metres.
        let bng = Crs::from_epsg(27700).unwrap();
        let lonlat = Coord {
            x: 1.0 + 42.0 / 60.0 + 57.8663 / 3600.0,
            y: 52.0 + 39.0 / 60.0 + 28.8282 / 3600.0,
        };
        let xy = from_geographic(bng, lonlat).unwrap();
        assert_abs_diff_eq!(xy.x, 651_409.903, epsilon = 5.0);
        assert_abs_diff_eq!(xy.y, 313_177.270, epsilon = 5.0);

        let back = to_geographic(bng, xy).unwrap();
        assert_abs_diff_eq!(back.x, lonlat.x, epsilon = 1e-7);
        assert_abs_diff_eq!(back.y, lonlat.y, epsilon = 1e-7);
    }

    #[test]
    fn transformer_converts_between_projected_systems() {
        let from = Crs::from_epsg(27700).unwrap();
        let to = utm(31, Hemisphere::North);
        let transformer = CoordTransformer::new(from, to).unwrap();
        let direct = transformer
            .transform(Coord {
                x: 651_409.903,
                y: 313_177.270,
            })
            .unwrap();
        let lonlat = to_geographic(from, Coord {
            x: 651_409.903,
            y: 313_177.270,
        })
        .unwrap();
        let pivoted = from_geographic(to, lonlat).unwrap();
        assert_abs_diff_eq!(direct.x, pivoted.x, epsilon = 1e-6);
        assert_abs_diff_eq!(direct.y, pivoted.y, epsilon = 1e-6);
    }

    #[test]
    fn web_mercator_round_trip() {
        let original = Coord { x: -122.4, y: 37.8 };
        let merc = from_geographic(Crs::WebMercator, original).unwrap();
        let back = to_geographic(Crs::WebMercator, merc).unwrap();
        assert_abs_diff_eq!(back.x, original.x, epsilon = 1e-9);
        assert_abs_diff_eq!(back.y, original.y, epsilon = 1e-9);
    }

    #[test]
    fn web_mercator_rejects_polar_latitudes() {
        let err = from_geographic(Crs::WebMercator, Coord { x: 0.0, y: 86.0 }).unwrap_err();
        assert!(matches!(err, GridError::InvalidCoordinate { .. }));
    }

    #[test]
    fn rejects_out_of_range_geographic_input() {
        let err = from_geographic(Crs::Wgs84, Coord { x: 200.0, y: 0.0 }).unwrap_err();
        assert!(matches!(err, GridError::InvalidCoordinate { .. }));
    }

    #[test]
    fn same_system_is_identity() {
        let c = Coord { x: 123.0, y: 456.0 };
        let transformer = CoordTransformer::new(Crs::WebMercator, Crs::WebMercator).unwrap();
        assert_eq!(transformer.transform(c).unwrap(), c);
    }
}
