//! Reference systems and UTM zone selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::projection::epsg_definition;

const EPSG_WGS84: u32 = 4326;
const EPSG_WEB_MERCATOR: u32 = 3857;
const EPSG_UTM_NORTH_BASE: u32 = 32600;
const EPSG_UTM_SOUTH_BASE: u32 = 32700;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    North,
    South,
}

/// One 6-degree WGS84 UTM band in one hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    zone: u8,
    hemisphere: Hemisphere,
}

impl UtmZone {
    pub fn new(zone: u8, hemisphere: Hemisphere) -> GridResult<Self> {
        if !(1..=60).contains(&zone) {
            return Err(GridError::UnsupportedCrs(format!("UTM zone {zone}")));
        }
        Ok(Self { zone, hemisphere })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// Central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        f64::from(self.zone) * 6.0 - 183.0
    }
}

/// Reference systems the grid pipeline can read, compute in, and write.
///
/// WGS84, Web Mercator and the WGS84 UTM zones are typed; any other EPSG
/// code with a known projection definition is carried as `Epsg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Longitude/latitude degrees on WGS84.
    Wgs84,
    /// Spherical pseudo-Mercator.
    WebMercator,
    Utm(UtmZone),
    Epsg(u32),
}

impl Crs {
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => EPSG_WGS84,
            Crs::WebMercator => EPSG_WEB_MERCATOR,
            Crs::Utm(utm) => match utm.hemisphere {
                Hemisphere::North => EPSG_UTM_NORTH_BASE + u32::from(utm.zone),
                Hemisphere::South => EPSG_UTM_SOUTH_BASE + u32::from(utm.zone),
            },
            Crs::Epsg(code) => *code,
        }
    }

    pub fn from_epsg(code: u32) -> GridResult<Self> {
        match code {
            EPSG_WGS84 => Ok(Crs::Wgs84),
            EPSG_WEB_MERCATOR | 900913 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm(UtmZone::new(
                (code - EPSG_UTM_NORTH_BASE) as u8,
                Hemisphere::North,
            )?)),
            32701..=32760 => Ok(Crs::Utm(UtmZone::new(
                (code - EPSG_UTM_SOUTH_BASE) as u8,
                Hemisphere::South,
            )?)),
            other if epsg_definition(other).is_some() => Ok(Crs::Epsg(other)),
            other => Err(GridError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    /// True when coordinates are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Wgs84 => true,
            Crs::Epsg(code) => {
                epsg_definition(*code).is_some_and(|def| def.starts_with("+proj=longlat"))
            }
            Crs::WebMercator | Crs::Utm(_) => false,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = GridError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper == "CRS84" || upper.ends_with(":CRS84") {
            return Ok(Crs::Wgs84);
        }

        // EPSG:4326, urn:ogc:def:crs:EPSG::4326, urn:ogc:def:crs:EPSG:6.6:4326
        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            upper.rsplit(':').next().unwrap_or_default()
        } else {
            return Err(GridError::UnsupportedCrs(trimmed.to_string()));
        };

        let code = code
            .trim()
            .parse::<u32>()
            .map_err(|_| GridError::UnsupportedCrs(trimmed.to_string()))?;
        Self::from_epsg(code)
    }
}

impl TryFrom<String> for Crs {
    type Error = GridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

/// Picks the UTM zone containing `lon`, switching to the southern variant
/// when `lat` is negative.
///
/// Zones are 6-degree bands numbered from 1 at -180. Longitude 180 belongs
/// to zone 60 rather than a nonexistent zone 61.
pub fn select_projection(lon: f64, lat: f64) -> GridResult<Crs> {
    let in_range = (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat);
    if !in_range {
        return Err(GridError::InvalidCoordinate { lon, lat });
    }

    let zone = (((lon + 180.0) / 6.0).floor() as u8 + 1).min(60);
    let hemisphere = if lat < 0.0 {
        Hemisphere::South
    } else {
        Hemisphere::North
    };
    Ok(Crs::Utm(UtmZone::new(zone, hemisphere)?))
}
