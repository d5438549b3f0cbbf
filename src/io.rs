//! GeoJSON reading and writing.

use std::fs;
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue, Value};

use crate::crs::Crs;
use crate::error::{GridError, GridResult};
use crate::grid::CellGrid;
use crate::source::VectorSource;

fn parse_error(label: &str, message: impl ToString) -> GridError {
    GridError::Parse {
        path: label.into(),
        message: message.to_string(),
    }
}

/// Reads the legacy `crs` member (`{"type": "name", "properties": {"name": ...}}`
/// or the older `{"type": "EPSG", "properties": {"code": ...}}`).
fn legacy_crs(members: Option<&JsonObject>) -> GridResult<Option<Crs>> {
    let Some(crs) = members.and_then(|members| members.get("crs")) else {
        return Ok(None);
    };
    if crs.is_null() {
        return Ok(None);
    }
    let properties = crs.get("properties");
    if let Some(name) = properties.and_then(|p| p.get("name")).and_then(JsonValue::as_str) {
        return name.parse().map(Some);
    }
    if let Some(code) = properties.and_then(|p| p.get("code")).and_then(JsonValue::as_u64) {
        let code =
            u32::try_from(code).map_err(|_| GridError::UnsupportedCrs(format!("EPSG:{code}")))?;
        return Crs::from_epsg(code).map(Some);
    }
    Err(GridError::UnsupportedCrs(crs.to_string()))
}

fn convert(label: &str, geometry: Option<geojson::Geometry>) -> GridResult<geo::Geometry<f64>> {
    let geometry = geometry.ok_or_else(|| GridError::unsupported_geometry(label, "null"))?;
    geo::Geometry::<f64>::try_from(geometry.value).map_err(|err| parse_error(label, err))
}

/// Parses GeoJSON text into a vector source labelled `label`.
pub fn parse_geojson(label: &str, text: &str) -> GridResult<VectorSource> {
    let geojson: GeoJson = text.parse().map_err(|err| parse_error(label, err))?;

    let (crs, features) = match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = legacy_crs(collection.foreign_members.as_ref())?;
            let features = collection
                .features
                .into_iter()
                .map(|feature| convert(label, feature.geometry))
                .collect::<GridResult<Vec<_>>>()?;
            (crs, features)
        }
        GeoJson::Feature(feature) => {
            let crs = legacy_crs(feature.foreign_members.as_ref())?;
            (crs, vec![convert(label, feature.geometry)?])
        }
        GeoJson::Geometry(geometry) => {
            let crs = legacy_crs(geometry.foreign_members.as_ref())?;
            (crs, vec![convert(label, Some(geometry))?])
        }
    };

    Ok(VectorSource::new(label, crs, features))
}

/// Loads a GeoJSON file. The source is labelled with its path.
pub fn read_vector_source(path: &Path) -> GridResult<VectorSource> {
    let text = fs::read_to_string(path).map_err(|source| GridError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_geojson(&path.display().to_string(), &text)
}

/// One feature per cell: integer `id`, one area per layer, and optionally
/// the `row`/`col` lattice indices.
pub fn to_feature_collection(grid: &CellGrid, include_indices: bool) -> FeatureCollection {
    let features = grid
        .cells()
        .iter()
        .map(|cell| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(cell.id));
            if include_indices {
                properties.insert("row".to_string(), JsonValue::from(cell.row));
                properties.insert("col".to_string(), JsonValue::from(cell.col));
            }
            for layer in grid.layers() {
                let area = cell.coverage(layer).unwrap_or(0.0);
                properties.insert(layer.clone(), JsonValue::from(area));
            }

            let value = match cell.geometry.0.as_slice() {
                [single] => Value::from(single),
                _ => Value::from(&cell.geometry),
            };
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(value)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_grid(path: &Path, grid: &CellGrid, include_indices: bool) -> GridResult<()> {
    let collection = to_feature_collection(grid, include_indices);
    let json = serde_json::to_string_pretty(&collection)
        .map_err(|err| parse_error(&path.display().to_string(), err))?;
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
