use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    coverage::derive_layer_name,
    error::{GridError, GridResult},
    grid::CellSize,
    output::DEFAULT_PRECISION,
};

fn default_output() -> PathBuf {
    PathBuf::from("grid_boundary.geojson")
}

fn default_precision() -> Option<f64> {
    Some(DEFAULT_PRECISION)
}

/// A grid job as written in YAML. Relative paths are resolved against the
/// directory holding the job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridJob {
    pub boundary: PathBuf,
    pub cell_width: f64,
    pub cell_height: f64,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Snap grid in degrees; `null` keeps full precision.
    #[serde(default = "default_precision")]
    pub precision: Option<f64>,
    #[serde(default)]
    pub min_coverage_pct: Option<f64>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub include_indices: bool,
    #[serde(default)]
    pub summary: Option<PathBuf>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
}

impl LayerSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: Some(name.into()),
        }
    }

    /// The explicit name, or one derived from the file location.
    pub fn resolved_name(&self) -> Option<String> {
        self.name.clone().or_else(|| derive_layer_name(&self.path))
    }
}

/// `PATH` or `NAME=PATH`, as accepted on the command line.
impl FromStr for LayerSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty coverage layer".into());
        }
        match s.split_once('=') {
            Some((name, path)) if !name.is_empty() && !name.contains(['/', '\\']) => {
                if path.is_empty() {
                    return Err(format!("coverage layer '{name}' has no path"));
                }
                Ok(Self::named(name, path))
            }
            _ => Ok(Self::new(s)),
        }
    }
}

/// Validated numeric parameters for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub cell_size: CellSize,
    pub min_coverage_pct: Option<f64>,
    pub precision: Option<f64>,
    pub parallel: bool,
}

impl PipelineSettings {
    pub fn new(cell_width: f64, cell_height: f64) -> GridResult<Self> {
        Ok(Self {
            cell_size: CellSize::new(cell_width, cell_height)?,
            min_coverage_pct: None,
            precision: default_precision(),
            parallel: false,
        })
    }

    pub fn with_min_coverage(mut self, pct: Option<f64>) -> GridResult<Self> {
        if let Some(value) = pct {
            if !(0.0..=100.0).contains(&value) {
                return Err(GridError::InvalidThreshold(value));
            }
        }
        self.min_coverage_pct = pct;
        Ok(self)
    }

    pub fn with_precision(mut self, precision: Option<f64>) -> GridResult<Self> {
        if let Some(value) = precision {
            if !value.is_finite() || value <= 0.0 {
                return Err(GridError::InvalidPrecision(value));
            }
        }
        self.precision = precision;
        Ok(self)
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl GridJob {
    pub fn new(boundary: impl Into<PathBuf>, cell_width: f64, cell_height: f64) -> Self {
        Self {
            boundary: boundary.into(),
            cell_width,
            cell_height,
            output: default_output(),
            precision: default_precision(),
            min_coverage_pct: None,
            parallel: false,
            include_indices: false,
            summary: None,
            layers: Vec::new(),
        }
    }

    pub fn settings(&self) -> GridResult<PipelineSettings> {
        PipelineSettings::new(self.cell_width, self.cell_height)?
            .with_min_coverage(self.min_coverage_pct)?
            .with_precision(self.precision)
            .map(|settings| settings.with_parallel(self.parallel))
    }

    /// Makes every relative path absolute with respect to `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.boundary);
        resolve(&mut self.output);
        if let Some(summary) = self.summary.as_mut() {
            resolve(summary);
        }
        for layer in &mut self.layers {
            // Names derived from the path must not pick up the base directory.
            if layer.name.is_none() {
                layer.name = layer.resolved_name();
            }
            resolve(&mut layer.path);
        }
        self
    }
}

pub struct JobLoader {
    base_dir: PathBuf,
}

impl JobLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<GridJob> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        let job: GridJob = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let job_dir = path.parent().unwrap_or(Path::new("."));
        Ok(job.resolve_paths(job_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
boundary: boundary.geojson
cell_width: 250
cell_height: 125.5
layers:
  - path: forest/cover.geojson
  - path: water.geojson
    name: lakes
"#;

    #[test]
    fn defaults_fill_missing_fields() {
        let job: GridJob = serde_yaml::from_str(JOB).unwrap();
        assert_eq!(job.output, PathBuf::from("grid_boundary.geojson"));
        assert_eq!(job.precision, Some(DEFAULT_PRECISION));
        assert_eq!(job.min_coverage_pct, None);
        assert!(!job.parallel);
        assert_eq!(job.layers.len(), 2);
        assert_eq!(job.layers[0].resolved_name().as_deref(), Some("forest"));
        assert_eq!(job.layers[1].resolved_name().as_deref(), Some("lakes"));
    }

    #[test]
    fn null_precision_disables_snapping() {
        let text = "boundary: b.geojson\ncell_width: 10\ncell_height: 10\nprecision: null\n";
        let job: GridJob = serde_yaml::from_str(text).unwrap();
        assert_eq!(job.precision, None);
        assert_eq!(job.settings().unwrap().precision, None);
    }

    #[test]
    fn settings_validate_parameters() {
        let mut job = GridJob::new("b.geojson", 0.0, 10.0);
        assert!(matches!(
            job.settings(),
            Err(GridError::InvalidCellSize { .. })
        ));
        job.cell_width = 10.0;
        job.min_coverage_pct = Some(120.0);
        assert!(matches!(job.settings(), Err(GridError::InvalidThreshold(_))));
        job.min_coverage_pct = Some(50.0);
        job.precision = Some(-1.0);
        assert!(matches!(job.settings(), Err(GridError::InvalidPrecision(_))));
    }

    #[test]
    fn loader_resolves_paths_against_job_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("job.yaml"), JOB).unwrap();

        let job = JobLoader::new(dir.path()).load("job.yaml").unwrap();
        assert_eq!(job.boundary, dir.path().join("boundary.geojson"));
        assert_eq!(job.output, dir.path().join("grid_boundary.geojson"));
        assert_eq!(job.layers[0].path, dir.path().join("forest/cover.geojson"));
        assert_eq!(job.layers[0].name.as_deref(), Some("forest"));
    }

    #[test]
    fn loader_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JobLoader::new(dir.path()).load("absent.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read job file"));
    }

    #[test]
    fn layer_spec_parses_cli_forms() {
        assert_eq!(
            "forest=data/f.geojson".parse::<LayerSpec>().unwrap(),
            LayerSpec::named("forest", "data/f.geojson")
        );
        assert_eq!(
            "data/forest/f.geojson".parse::<LayerSpec>().unwrap(),
            LayerSpec::new("data/forest/f.geojson")
        );
        assert_eq!(
            "data/a=b/f.geojson".parse::<LayerSpec>().unwrap(),
            LayerSpec::new("data/a=b/f.geojson")
        );
        assert!("forest=".parse::<LayerSpec>().is_err());
    }
}
