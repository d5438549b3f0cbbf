use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    boundary::normalize_boundary,
    config::{GridJob, LayerSpec, PipelineSettings},
    coverage::{accumulate_all, CoverageLayer},
    crs::Crs,
    error::{GridError, GridResult},
    grid::{clip, filter_min_coverage, tile, CellGrid},
    io::{read_vector_source, write_grid},
    output::finalize,
    source::VectorSource,
    summary::RunSummary,
};

/// Cells in the local metric system, before the final reprojection.
#[derive(Debug, Clone)]
pub struct ProjectedGrid {
    pub boundary: String,
    pub tiled_cells: usize,
    pub grid: CellGrid,
}

impl ProjectedGrid {
    pub fn crs(&self) -> Crs {
        self.grid.crs()
    }
}

#[derive(Debug, Clone)]
pub struct GridRun {
    /// Final cells in WGS84.
    pub grid: CellGrid,
    pub summary: RunSummary,
}

pub struct GridPipeline {
    settings: PipelineSettings,
}

impl GridPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Normalize, project, tile, clip, filter and accumulate coverage, all
    /// in the UTM zone picked from the boundary centroid.
    pub fn build_projected(
        &self,
        boundary: &VectorSource,
        layers: &[CoverageLayer],
    ) -> GridResult<ProjectedGrid> {
        let boundary = normalize_boundary(boundary)?;
        let crs = boundary.local_projection()?;
        info!(boundary = boundary.label(), %crs, "selected local projection");

        let projected = boundary.project(crs)?;
        let cells = tile(&projected, self.settings.cell_size)?;
        let tiled_cells = cells.len();
        debug!(cells = tiled_cells, "tiled bounding rectangle");

        let mut cells = clip(cells, &projected, self.settings.parallel);
        info!(tiled = tiled_cells, kept = cells.len(), "clipped grid to boundary");

        if let Some(min_pct) = self.settings.min_coverage_pct {
            cells = filter_min_coverage(cells, min_pct)?;
            info!(min_pct, kept = cells.len(), "applied minimum coverage filter");
            if cells.is_empty() {
                warn!(min_pct, "no cell meets the minimum coverage");
            }
        }

        let grid = accumulate_all(CellGrid::new(crs, cells), layers, self.settings.parallel)
            .map_err(|failure| failure.error)?;
        for layer in grid.layers() {
            info!(
                layer = layer.as_str(),
                total_m2 = grid.layer_total(layer).unwrap_or(0.0),
                "accumulated coverage"
            );
        }

        Ok(ProjectedGrid {
            boundary: boundary.label().to_string(),
            tiled_cells,
            grid,
        })
    }

    pub fn run(&self, boundary: &VectorSource, layers: &[CoverageLayer]) -> GridResult<GridRun> {
        let projected = self.build_projected(boundary, layers)?;
        let summary = RunSummary {
            generated_at: Utc::now(),
            boundary: projected.boundary.clone(),
            projected_crs: projected.crs(),
            cell_width: self.settings.cell_size.width(),
            cell_height: self.settings.cell_size.height(),
            tiled_cells: projected.tiled_cells,
            surviving_cells: projected.grid.len(),
            grid_area: projected.grid.total_area(),
            layers: RunSummary::layer_summaries(&projected.grid),
        };

        let grid = finalize(projected.grid, self.settings.precision, self.settings.parallel)?;
        info!(cells = grid.len(), "reprojected grid to {}", grid.crs());
        Ok(GridRun { grid, summary })
    }

    /// Loads every input named by `job`, runs the pipeline and writes the
    /// grid (and summary, when requested) to disk.
    pub fn run_job(job: &GridJob) -> Result<GridRun> {
        let pipeline = GridPipeline::new(job.settings()?);

        let boundary = read_vector_source(&job.boundary)
            .with_context(|| format!("Failed to load boundary {}", job.boundary.display()))?;
        let layers = job
            .layers
            .iter()
            .map(load_layer)
            .collect::<GridResult<Vec<_>>>()?;

        let run = pipeline.run(&boundary, &layers)?;
        write_grid(&job.output, &run.grid, job.include_indices)?;
        info!(path = %job.output.display(), "wrote grid");

        if let Some(path) = &job.summary {
            run.summary.write(path)?;
            info!(path = %path.display(), "wrote run summary");
        }
        Ok(run)
    }
}

fn load_layer(spec: &LayerSpec) -> GridResult<CoverageLayer> {
    let name = spec.resolved_name().ok_or_else(|| {
        GridError::layer(
            spec.path.display().to_string(),
            unnamed_layer(&spec.path),
        )
    })?;
    let source = read_vector_source(&spec.path).map_err(|err| GridError::layer(&name, err))?;
    debug!(layer = name.as_str(), features = source.features.len(), "loaded coverage layer");
    Ok(CoverageLayer::new(name, source))
}

fn unnamed_layer(path: &Path) -> GridError {
    GridError::Parse {
        path: path.to_path_buf(),
        message: "cannot derive a layer name; pass NAME=PATH".to_string(),
    }
}
