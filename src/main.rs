use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridclip::{GridJob, GridPipeline, JobLoader, LayerSpec};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate a grid within a boundary polygon with cell size in meters"
)]
struct Cli {
    /// YAML job file; command-line values override its fields
    #[arg(long)]
    job: Option<PathBuf>,

    /// Path to the boundary polygon file
    #[arg(long)]
    boundary: Option<PathBuf>,

    /// Cell width in meters
    #[arg(long)]
    cell_width: Option<f64>,

    /// Cell height in meters
    #[arg(long)]
    cell_height: Option<f64>,

    /// Polygon files to measure coverage for, each as PATH or NAME=PATH
    #[arg(
        long = "coverage-file",
        alias = "coverage_file",
        value_name = "[NAME=]PATH",
        num_args = 1..
    )]
    coverage_files: Vec<LayerSpec>,

    /// Output GeoJSON file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Coordinate snap grid in degrees
    #[arg(long, conflicts_with = "no_snap")]
    precision: Option<f64>,

    /// Write coordinates at full precision
    #[arg(long)]
    no_snap: bool,

    /// Drop cells with less than this percentage of their tile inside the boundary
    #[arg(long)]
    min_coverage: Option<f64>,

    /// Clip and measure cells on all cores
    #[arg(long)]
    parallel: bool,

    /// Emit row/col attributes
    #[arg(long)]
    include_indices: bool,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_job(self) -> Result<GridJob> {
        let mut job = match &self.job {
            Some(path) => JobLoader::new(".").load(path)?,
            None => {
                let (Some(boundary), Some(width), Some(height)) =
                    (self.boundary.clone(), self.cell_width, self.cell_height)
                else {
                    bail!("either --job or --boundary, --cell-width and --cell-height are required");
                };
                GridJob::new(boundary, width, height)
            }
        };

        if let Some(boundary) = self.boundary {
            job.boundary = boundary;
        }
        if let Some(width) = self.cell_width {
            job.cell_width = width;
        }
        if let Some(height) = self.cell_height {
            job.cell_height = height;
        }
        if let Some(output) = self.output {
            job.output = output;
        }
        if self.no_snap {
            job.precision = None;
        } else if let Some(precision) = self.precision {
            job.precision = Some(precision);
        }
        if self.min_coverage.is_some() {
            job.min_coverage_pct = self.min_coverage;
        }
        if self.summary.is_some() {
            job.summary = self.summary;
        }
        job.parallel |= self.parallel;
        job.include_indices |= self.include_indices;
        job.layers.extend(self.coverage_files);
        Ok(job)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let job = cli.into_job()?;
    let run = GridPipeline::run_job(&job)?;
    println!(
        "Grid saved to {} ({} of {} cells kept, gridded in {})",
        job.output.display(),
        run.summary.surviving_cells,
        run.summary.tiled_cells,
        run.summary.projected_crs
    );
    Ok(())
}
