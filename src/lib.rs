pub mod boundary;
pub mod config;
pub mod coverage;
pub mod crs;
pub mod error;
pub mod grid;
pub mod io;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod source;
pub mod summary;

pub use config::{GridJob, JobLoader, LayerSpec, PipelineSettings};
pub use crs::{select_projection, Crs, Hemisphere, UtmZone};
pub use error::{GridError, GridResult};
pub use grid::{CellGrid, CellSize, GridCell};
pub use pipeline::{GridPipeline, GridRun, ProjectedGrid};
