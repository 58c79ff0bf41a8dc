//! ocm2: band processing for Oceansat-2 OCM-2 L1B scenes
//!
//! Extracts the subdatasets of an OCM-2 HDF product to GeoTIFF, converts
//! bands 1-7 to top-of-atmosphere reflectance, derives a cloud mask from the
//! reflectance bands and attaches corner ground control points (EPSG:4326)
//! to copies of the results.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BandArtifact, BandIndex, CancellationToken, GeoCorner, GeoTransform, GroundControlPoint,
    OcmError, OcmResult, RasterBand, RasterProfile, SceneMetadata,
};

pub use crate::io::{HdfContainer, SceneContainer, Subdataset};
pub use crate::core::{Ocm2Pipeline, PipelineOutput, PipelineParams, PipelineStage};
