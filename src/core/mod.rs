//! Core band processing stages

pub mod extract;
pub mod metadata;
pub mod radiometric;
pub mod cloud_mask;
pub mod georeference;
pub mod pipeline;

// Re-export main types
pub use extract::{ExtractedScene, SubdatasetExtractor};
pub use metadata::MetadataResolver;
pub use radiometric::{calc_toa, RadiometricConverter, RadiometricModel, ReflectanceSet, SOLAR_IRRADIANCE};
pub use cloud_mask::{CloudMaskArtifact, CloudMaskEngine, CloudMaskInputSet, CloudMaskResult, CloudMaskRule};
pub use georeference::{corner_gcps, image_corners, GeoreferencedSet, Georeferencer};
pub use pipeline::{GeorefSource, Ocm2Pipeline, PipelineOutput, PipelineParams, PipelineStage};
