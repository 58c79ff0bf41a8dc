use crate::core::cloud_mask::{CloudMaskArtifact, CloudMaskEngine, CloudMaskRule, CLOUD_MASK_NAME};
use crate::core::extract::{ExtractedScene, SubdatasetExtractor};
use crate::core::georeference::{GeoreferencedSet, Georeferencer};
use crate::core::metadata::MetadataResolver;
use crate::core::radiometric::{RadiometricConverter, RadiometricModel, ReflectanceSet};
use crate::io::container::{HdfContainer, SceneContainer};
use crate::io::workspace::remove_dir;
use crate::types::{CancellationToken, OcmResult, SceneMetadata, DEFAULT_NODATA};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which stage output receives ground control points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeorefSource {
    /// TOA reflectance bands (and pass-through bands)
    Reflectance,
    /// Raw extracted bands
    Extracted,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub extract_dir: String,
    pub reflectance_dir: String,
    pub georef_dir: String,
    /// Appended to the file stem of every georeferenced raster
    pub georef_suffix: String,
    pub nodata: f64,
    /// GeoTIFF COMPRESS creation option, `None` writes uncompressed
    pub compression: Option<String>,
    pub georef_source: GeorefSource,
    /// Keep the extraction and reflectance folders after a successful run
    pub keep_intermediates: bool,
    /// Process bands on the rayon pool (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            extract_dir: "GeoTiff".to_string(),
            reflectance_dir: "Reflectance".to_string(),
            georef_dir: "GeoTiff_ref".to_string(),
            georef_suffix: "_georef".to_string(),
            nodata: DEFAULT_NODATA,
            compression: Some("LZW".to_string()),
            georef_source: GeorefSource::Reflectance,
            keep_intermediates: false,
            parallel: true,
        }
    }
}

/// Pipeline states, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Extracted,
    Converted,
    CloudMasked,
    Georeferenced,
    Cleaned,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Extracted => write!(f, "Extracted"),
            PipelineStage::Converted => write!(f, "Converted"),
            PipelineStage::CloudMasked => write!(f, "CloudMasked"),
            PipelineStage::Georeferenced => write!(f, "Georeferenced"),
            PipelineStage::Cleaned => write!(f, "Cleaned"),
        }
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub stage: PipelineStage,
    pub metadata: SceneMetadata,
    pub output_dir: PathBuf,
    pub georeferenced: Vec<PathBuf>,
    pub cloud_mask: PathBuf,
    pub cloud_pixels: usize,
}

/// Runs extraction, conversion, cloud masking and georeferencing for one scene
pub struct Ocm2Pipeline {
    params: PipelineParams,
    radiometric_model: RadiometricModel,
    cloud_rule: CloudMaskRule,
    cancel: CancellationToken,
}

impl Ocm2Pipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self {
            params,
            radiometric_model: RadiometricModel::default(),
            cloud_rule: CloudMaskRule::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a caller-owned token so the run can be cancelled from another thread
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn extract_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.params.extract_dir)
    }

    pub fn reflectance_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.params.reflectance_dir)
    }

    pub fn georef_dir(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.params.georef_dir)
    }

    /// Open an HDF scene with GDAL and run the full pipeline on it
    pub fn run_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        scene: P,
        work_dir: Q,
    ) -> OcmResult<PipelineOutput> {
        let container = HdfContainer::open(scene)?;
        self.run(&container, work_dir.as_ref())
    }

    /// Run every stage in order. On failure the failing stage's folder is left
    /// in place and later stages do not run.
    pub fn run<C: SceneContainer + ?Sized>(
        &self,
        container: &C,
        work_dir: &Path,
    ) -> OcmResult<PipelineOutput> {
        log::info!("Processing scene {} in {}", container.name(), work_dir.display());

        let metadata = MetadataResolver::resolve(container)?;

        let extracted = self
            .extract(container, work_dir)
            .inspect_err(|e| log::warn!("Extraction failed: {}", e))?;
        self.enter(PipelineStage::Extracted);

        let reflectance = self
            .convert(&extracted, &metadata, work_dir)
            .inspect_err(|e| log::warn!("Reflectance conversion failed: {}", e))?;
        self.enter(PipelineStage::Converted);

        let mask = self
            .cloud_mask(&reflectance)
            .inspect_err(|e| log::warn!("Cloud masking failed: {}", e))?;
        self.enter(PipelineStage::CloudMasked);

        let georeferenced = self
            .georeference(&extracted, &reflectance, &mask, &metadata, work_dir)
            .inspect_err(|e| log::warn!("Georeferencing failed: {}", e))?;
        self.enter(PipelineStage::Georeferenced);

        self.clean(work_dir)?;
        self.enter(PipelineStage::Cleaned);

        let cloud_mask = georeferenced.dir.join(format!(
            "{}{}.TIF",
            CLOUD_MASK_NAME, self.params.georef_suffix
        ));

        log::info!("Scene done, outputs in {}", georeferenced.dir.display());
        Ok(PipelineOutput {
            stage: PipelineStage::Cleaned,
            metadata,
            output_dir: georeferenced.dir,
            georeferenced: georeferenced.rasters,
            cloud_mask,
            cloud_pixels: mask.cloud_pixels,
        })
    }

    fn enter(&self, stage: PipelineStage) {
        log::info!("Pipeline stage reached: {}", stage);
    }

    /// Extraction stage into `<work_dir>/<extract_dir>`
    pub fn extract<C: SceneContainer + ?Sized>(
        &self,
        container: &C,
        work_dir: &Path,
    ) -> OcmResult<ExtractedScene> {
        SubdatasetExtractor::new(self.params.nodata, self.params.compression.clone()).extract(
            container,
            &self.extract_dir(work_dir),
            &self.cancel,
        )
    }

    /// Reflectance stage into `<work_dir>/<reflectance_dir>`
    pub fn convert(
        &self,
        extracted: &ExtractedScene,
        metadata: &SceneMetadata,
        work_dir: &Path,
    ) -> OcmResult<ReflectanceSet> {
        RadiometricConverter::new(
            self.radiometric_model.clone(),
            self.params.compression.clone(),
            self.params.parallel,
        )
        .convert(
            extracted,
            metadata.sun_elevation,
            &self.reflectance_dir(work_dir),
            &self.cancel,
        )
    }

    /// Cloud mask stage, written next to the reflectance bands
    pub fn cloud_mask(&self, reflectance: &ReflectanceSet) -> OcmResult<CloudMaskArtifact> {
        self.cancel.check()?;
        CloudMaskEngine::new(self.cloud_rule.clone()).run(
            reflectance,
            &reflectance.dir,
            self.params.compression.as_deref(),
        )
    }

    /// Georeference the selected band set plus the cloud mask into `<work_dir>/<georef_dir>`
    pub fn georeference(
        &self,
        extracted: &ExtractedScene,
        reflectance: &ReflectanceSet,
        mask: &CloudMaskArtifact,
        metadata: &SceneMetadata,
        work_dir: &Path,
    ) -> OcmResult<GeoreferencedSet> {
        let bands = match self.params.georef_source {
            GeorefSource::Reflectance => &reflectance.bands,
            GeorefSource::Extracted => &extracted.bands,
        };

        let mut inputs: Vec<PathBuf> = bands.iter().map(|b| b.path.clone()).collect();
        inputs.push(mask.path.clone());

        Georeferencer::new(self.params.georef_suffix.clone(), self.params.parallel)?
            .georeference_all(&inputs, metadata, &self.georef_dir(work_dir), &self.cancel)
    }

    /// Drop the extraction and reflectance folders
    pub fn clean(&self, work_dir: &Path) -> OcmResult<()> {
        if self.params.keep_intermediates {
            log::info!("Keeping intermediate folders");
            return Ok(());
        }
        remove_dir(self.extract_dir(work_dir))?;
        remove_dir(self.reflectance_dir(work_dir))?;
        Ok(())
    }
}

impl Default for Ocm2Pipeline {
    fn default() -> Self {
        Self::new(PipelineParams::default())
    }
}
