use crate::io::raster::{attach_gcps, read_profile};
use crate::io::workspace::{file_stem, reset_dir};
use crate::types::{
    CancellationToken, GeoTransform, GroundControlPoint, OcmError, OcmResult, RasterProfile,
    SceneMetadata,
};
use gdal::spatial_ref::SpatialRef;
use std::fs;
use std::path::{Path, PathBuf};

/// Coordinate reference attached to every GCP set (WGS84 longitude/latitude)
pub const GCP_EPSG: u32 = 4326;

/// Image corners in map units, ordered {UL, UR, LR, LL}
pub fn image_corners(transform: &GeoTransform, width: usize, height: usize) -> [(f64, f64); 4] {
    let x_min = transform.top_left_x;
    let y_max = transform.top_left_y;
    let x_max = x_min + width as f64 * transform.pixel_width;
    let y_min = y_max + height as f64 * transform.pixel_height;

    [(x_min, y_max), (x_max, y_max), (x_max, y_min), (x_min, y_min)]
}

/// Four GCPs pairing image corner i with scene corner i.
///
/// Pixel/line values are taken as magnitudes: GDAL does not handle negative
/// pixel positions in GCPs well.
pub fn corner_gcps(profile: &RasterProfile, metadata: &SceneMetadata) -> OcmResult<[GroundControlPoint; 4]> {
    if profile.transform.is_degenerate() || profile.width == 0 || profile.height == 0 {
        return Err(OcmError::DegenerateTransform(format!(
            "{:?} over {}x{} pixels",
            profile.transform, profile.width, profile.height
        )));
    }

    let corners = image_corners(&profile.transform, profile.width, profile.height);
    let geo = metadata.corners();

    Ok(std::array::from_fn(|i| GroundControlPoint {
        geo_x: geo[i].longitude,
        geo_y: geo[i].latitude,
        elevation: 0.0,
        pixel: corners[i].0.abs(),
        line: corners[i].1.abs(),
    }))
}

/// Georeferenced copies written by the georeferencer
#[derive(Debug, Clone)]
pub struct GeoreferencedSet {
    pub dir: PathBuf,
    pub rasters: Vec<PathBuf>,
}

/// Attaches corner GCPs to copies of stage rasters
pub struct Georeferencer {
    suffix: String,
    parallel: bool,
    gcp_wkt: String,
}

impl Georeferencer {
    pub fn new(suffix: impl Into<String>, parallel: bool) -> OcmResult<Self> {
        let gcp_wkt = SpatialRef::from_epsg(GCP_EPSG)?.to_wkt()?;
        Ok(Self {
            suffix: suffix.into(),
            parallel,
            gcp_wkt,
        })
    }

    /// Output path for an input raster: `<stem><suffix>.TIF`
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}{}.TIF", file_stem(input), self.suffix))
    }

    /// Copy `input` into `output_dir` and attach the four corner GCPs to the copy.
    /// The input file is never modified.
    pub fn georeference(
        &self,
        input: &Path,
        metadata: &SceneMetadata,
        output_dir: &Path,
    ) -> OcmResult<PathBuf> {
        let profile = read_profile(input)?;
        let gcps = corner_gcps(&profile, metadata).map_err(|e| match e {
            OcmError::DegenerateTransform(msg) => {
                OcmError::DegenerateTransform(format!("{}: {}", input.display(), msg))
            }
            other => other,
        })?;

        let out_path = self.output_path(input, output_dir);
        fs::copy(input, &out_path)?;
        attach_gcps(&out_path, &gcps, &self.gcp_wkt)?;

        log::info!("Georeferenced {} -> {}", input.display(), out_path.display());
        log::debug!("GCPs: {:?}", gcps);
        Ok(out_path)
    }

    /// Georeference every input into `output_dir`, which is cleared first
    pub fn georeference_all(
        &self,
        inputs: &[PathBuf],
        metadata: &SceneMetadata,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<GeoreferencedSet> {
        log::info!(
            "Georeferencing {} rasters into {} (EPSG:{})",
            inputs.len(),
            output_dir.display(),
            GCP_EPSG
        );
        reset_dir(output_dir)?;

        let rasters = self.run_all(inputs, metadata, output_dir, cancel)?;

        Ok(GeoreferencedSet {
            dir: output_dir.to_path_buf(),
            rasters,
        })
    }

    #[cfg(feature = "parallel")]
    fn run_all(
        &self,
        inputs: &[PathBuf],
        metadata: &SceneMetadata,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<PathBuf>> {
        use rayon::prelude::*;

        if !self.parallel {
            return self.run_sequential(inputs, metadata, output_dir, cancel);
        }

        inputs
            .par_iter()
            .map(|input| {
                cancel.check()?;
                self.georeference(input, metadata, output_dir)
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_all(
        &self,
        inputs: &[PathBuf],
        metadata: &SceneMetadata,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<PathBuf>> {
        self.run_sequential(inputs, metadata, output_dir, cancel)
    }

    fn run_sequential(
        &self,
        inputs: &[PathBuf],
        metadata: &SceneMetadata,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<PathBuf>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            cancel.check()?;
            outputs.push(self.georeference(input, metadata, output_dir)?);
        }
        Ok(outputs)
    }
}
