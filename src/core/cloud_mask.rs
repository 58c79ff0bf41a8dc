//! Cloud mask from TOA reflectance band algebra
//!
//! A pixel is cloud when the summed reflectance of bands 1-7 is high, band 2
//! is much brighter than band 7, and band 2 is darker than band 1.

use crate::core::radiometric::ReflectanceSet;
use crate::io::raster::{read_band, write_raster};
use crate::types::{
    BandImage, BandIndex, MaskImage, OcmError, OcmResult, RasterBand, RasterProfile,
    RADIOMETRIC_BAND_COUNT,
};
use ndarray::Zip;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File stem of the mask raster
pub const CLOUD_MASK_NAME: &str = "cloud_mask";

/// Decision thresholds of the mask rule
#[derive(Debug, Clone, PartialEq)]
pub struct CloudMaskRule {
    /// Sum of bands 1-7 must exceed this
    pub sum_threshold: f64,
    /// band2 / band7 must exceed this
    pub ratio_threshold: f64,
    /// band2 - band1 must be below this
    pub difference_threshold: f64,
}

impl Default for CloudMaskRule {
    fn default() -> Self {
        Self {
            sum_threshold: 2.7,
            ratio_threshold: 1.5,
            difference_threshold: 0.0,
        }
    }
}

impl CloudMaskRule {
    /// NaN inputs compare false and give a clear pixel
    pub fn classify(&self, sum: f64, ratio: f64, difference: f64) -> u8 {
        let cloudy = sum > self.sum_threshold
            && ratio > self.ratio_threshold
            && difference < self.difference_threshold;
        u8::from(cloudy)
    }
}

/// The seven converted reflectance bands, keyed by band number
#[derive(Debug, Clone)]
pub struct CloudMaskInputSet {
    bands: BTreeMap<BandIndex, RasterBand>,
}

impl CloudMaskInputSet {
    /// Requires bands 1..=7. Extra bands are ignored.
    pub fn new(bands: BTreeMap<BandIndex, RasterBand>) -> OcmResult<Self> {
        let missing = missing_bands(|index| bands.contains_key(&index))?;
        if !missing.is_empty() {
            return Err(OcmError::IncompleteBandSet { missing });
        }

        let bands: BTreeMap<BandIndex, RasterBand> = bands
            .into_iter()
            .filter(|(index, _)| index.is_radiometric())
            .collect();

        let mut profiles = bands.iter();
        if let Some((first_index, first)) = profiles.next() {
            for (index, band) in profiles {
                if !band.profile.is_aligned_with(&first.profile) {
                    return Err(OcmError::ProfileMismatch(format!(
                        "{} ({}x{}, {:?}) does not align with {} ({}x{}, {:?})",
                        index,
                        band.profile.width,
                        band.profile.height,
                        band.profile.transform,
                        first_index,
                        first.profile.width,
                        first.profile.height,
                        first.profile.transform
                    )));
                }
            }
        }

        Ok(Self { bands })
    }

    /// Load bands 1..=7 from the reflectance stage output
    pub fn from_reflectance(set: &ReflectanceSet) -> OcmResult<Self> {
        let missing = missing_bands(|index| set.band(index).is_some())?;
        if !missing.is_empty() {
            return Err(OcmError::IncompleteBandSet { missing });
        }

        let mut bands = BTreeMap::new();
        for number in 1..=RADIOMETRIC_BAND_COUNT {
            let index = BandIndex::new(number)?;
            if let Some(artifact) = set.band(index) {
                bands.insert(index, read_band(&artifact.path)?);
            }
        }
        Self::new(bands)
    }

    fn get(&self, number: u8) -> OcmResult<&RasterBand> {
        let index = BandIndex::new(number)?;
        self.bands
            .get(&index)
            .ok_or(OcmError::IncompleteBandSet { missing: vec![number] })
    }

    pub fn profile(&self) -> OcmResult<&RasterProfile> {
        Ok(&self.get(1)?.profile)
    }
}

fn missing_bands(present: impl Fn(BandIndex) -> bool) -> OcmResult<Vec<u8>> {
    let mut missing = Vec::new();
    for number in 1..=RADIOMETRIC_BAND_COUNT {
        if !present(BandIndex::new(number)?) {
            missing.push(number);
        }
    }
    Ok(missing)
}

/// Intermediate rasters and the final mask
#[derive(Debug, Clone)]
pub struct CloudMaskResult {
    pub sum: BandImage,
    pub difference: BandImage,
    pub ratio: BandImage,
    pub mask: MaskImage,
    pub cloud_pixels: usize,
}

/// Mask raster written by the engine
#[derive(Debug, Clone)]
pub struct CloudMaskArtifact {
    pub path: PathBuf,
    pub cloud_pixels: usize,
    pub total_pixels: usize,
}

/// Applies the fixed cloud decision rule
#[derive(Debug, Clone, Default)]
pub struct CloudMaskEngine {
    rule: CloudMaskRule,
}

impl CloudMaskEngine {
    pub fn new(rule: CloudMaskRule) -> Self {
        Self { rule }
    }

    /// Pure computation: same inputs always give the same mask
    pub fn compute(&self, inputs: &CloudMaskInputSet) -> OcmResult<CloudMaskResult> {
        let one = &inputs.get(1)?.data;
        let two = &inputs.get(2)?.data;
        let seven = &inputs.get(7)?.data;

        let mut sum = BandImage::zeros(one.dim());
        for number in 1..=RADIOMETRIC_BAND_COUNT {
            sum += &inputs.get(number)?.data;
        }

        let difference = two - one;

        // Zero reflectance carries no signal, keep it out of the ratio
        let ratio = Zip::from(two).and(seven).map_collect(|&b2, &b7| {
            let b2 = if b2 == 0.0 { f64::NAN } else { b2 };
            let b7 = if b7 == 0.0 { f64::NAN } else { b7 };
            b2 / b7
        });

        let mask = Zip::from(&sum)
            .and(&ratio)
            .and(&difference)
            .map_collect(|&s, &r, &d| self.rule.classify(s, r, d));

        let cloud_pixels = mask.iter().filter(|&&v| v == 1).count();

        Ok(CloudMaskResult {
            sum,
            difference,
            ratio,
            mask,
            cloud_pixels,
        })
    }

    /// Build the mask from the reflectance set and write `cloud_mask.TIF` into `output_dir`
    pub fn run(
        &self,
        reflectance: &ReflectanceSet,
        output_dir: &Path,
        compression: Option<&str>,
    ) -> OcmResult<CloudMaskArtifact> {
        log::info!("Deriving cloud mask from {}", reflectance.dir.display());

        let inputs = CloudMaskInputSet::from_reflectance(reflectance)?;
        let result = self.compute(&inputs)?;

        let mut profile = inputs.profile()?.clone();
        profile.nodata = None;

        let path = output_dir.join(format!("{}.TIF", CLOUD_MASK_NAME));
        write_raster(&path, &result.mask, &profile, compression)?;

        let total_pixels = result.mask.len();
        log::info!(
            "Cloud mask written to {}: {}/{} cloud pixels",
            path.display(),
            result.cloud_pixels,
            total_pixels
        );

        Ok(CloudMaskArtifact {
            path,
            cloud_pixels: result.cloud_pixels,
            total_pixels,
        })
    }
}
