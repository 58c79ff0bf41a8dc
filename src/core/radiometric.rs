use crate::core::extract::collect_band_artifacts;
use crate::core::extract::ExtractedScene;
use crate::io::raster::{read_band, write_raster};
use crate::io::workspace::reset_dir;
use crate::types::{
    BandArtifact, BandIndex, CancellationToken, OcmError, OcmResult, RasterBand,
};
use ndarray::Array2;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

/// OCM-2 mean solar exoatmospheric irradiance per band (bands 1..8)
pub const SOLAR_IRRADIANCE: [f64; 8] = [
    1.72815, 1.85211, 1.9721, 1.86697, 1.82781, 1.65765, 1.2897, 0.952073,
];

/// Fixed TOA reflectance model
#[derive(Debug, Clone, PartialEq)]
pub struct RadiometricModel {
    pub solar_irradiance: [f64; 8],
    /// Reflectances above this are invalid and set to 0
    pub max_reflectance: f64,
}

impl Default for RadiometricModel {
    fn default() -> Self {
        Self {
            solar_irradiance: SOLAR_IRRADIANCE,
            max_reflectance: 2.0,
        }
    }
}

impl RadiometricModel {
    /// Irradiance for a band that goes through conversion, `None` for pass-through bands
    pub fn irradiance(&self, band: BandIndex) -> Option<f64> {
        if band.is_radiometric() {
            self.solar_irradiance.get(band.number() as usize - 1).copied()
        } else {
            None
        }
    }

    /// Multiplier turning radiance into TOA reflectance for one band and sun angle
    pub fn toa_factor(&self, band: BandIndex, sun_elevation: f64) -> OcmResult<f64> {
        let esol = self.irradiance(band).ok_or_else(|| {
            OcmError::InvalidBand(format!("{} is outside the radiometric model", band))
        })?;
        let sin_elev = sun_elevation_sine(sun_elevation)?;
        Ok((PI * 10.0) / (esol * 1000.0 * sin_elev))
    }

    /// Negative values and values above `max_reflectance` both become 0
    pub fn clamp(&self, toa: f64) -> f64 {
        if toa < 0.0 || toa > self.max_reflectance {
            0.0
        } else {
            toa
        }
    }
}

/// Sine of the sun elevation, rejecting angles where the formula divides by zero
pub fn sun_elevation_sine(sun_elevation: f64) -> OcmResult<f64> {
    if !sun_elevation.is_finite() {
        return Err(OcmError::NumericDomain(format!(
            "sun elevation {} is not finite",
            sun_elevation
        )));
    }
    // sin(180°) evaluates to ~1e-16 in floating point, test the angle itself
    if sun_elevation.rem_euclid(180.0) == 0.0 {
        return Err(OcmError::NumericDomain(format!(
            "sun elevation {}° gives sin = 0",
            sun_elevation
        )));
    }
    Ok(sun_elevation.to_radians().sin())
}

/// Unclamped TOA reflectance for one radiance value
pub fn calc_toa(rad: f64, sun_elevation: f64, band: BandIndex) -> OcmResult<f64> {
    Ok(rad * RadiometricModel::default().toa_factor(band, sun_elevation)?)
}

/// Reflectance bands (and pass-through bands) written by the converter
#[derive(Debug, Clone)]
pub struct ReflectanceSet {
    pub dir: PathBuf,
    pub bands: Vec<BandArtifact>,
}

impl ReflectanceSet {
    /// Rebuild the artifact list from a folder written by an earlier conversion
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> OcmResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let bands = collect_band_artifacts(&dir)?;
        Ok(Self { dir, bands })
    }

    pub fn band(&self, index: BandIndex) -> Option<&BandArtifact> {
        self.bands.iter().find(|b| b.index == index)
    }
}

/// Converts extracted radiance bands to TOA reflectance
pub struct RadiometricConverter {
    model: RadiometricModel,
    compression: Option<String>,
    parallel: bool,
}

impl RadiometricConverter {
    pub fn new(model: RadiometricModel, compression: Option<String>, parallel: bool) -> Self {
        Self {
            model,
            compression,
            parallel,
        }
    }

    /// Reflectance grid for one band, profile untouched
    pub fn reflectance(
        &self,
        radiance: &RasterBand,
        band: BandIndex,
        sun_elevation: f64,
    ) -> OcmResult<Array2<f32>> {
        let factor = self.model.toa_factor(band, sun_elevation)?;
        Ok(radiance
            .data
            .mapv(|rad| self.model.clamp(rad * factor) as f32))
    }

    /// Convert bands 1-7 into `output_dir` and copy the rest through unchanged.
    /// The folder is cleared first.
    pub fn convert(
        &self,
        extracted: &ExtractedScene,
        sun_elevation: f64,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<ReflectanceSet> {
        // Fail before touching the folder
        sun_elevation_sine(sun_elevation)?;

        log::info!(
            "Converting {} bands to TOA reflectance (sun elevation {:.3}°)",
            extracted.bands.len(),
            sun_elevation
        );
        reset_dir(output_dir)?;

        let bands = self.convert_all(&extracted.bands, sun_elevation, output_dir, cancel)?;

        Ok(ReflectanceSet {
            dir: output_dir.to_path_buf(),
            bands,
        })
    }

    #[cfg(feature = "parallel")]
    fn convert_all(
        &self,
        bands: &[BandArtifact],
        sun_elevation: f64,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<BandArtifact>> {
        use rayon::prelude::*;

        if !self.parallel {
            return self.convert_sequential(bands, sun_elevation, output_dir, cancel);
        }

        bands
            .par_iter()
            .map(|artifact| {
                cancel.check()?;
                self.convert_one(artifact, sun_elevation, output_dir)
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn convert_all(
        &self,
        bands: &[BandArtifact],
        sun_elevation: f64,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<BandArtifact>> {
        self.convert_sequential(bands, sun_elevation, output_dir, cancel)
    }

    fn convert_sequential(
        &self,
        bands: &[BandArtifact],
        sun_elevation: f64,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<Vec<BandArtifact>> {
        let mut converted = Vec::with_capacity(bands.len());
        for artifact in bands {
            cancel.check()?;
            converted.push(self.convert_one(artifact, sun_elevation, output_dir)?);
        }
        Ok(converted)
    }

    fn convert_one(
        &self,
        artifact: &BandArtifact,
        sun_elevation: f64,
        output_dir: &Path,
    ) -> OcmResult<BandArtifact> {
        let file_name = artifact.path.file_name().ok_or_else(|| {
            OcmError::InvalidFormat(format!("{} has no file name", artifact.path.display()))
        })?;
        let out_path = output_dir.join(file_name);

        if artifact.index.is_radiometric() {
            let radiance = read_band(&artifact.path)?;
            let toa = self.reflectance(&radiance, artifact.index, sun_elevation)?;
            write_raster(&out_path, &toa, &radiance.profile, self.compression.as_deref())?;
            log::info!("{} -> TOA reflectance {}", artifact.index, out_path.display());
        } else {
            fs::copy(&artifact.path, &out_path)?;
            log::info!("{} outside radiometric model, copied to {}", artifact.index, out_path.display());
        }

        Ok(BandArtifact {
            index: artifact.index,
            path: out_path,
        })
    }
}

impl Default for RadiometricConverter {
    fn default() -> Self {
        Self::new(RadiometricModel::default(), Some("LZW".to_string()), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, RasterProfile};
    use approx::assert_relative_eq;

    fn band(n: u8) -> BandIndex {
        BandIndex::new(n).unwrap()
    }

    #[test]
    fn test_toa_reference_scenario() {
        // (pi * 50 * 10) / (1.72815 * 1000 * sin 45°)
        let toa = calc_toa(50.0, 45.0, band(1)).unwrap();
        assert_relative_eq!(toa, 1.285445, epsilon = 1e-5);
        assert!(toa < 2.0);
    }

    #[test]
    fn test_toa_finite_and_sign_preserving() {
        for elev in [0.5, 10.0, 45.0, 89.9, 90.0, 120.0, 179.5] {
            for rad in [-80.0, -0.1, 0.1, 25.0, 400.0] {
                for n in 1..=7 {
                    let toa = calc_toa(rad, elev, band(n)).unwrap();
                    assert!(toa.is_finite());
                    assert_eq!(toa.signum(), f64::signum(rad));
                }
            }
        }
    }

    #[test]
    fn test_zero_sine_is_a_domain_error() {
        for elev in [0.0, 180.0, -180.0, 360.0] {
            assert!(matches!(
                calc_toa(10.0, elev, band(1)),
                Err(OcmError::NumericDomain(_))
            ));
        }
        assert!(matches!(
            sun_elevation_sine(f64::NAN),
            Err(OcmError::NumericDomain(_))
        ));
    }

    #[test]
    fn test_clamp_is_asymmetric() {
        let model = RadiometricModel::default();
        assert_eq!(model.clamp(-0.3), 0.0);
        assert_eq!(model.clamp(2.0001), 0.0);
        assert_eq!(model.clamp(150.0), 0.0);
        assert_eq!(model.clamp(2.0), 2.0);
        assert_eq!(model.clamp(0.75), 0.75);
    }

    #[test]
    fn test_band_eight_is_outside_model() {
        let model = RadiometricModel::default();
        assert_eq!(model.irradiance(band(7)), Some(1.2897));
        assert_eq!(model.irradiance(band(8)), None);
        assert!(matches!(
            model.toa_factor(band(8), 45.0),
            Err(OcmError::InvalidBand(_))
        ));
    }

    #[test]
    fn test_reflectance_grid_keeps_shape() {
        let profile = RasterProfile {
            width: 3,
            height: 1,
            transform: GeoTransform::placeholder(),
            projection: String::new(),
            nodata: Some(-32768.0),
        };
        let radiance = RasterBand::new(
            Array2::from_shape_vec((1, 3), vec![50.0, -32768.0, 1000.0]).unwrap(),
            profile,
        )
        .unwrap();

        let converter = RadiometricConverter::default();
        let toa = converter.reflectance(&radiance, band(1), 45.0).unwrap();

        assert_eq!(toa.dim(), (1, 3));
        assert_relative_eq!(toa[[0, 0]], 1.285445, epsilon = 1e-5);
        assert_eq!(toa[[0, 1]], 0.0);
        assert_eq!(toa[[0, 2]], 0.0);
    }
}
