#![allow(dead_code)]

use gdal::raster::Buffer;
use gdal::DriverManager;
use ndarray::Array2;
use ocm2::core::metadata::*;
use ocm2::core::SOLAR_IRRADIANCE;
use ocm2::{OcmResult, SceneContainer, Subdataset};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;

pub const WIDTH: usize = 6;
pub const HEIGHT: usize = 4;
pub const SUN_ELEVATION: f64 = 45.0;

/// Columns `0..CLOUD_COLUMNS` of the synthetic scene are cloudy
pub const CLOUD_COLUMNS: usize = 3;

/// Reflectance per band for cloudy and clear pixels (bands 1..=7)
const CLOUDY: [f64; 7] = [0.6, 0.5, 0.6, 0.6, 0.6, 0.5, 0.2];
const CLEAR: [f64; 7] = [0.1, 0.08, 0.07, 0.06, 0.05, 0.04, 0.03];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-test scene container backed by plain GeoTIFF subdatasets
pub struct FakeContainer {
    pub name: String,
    pub subdatasets: Vec<Subdataset>,
    pub metadata: HashMap<String, String>,
}

impl SceneContainer for FakeContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn subdatasets(&self) -> OcmResult<Vec<Subdataset>> {
        Ok(self.subdatasets.clone())
    }

    fn metadata_item(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned()
    }
}

pub fn scene_metadata() -> HashMap<String, String> {
    [
        (UPPER_LEFT_LONGITUDE, "78.5"),
        (UPPER_LEFT_LATITUDE, "22.1"),
        (UPPER_RIGHT_LONGITUDE, "93.2"),
        (UPPER_RIGHT_LATITUDE, "20.4"),
        (LOWER_RIGHT_LONGITUDE, "90.8"),
        (LOWER_RIGHT_LATITUDE, "7.9"),
        (LOWER_LEFT_LONGITUDE, "76.3"),
        (LOWER_LEFT_LATITUDE, "9.6"),
        (SUN_ELEVATION_ANGLE, "45.0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// GeoTIFF with pixels only: no geotransform, projection or nodata, like an HDF4 SDS
pub fn write_bare_raster(path: &Path, data: &Array2<f32>) {
    let (height, width) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)
        .unwrap();
    let mut band = dataset.rasterband(1).unwrap();
    let buffer = Buffer::new((width, height), data.iter().copied().collect());
    band.write((0, 0), (width, height), &buffer).unwrap();
}

/// Radiance that converts to `reflectance` for `band` (1-based) at 45° sun elevation
pub fn radiance_for(reflectance: f64, band: usize) -> f64 {
    reflectance * SOLAR_IRRADIANCE[band - 1] * 1000.0 * SUN_ELEVATION.to_radians().sin() / (PI * 10.0)
}

/// Radiance grid for one band of the synthetic scene
pub fn band_radiance(band: usize) -> Array2<f32> {
    Array2::from_shape_fn((HEIGHT, WIDTH), |(_, col)| {
        if band > 7 {
            // outside the radiometric model, arbitrary counts
            (100 + col) as f32
        } else if col < CLOUD_COLUMNS {
            radiance_for(CLOUDY[band - 1], band) as f32
        } else {
            radiance_for(CLEAR[band - 1], band) as f32
        }
    })
}

/// Write `band_count` untransformed single-band subdatasets into `dir` and wrap them in a container
pub fn build_scene(dir: &Path, band_count: usize) -> FakeContainer {
    std::fs::create_dir_all(dir).unwrap();
    let subdatasets = (1..=band_count)
        .map(|band| {
            let path = dir.join(format!("sds_{:02}.tif", band));
            write_bare_raster(&path, &band_radiance(band));
            Subdataset {
                name: path.to_string_lossy().into_owned(),
                description: format!("[{}x{}] B{} (32-bit floating-point)", HEIGHT, WIDTH, band),
            }
        })
        .collect();

    FakeContainer {
        name: dir.join("O2_TEST_L1B.hdf").to_string_lossy().into_owned(),
        subdatasets,
        metadata: scene_metadata(),
    }
}
