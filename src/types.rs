use ndarray::Array2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Real-valued band data (rows x cols)
pub type BandImage = Array2<f64>;

/// Binary cloud mask (0 = clear, 1 = cloud)
pub type MaskImage = Array2<u8>;

/// Nodata sentinel written into every extracted band
pub const DEFAULT_NODATA: f64 = -32768.0;

/// Highest band number covered by the radiometric model
pub const RADIOMETRIC_BAND_COUNT: u8 = 7;

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up unit pixel grid stamped on subdatasets without georeferencing.
    /// Corner magnitudes equal pixel/line positions.
    /// GTiff does not store `[0, 1, 0, 0, 0, 1]`, hence the negative line step.
    pub fn placeholder() -> Self {
        Self {
            top_left_x: 0.0,
            pixel_width: 1.0,
            rotation_x: 0.0,
            top_left_y: 0.0,
            rotation_y: 0.0,
            pixel_height: -1.0,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// True when the transform cannot span a non-empty area
    pub fn is_degenerate(&self) -> bool {
        self.to_gdal().iter().any(|v| !v.is_finite())
            || self.pixel_width == 0.0
            || self.pixel_height == 0.0
    }
}

/// Raster bookkeeping carried from an input band to every band derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Projection WKT, empty when the raster has no coordinate reference
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Same grid, same transform, same coordinate reference. Nodata is not compared.
    pub fn is_aligned_with(&self, other: &RasterProfile) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform == other.transform
            && self.projection == other.projection
    }
}

/// One 2-D grid with its spatial profile
#[derive(Debug, Clone)]
pub struct RasterBand {
    pub data: BandImage,
    pub profile: RasterProfile,
}

impl RasterBand {
    pub fn new(data: BandImage, profile: RasterProfile) -> OcmResult<Self> {
        let (rows, cols) = data.dim();
        if rows != profile.height || cols != profile.width {
            return Err(OcmError::InvalidFormat(format!(
                "grid is {}x{} but profile declares {}x{}",
                cols, rows, profile.width, profile.height
            )));
        }
        Ok(Self { data, profile })
    }
}

/// Position of a band in the 8-channel OCM-2 radiometric model (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BandIndex(u8);

impl BandIndex {
    pub fn new(number: u8) -> OcmResult<Self> {
        if number == 0 {
            return Err(OcmError::InvalidBand("band numbers start at 1".to_string()));
        }
        Ok(Self(number))
    }

    /// Band for the subdataset at `position` (0-based) in the container
    pub fn from_subdataset_position(position: usize) -> OcmResult<Self> {
        u8::try_from(position + 1)
            .map_err(|_| OcmError::InvalidBand(format!("subdataset position {} out of range", position)))
            .and_then(Self::new)
    }

    /// Parse a `band<n>` file stem written by the extractor
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        static STEM_RE: OnceLock<Regex> = OnceLock::new();
        let re = STEM_RE.get_or_init(|| Regex::new(r"^band(\d+)$").expect("static regex"));
        let caps = re.captures(stem)?;
        let number: u8 = caps[1].parse().ok()?;
        Self::new(number).ok()
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Whether the band goes through TOA reflectance conversion
    pub fn is_radiometric(&self) -> bool {
        self.0 <= RADIOMETRIC_BAND_COUNT
    }

    pub fn file_stem(&self) -> String {
        format!("band{}", self.0)
    }
}

impl fmt::Display for BandIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "band{}", self.0)
    }
}

/// Geographic corner as (longitude, latitude) in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCorner {
    pub longitude: f64,
    pub latitude: f64,
}

/// Scene-level metadata read from the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub upper_left: GeoCorner,
    pub upper_right: GeoCorner,
    pub lower_right: GeoCorner,
    pub lower_left: GeoCorner,
    /// Sun elevation angle in degrees
    pub sun_elevation: f64,
}

impl SceneMetadata {
    /// Corners in {UL, UR, LR, LL} order
    pub fn corners(&self) -> [GeoCorner; 4] {
        [self.upper_left, self.upper_right, self.lower_right, self.lower_left]
    }
}

/// Pixel/line to longitude/latitude correspondence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundControlPoint {
    pub geo_x: f64,
    pub geo_y: f64,
    pub elevation: f64,
    pub pixel: f64,
    pub line: f64,
}

/// A band file on disk tagged with its band number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandArtifact {
    pub index: BandIndex,
    pub path: PathBuf,
}

/// Cooperative cancellation flag shared between a caller and a running pipeline
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once `cancel` has been called
    pub fn check(&self) -> OcmResult<()> {
        if self.is_cancelled() {
            Err(OcmError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Error types for OCM-2 scene processing
#[derive(Debug, thiserror::Error)]
pub enum OcmError {
    #[error("Cannot open container {path}: {reason}")]
    ContainerOpen { path: String, reason: String },

    #[error("Container {0} has no subdatasets")]
    NoSubdatasets(String),

    #[error("Missing metadata field '{field}': {reason}")]
    MissingMetadataField { field: String, reason: String },

    #[error("Profile mismatch: {0}")]
    ProfileMismatch(String),

    #[error("Incomplete band set for cloud mask, missing bands {missing:?}")]
    IncompleteBandSet { missing: Vec<u8> },

    #[error("Degenerate geotransform: {0}")]
    DegenerateTransform(String),

    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    #[error("Invalid band: {0}")]
    InvalidBand(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for OCM-2 operations
pub type OcmResult<T> = Result<T, OcmError>;
