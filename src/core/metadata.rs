use crate::io::container::SceneContainer;
use crate::types::{GeoCorner, OcmError, OcmResult, SceneMetadata};

pub const UPPER_LEFT_LONGITUDE: &str = "Upper Left Longitude";
pub const UPPER_LEFT_LATITUDE: &str = "Upper Left Latitude";
pub const UPPER_RIGHT_LONGITUDE: &str = "Upper Right Longitude";
pub const UPPER_RIGHT_LATITUDE: &str = "Upper Right Latitude";
pub const LOWER_RIGHT_LONGITUDE: &str = "Lower Right Longitude";
pub const LOWER_RIGHT_LATITUDE: &str = "Lower Right Latitude";
pub const LOWER_LEFT_LONGITUDE: &str = "Lower Left Longitude";
pub const LOWER_LEFT_LATITUDE: &str = "Lower Left Latitude";
pub const SUN_ELEVATION_ANGLE: &str = "Sun Elevation Angle";

/// Reads scene corners and sun elevation from the container metadata
pub struct MetadataResolver;

impl MetadataResolver {
    pub fn resolve<C: SceneContainer + ?Sized>(container: &C) -> OcmResult<SceneMetadata> {
        let corner = |lon_key: &str, lat_key: &str| -> OcmResult<GeoCorner> {
            Ok(GeoCorner {
                longitude: Self::numeric_field(container, lon_key)?,
                latitude: Self::numeric_field(container, lat_key)?,
            })
        };

        let metadata = SceneMetadata {
            upper_left: corner(UPPER_LEFT_LONGITUDE, UPPER_LEFT_LATITUDE)?,
            upper_right: corner(UPPER_RIGHT_LONGITUDE, UPPER_RIGHT_LATITUDE)?,
            lower_right: corner(LOWER_RIGHT_LONGITUDE, LOWER_RIGHT_LATITUDE)?,
            lower_left: corner(LOWER_LEFT_LONGITUDE, LOWER_LEFT_LATITUDE)?,
            sun_elevation: Self::numeric_field(container, SUN_ELEVATION_ANGLE)?,
        };

        log::info!("Scene metadata for {}: sun elevation {:.3}°", container.name(), metadata.sun_elevation);
        log::debug!("Scene corners (UL, UR, LR, LL): {:?}", metadata.corners());
        Ok(metadata)
    }

    fn numeric_field<C: SceneContainer + ?Sized>(container: &C, key: &str) -> OcmResult<f64> {
        let raw = container
            .metadata_item(key)
            .ok_or_else(|| OcmError::MissingMetadataField {
                field: key.to_string(),
                reason: "not present".to_string(),
            })?;

        let value: f64 = raw.trim().parse().map_err(|_| OcmError::MissingMetadataField {
            field: key.to_string(),
            reason: format!("'{}' is not numeric", raw),
        })?;

        if !value.is_finite() {
            return Err(OcmError::MissingMetadataField {
                field: key.to_string(),
                reason: format!("'{}' is not finite", raw),
            });
        }

        Ok(value)
    }
}
