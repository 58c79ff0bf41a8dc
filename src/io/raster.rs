use crate::types::{
    BandImage, GeoTransform, GroundControlPoint, OcmError, OcmResult, RasterBand, RasterProfile,
};
use gdal::raster::{Buffer, GdalType, RasterCreationOption};
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use ndarray::Array2;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::Path;

/// Read the spatial profile of the first band without loading pixels.
/// A raster without a geotransform is `DegenerateTransform`.
pub fn read_profile<P: AsRef<Path>>(path: P) -> OcmResult<RasterProfile> {
    let path = path.as_ref();
    let dataset = Dataset::open(path)?;
    let transform = required_transform(&dataset, path)?;
    profile_of(&dataset, transform)
}

fn required_transform(dataset: &Dataset, path: &Path) -> OcmResult<GeoTransform> {
    dataset
        .geo_transform()
        .map(GeoTransform::from_gdal)
        .map_err(|_| OcmError::DegenerateTransform(format!("{} has no geotransform", path.display())))
}

fn profile_of(dataset: &Dataset, transform: GeoTransform) -> OcmResult<RasterProfile> {
    let (width, height) = dataset.raster_size();
    let nodata = dataset.rasterband(1)?.no_data_value();

    Ok(RasterProfile {
        width,
        height,
        transform,
        projection: dataset.projection(),
        nodata,
    })
}

/// Read band 1 of a georeferenced raster as f64 together with its profile
pub fn read_band<P: AsRef<Path>>(path: P) -> OcmResult<RasterBand> {
    let path = path.as_ref();
    let dataset = Dataset::open(path)?;
    let transform = required_transform(&dataset, path)?;
    load_first_band(&dataset, path, transform)
}

/// Read band 1 of an opened container subdataset.
/// Subdatasets of an L1B container carry no geotransform and get the placeholder grid.
pub fn read_subdataset_band(dataset: &Dataset, path: &Path) -> OcmResult<RasterBand> {
    let transform = match dataset.geo_transform() {
        Ok(gt) => GeoTransform::from_gdal(gt),
        Err(_) => {
            log::debug!("{} has no geotransform, using placeholder", path.display());
            GeoTransform::placeholder()
        }
    };
    load_first_band(dataset, path, transform)
}

fn load_first_band(dataset: &Dataset, path: &Path, transform: GeoTransform) -> OcmResult<RasterBand> {
    let profile = profile_of(dataset, transform)?;
    let (width, height) = (profile.width, profile.height);
    log::debug!("Reading {}x{} grid from {}", width, height, path.display());

    let rasterband = dataset.rasterband(1)?;
    let band_data = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    let data: BandImage = Array2::from_shape_vec((height, width), band_data.data)
        .map_err(|e| OcmError::Processing(format!("Failed to reshape band data: {}", e)))?;

    RasterBand::new(data, profile)
}

/// Write a single-band GeoTIFF carrying the given profile
pub fn write_raster<T, P>(
    path: P,
    data: &Array2<T>,
    profile: &RasterProfile,
    compression: Option<&str>,
) -> OcmResult<()>
where
    T: GdalType + Copy,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let (height, width) = data.dim();
    if height != profile.height || width != profile.width {
        return Err(OcmError::ProfileMismatch(format!(
            "{}: grid is {}x{} but profile declares {}x{}",
            path.display(),
            width,
            height,
            profile.width,
            profile.height
        )));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let mut options = vec![RasterCreationOption {
        key: "TILED",
        value: "YES",
    }];
    if let Some(compression_type) = compression {
        options.push(RasterCreationOption {
            key: "COMPRESS",
            value: compression_type,
        });
    }

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path,
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    dataset.set_geo_transform(&profile.transform.to_gdal())?;
    if !profile.projection.is_empty() {
        dataset.set_projection(&profile.projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<T> = data.iter().copied().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    if let Some(nodata) = profile.nodata {
        rasterband.set_no_data_value(Some(nodata))?;
    }

    log::debug!("Wrote {}x{} raster to {}", width, height, path.display());
    Ok(())
}

/// Attach ground control points and their coordinate reference to an existing raster
pub fn attach_gcps<P: AsRef<Path>>(
    path: P,
    gcps: &[GroundControlPoint],
    projection_wkt: &str,
) -> OcmResult<()> {
    let path = path.as_ref();
    let dataset = Dataset::open_ex(
        path,
        DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE,
            ..DatasetOptions::default()
        },
    )?;

    let ids = (1..=gcps.len())
        .map(|i| CString::new(i.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| OcmError::InvalidFormat(format!("GCP id: {}", e)))?;
    let info = CString::new("").map_err(|e| OcmError::InvalidFormat(e.to_string()))?;
    let wkt = CString::new(projection_wkt)
        .map_err(|e| OcmError::InvalidFormat(format!("GCP projection: {}", e)))?;

    // GDALSetGCPs copies the array, the CStrings only need to outlive the call
    let raw: Vec<gdal_sys::GDAL_GCP> = gcps
        .iter()
        .zip(&ids)
        .map(|(gcp, id)| gdal_sys::GDAL_GCP {
            pszId: id.as_ptr() as *mut c_char,
            pszInfo: info.as_ptr() as *mut c_char,
            dfGCPPixel: gcp.pixel,
            dfGCPLine: gcp.line,
            dfGCPX: gcp.geo_x,
            dfGCPY: gcp.geo_y,
            dfGCPZ: gcp.elevation,
        })
        .collect();

    let rv = unsafe {
        gdal_sys::GDALSetGCPs(
            dataset.c_dataset(),
            raw.len() as c_int,
            raw.as_ptr(),
            wkt.as_ptr(),
        )
    };
    if rv != gdal_sys::CPLErr::CE_None {
        return Err(OcmError::Processing(format!(
            "GDALSetGCPs failed for {}",
            path.display()
        )));
    }

    log::debug!("Attached {} GCPs to {}", gcps.len(), path.display());
    Ok(())
}

/// Read back the GCPs and GCP projection WKT stored in a raster
pub fn read_gcps<P: AsRef<Path>>(path: P) -> OcmResult<(Vec<GroundControlPoint>, String)> {
    let dataset = Dataset::open(path.as_ref())?;

    unsafe {
        let handle = dataset.c_dataset();
        let count = gdal_sys::GDALGetGCPCount(handle);
        let raw = gdal_sys::GDALGetGCPs(handle);

        let gcps = if raw.is_null() || count <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(raw, count as usize)
                .iter()
                .map(|g| GroundControlPoint {
                    geo_x: g.dfGCPX,
                    geo_y: g.dfGCPY,
                    elevation: g.dfGCPZ,
                    pixel: g.dfGCPPixel,
                    line: g.dfGCPLine,
                })
                .collect()
        };

        let proj = gdal_sys::GDALGetGCPProjection(handle);
        let projection = if proj.is_null() {
            String::new()
        } else {
            CStr::from_ptr(proj).to_string_lossy().into_owned()
        };

        Ok((gcps, projection))
    }
}
