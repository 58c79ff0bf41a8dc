use crate::types::OcmResult;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions recognised as raster files inside a stage folder
pub const RASTER_EXTENSIONS: [&str; 3] = ["TIF", "tif", "img"];

/// Remove a folder and everything in it, then create it empty
pub fn reset_dir<P: AsRef<Path>>(dir: P) -> OcmResult<PathBuf> {
    let dir = dir.as_ref();
    if dir.exists() {
        log::debug!("Clearing {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

/// Remove a folder if it exists
pub fn remove_dir<P: AsRef<Path>>(dir: P) -> OcmResult<()> {
    let dir = dir.as_ref();
    if dir.exists() {
        log::debug!("Removing {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

pub fn is_raster_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| RASTER_EXTENSIONS.contains(&ext))
}

/// Raster files directly inside `dir`, sorted by file name
pub fn list_rasters<P: AsRef<Path>>(dir: P) -> OcmResult<Vec<PathBuf>> {
    let mut rasters = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if is_raster_file(&path) {
            rasters.push(path);
        } else {
            log::debug!("Skipping non-raster entry {}", path.display());
        }
    }
    rasters.sort();
    Ok(rasters)
}

/// File stem as an owned string, empty if the path has none
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
