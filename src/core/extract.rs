use crate::io::container::SceneContainer;
use crate::io::raster::{read_subdataset_band, write_raster};
use crate::io::workspace::{file_stem, list_rasters, reset_dir};
use crate::types::{BandArtifact, BandIndex, CancellationToken, OcmError, OcmResult};
use gdal::Dataset;
use std::path::{Path, PathBuf};

/// Bands written by the extractor, ordered by band number
#[derive(Debug, Clone)]
pub struct ExtractedScene {
    pub dir: PathBuf,
    pub bands: Vec<BandArtifact>,
}

impl ExtractedScene {
    /// Rebuild the artifact list from a folder written by an earlier extraction
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> OcmResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let bands = collect_band_artifacts(&dir)?;
        if bands.is_empty() {
            return Err(OcmError::InvalidFormat(format!(
                "{} contains no band<n> rasters",
                dir.display()
            )));
        }
        Ok(Self { dir, bands })
    }

    pub fn band(&self, index: BandIndex) -> Option<&BandArtifact> {
        self.bands.iter().find(|b| b.index == index)
    }
}

/// Find every `band<n>.*` raster in a folder; other rasters are ignored
pub(crate) fn collect_band_artifacts(dir: &Path) -> OcmResult<Vec<BandArtifact>> {
    let mut bands: Vec<BandArtifact> = list_rasters(dir)?
        .into_iter()
        .filter_map(|path| {
            BandIndex::from_file_stem(&file_stem(&path)).map(|index| BandArtifact { index, path })
        })
        .collect();
    bands.sort_by_key(|b| b.index);
    Ok(bands)
}

/// Pulls every subdataset out of a container as its own single-band GeoTIFF
pub struct SubdatasetExtractor {
    nodata: f64,
    compression: Option<String>,
}

impl SubdatasetExtractor {
    pub fn new(nodata: f64, compression: Option<String>) -> Self {
        Self {
            nodata,
            compression,
        }
    }

    /// Extract all subdatasets into `output_dir`, which is cleared first.
    ///
    /// Subdataset `i` (0-based, container order) becomes `band{i+1}.TIF`.
    /// Pixels are stored as Float64 with the configured nodata value.
    pub fn extract<C: SceneContainer + ?Sized>(
        &self,
        container: &C,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> OcmResult<ExtractedScene> {
        let subdatasets = container.subdatasets()?;
        if subdatasets.is_empty() {
            return Err(OcmError::NoSubdatasets(container.name().to_string()));
        }

        log::info!(
            "Extracting {} subdatasets from {} into {}",
            subdatasets.len(),
            container.name(),
            output_dir.display()
        );
        reset_dir(output_dir)?;

        let mut bands = Vec::with_capacity(subdatasets.len());
        for (position, subdataset) in subdatasets.iter().enumerate() {
            cancel.check()?;

            let index = BandIndex::from_subdataset_position(position)?;
            log::debug!("{} <- {} {}", index, subdataset.name, subdataset.description);

            let dataset = Dataset::open(Path::new(&subdataset.name))?;
            if dataset.raster_count() > 1 {
                log::warn!(
                    "Subdataset {} has {} rasters, keeping the first",
                    subdataset.name,
                    dataset.raster_count()
                );
            }

            let mut band = read_subdataset_band(&dataset, Path::new(&subdataset.name))?;
            band.profile.nodata = Some(self.nodata);

            let path = output_dir.join(format!("{}.TIF", index.file_stem()));
            write_raster(&path, &band.data, &band.profile, self.compression.as_deref())?;
            log::info!("Extracted {} ({}x{})", path.display(), band.profile.width, band.profile.height);

            bands.push(BandArtifact { index, path });
        }

        Ok(ExtractedScene {
            dir: output_dir.to_path_buf(),
            bands,
        })
    }
}

impl Default for SubdatasetExtractor {
    fn default() -> Self {
        Self::new(crate::types::DEFAULT_NODATA, Some("LZW".to_string()))
    }
}
