use crate::types::{OcmError, OcmResult};
use gdal::{Dataset, Metadata};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// One independently addressable raster inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subdataset {
    /// Name that `Dataset::open` accepts, e.g. `HDF4_SDS:UNKNOWN:"scene.hdf":0`
    pub name: String,
    pub description: String,
}

/// Read access to a multi-subdataset scene file
pub trait SceneContainer {
    /// Human readable identifier used in errors and logs
    fn name(&self) -> &str;

    /// Subdatasets in container order
    fn subdatasets(&self) -> OcmResult<Vec<Subdataset>>;

    /// Value of a key in the container's default metadata domain
    fn metadata_item(&self, key: &str) -> Option<String>;
}

/// OCM-2 L1B HDF file opened through GDAL
pub struct HdfContainer {
    name: String,
    dataset: Dataset,
}

impl HdfContainer {
    pub fn open<P: AsRef<Path>>(path: P) -> OcmResult<Self> {
        let path = path.as_ref();
        log::info!("Opening scene container: {}", path.display());

        let dataset = Dataset::open(path).map_err(|e| OcmError::ContainerOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: path.display().to_string(),
            dataset,
        })
    }
}

impl SceneContainer for HdfContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn subdatasets(&self) -> OcmResult<Vec<Subdataset>> {
        let entries = self.dataset.metadata_domain("SUBDATASETS").unwrap_or_default();
        log::debug!("{} SUBDATASETS metadata entries", entries.len());
        Ok(parse_subdatasets(&entries))
    }

    fn metadata_item(&self, key: &str) -> Option<String> {
        self.dataset.metadata_item(key, "")
    }
}

/// Turn `SUBDATASET_<n>_NAME=...` / `SUBDATASET_<n>_DESC=...` pairs into an ordered list
pub fn parse_subdatasets(entries: &[String]) -> Vec<Subdataset> {
    let re = Regex::new(r"^SUBDATASET_(\d+)_(NAME|DESC)=(.*)$").expect("static regex");
    let mut by_number: BTreeMap<u32, (Option<String>, String)> = BTreeMap::new();

    for entry in entries {
        let Some(caps) = re.captures(entry) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        let slot = by_number.entry(number).or_insert((None, String::new()));
        match &caps[2] {
            "NAME" => slot.0 = Some(caps[3].to_string()),
            _ => slot.1 = caps[3].to_string(),
        }
    }

    by_number
        .into_values()
        .filter_map(|(name, description)| name.map(|name| Subdataset { name, description }))
        .collect()
}
