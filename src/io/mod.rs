//! I/O boundary: scene containers, GeoTIFF read/write and stage folders

pub mod container;
pub mod raster;
pub mod workspace;

pub use container::{HdfContainer, SceneContainer, Subdataset};
pub use raster::{attach_gcps, read_band, read_gcps, read_profile, write_raster};
