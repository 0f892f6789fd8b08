//! Georeferenced rasters: in-memory model, GeoTIFF I/O and reprojection.

mod geotiff;
mod resample;
mod types;

pub use geotiff::{decode_geotiff, encode_geotiff, looks_like_tiff, read_geotiff, write_geotiff};
pub use resample::{reproject, ResampleMethod, Resampled, TargetGrid};
pub use types::{
    BandSelection, Crs, GeoTransform, GridArray, Raster, RasterDataType, RasterError, EPSG_WGS84,
};
