//! Local raster provider.
//!
//! Discovers GeoTIFFs under a file or directory, resamples each onto the
//! master grid and composites them: a later file overwrites an earlier one
//! wherever it has valid samples. Files are visited in path order. The
//! composite is cached as a GeoTIFF already aligned with the grid.

use super::types::{cache_key, FetchRequest, FetchResult, ProviderError, SourceAdapter};
use crate::cache::{CacheCategory, CacheStore};
use crate::harmonize::MasterGrid;
use crate::raster::{
    encode_geotiff, read_geotiff, reproject, BandSelection, GridArray, Raster, RasterDataType,
};
use ndarray::{Array3, Axis, Zip};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CACHE_EXTENSION: &str = "tif";

/// Extensions picked up during discovery.
const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Recognised but not decodable.
const UNSUPPORTED_EXTENSIONS: [&str; 1] = ["jp2"];

/// Local GeoTIFF adapter.
pub struct LocalRasterAdapter {
    cache: Arc<CacheStore>,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Raster files under `root`, sorted by path. A file root is returned as is.
pub fn discover_rasters(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            let ext = extension_of(&path)?;
            if RASTER_EXTENSIONS.contains(&ext.as_str()) {
                Some(path)
            } else {
                if UNSUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                    warn!(path = %path.display(), "Unsupported raster format, skipping");
                }
                None
            }
        })
        .collect();
    files.sort();
    files
}

/// Resamples `files` onto `grid` and merges them, last write wins.
///
/// The band count and data type come from the first readable file; files
/// with a different band count are skipped. Returns `None` when no file
/// covers any cell.
pub fn composite(files: &[PathBuf], grid: &MasterGrid) -> Option<Raster> {
    let target = grid.target();
    let mut merged: Option<(Array3<f32>, RasterDataType)> = None;
    let mut covered_any = false;

    for path in files {
        let source = match read_geotiff(path) {
            Ok(raster) => raster,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable raster");
                continue;
            }
        };

        let (data, data_type) = merged.get_or_insert_with(|| {
            (
                Array3::zeros((source.band_count(), grid.height(), grid.width())),
                source.data_type,
            )
        });
        if source.band_count() != data.dim().0 {
            warn!(
                path = %path.display(),
                bands = source.band_count(),
                expected = data.dim().0,
                "Band count differs from first raster, skipping"
            );
            continue;
        }
        if source.data_type != *data_type {
            *data_type = RasterDataType::F32;
        }

        let bands: Vec<usize> = (0..source.band_count()).collect();
        let resampled = reproject(&source, &bands, &target);
        let cells = resampled.coverage.iter().filter(|&&c| c).count();
        debug!(path = %path.display(), covered_cells = cells, "Local raster resampled");
        if cells == 0 {
            continue;
        }
        covered_any = true;

        for (mut out, band) in data.axis_iter_mut(Axis(0)).zip(resampled.data.axis_iter(Axis(0))) {
            Zip::from(&mut out)
                .and(&band)
                .and(&resampled.coverage)
                .for_each(|o, &v, &covered| {
                    if covered {
                        *o = v;
                    }
                });
        }
    }

    let (data, data_type) = merged.filter(|_| covered_any)?;
    Some(Raster {
        data,
        transform: *grid.transform(),
        crs: grid.crs(),
        data_type,
        nodata: None,
    })
}

impl LocalRasterAdapter {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    fn build(&self, request: &FetchRequest, root: &Path, key: &str) -> FetchResult<PathBuf> {
        let files = discover_rasters(root);
        if files.is_empty() {
            warn!(path = %root.display(), "No raster files found");
            return FetchResult::Empty(format!("no raster files in {}", root.display()));
        }
        info!(path = %root.display(), files = files.len(), "Compositing local rasters");

        let grid = match MasterGrid::new(&request.region, request.resolution) {
            Ok(grid) => grid,
            Err(e) => return FetchResult::Err(e.to_string()),
        };
        let Some(raster) = composite(&files, &grid) else {
            return FetchResult::Empty(format!(
                "no raster in {} overlaps the region",
                root.display()
            ));
        };

        let saved = encode_geotiff(&raster)
            .map_err(ProviderError::from)
            .and_then(|bytes| {
                Ok(self
                    .cache
                    .save(key, &bytes, CacheCategory::Local, CACHE_EXTENSION)?)
            });
        saved.into()
    }
}

impl SourceAdapter for LocalRasterAdapter {
    type Artifact = PathBuf;
    type GridOutput = GridArray;

    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchResult<PathBuf> {
        let Some(root) = request.local_path.as_deref() else {
            return FetchResult::Empty("no local path given".to_string());
        };
        if !root.exists() {
            warn!(path = %root.display(), "Local path does not exist");
            return FetchResult::Empty(format!("{} does not exist", root.display()));
        }

        let key = self.cache_key(request);
        if let Some(path) = self.cache.get_path(&key, CacheCategory::Local, CACHE_EXTENSION) {
            debug!(key = %key, "Local composite cache hit");
            return FetchResult::Ok(path);
        }
        self.build(request, root, &key)
    }

    fn cache_key(&self, request: &FetchRequest) -> String {
        let root = request
            .local_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        cache_key("local", &[&root, &request.fingerprint()])
    }

    fn validate_credentials(&self) -> bool {
        true
    }

    fn transform_to_grid(
        &self,
        artifact: &PathBuf,
        grid: &MasterGrid,
    ) -> Result<GridArray, ProviderError> {
        let raster = read_geotiff(artifact)?;
        Ok(grid.resample(&raster, &BandSelection::All)?)
    }
}
