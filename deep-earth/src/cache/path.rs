//! Cache path construction.

use super::types::CacheCategory;
use std::path::{Path, PathBuf};

/// Name of the metadata document at the cache root.
pub const METADATA_FILE: &str = "cache_metadata.json";

/// Directory holding every entry of a category.
pub fn category_directory(root: &Path, category: CacheCategory) -> PathBuf {
    root.join(category.as_str())
}

/// Path of a cached blob: `<root>/<category>/<key>.<ext>`.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use deep_earth::cache::{entry_path, CacheCategory};
///
/// let path = entry_path(Path::new("/cache"), CacheCategory::Elevation, "srtm_ab12", "tif");
/// assert_eq!(path, PathBuf::from("/cache/elevation/srtm_ab12.tif"));
/// ```
pub fn entry_path(root: &Path, category: CacheCategory, key: &str, extension: &str) -> PathBuf {
    category_directory(root, category).join(format!("{}.{}", key, extension))
}

/// Path of the metadata document.
pub fn metadata_path(root: &Path) -> PathBuf {
    root.join(METADATA_FILE)
}

/// Keys become file names, so they must not contain separators or `..`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\'])
        && !key.contains('\0')
}
