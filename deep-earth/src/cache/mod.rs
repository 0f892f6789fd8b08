//! Persistent cache for fetched source artifacts.
//!
//! Blobs live at `<root>/<category>/<key>.<ext>` next to a versioned
//! `cache_metadata.json` that records when each entry was written and how
//! long it lives.

mod clock;
mod metadata;
mod path;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metadata::{CacheEntry, METADATA_VERSION};
pub use path::{category_directory, entry_path, metadata_path, METADATA_FILE};
pub use store::CacheStore;
pub use types::{CacheCategory, CacheError, CategoryTtl};
