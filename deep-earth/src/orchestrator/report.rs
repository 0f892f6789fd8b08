//! Per-source outcome of one fetch round.

use crate::provider::vector::VectorPayload;
use crate::provider::FetchResult;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SOURCE_ELEVATION: &str = "elevation";
pub const SOURCE_EMBEDDING: &str = "embedding";
pub const SOURCE_VECTOR: &str = "vector";
pub const SOURCE_LOCAL: &str = "local";

/// `{results, errors}` for every requested source.
///
/// Every requested source has a `results` entry. A source listed in
/// `errors` always has a `None` result; `Empty` outcomes are `None` without
/// an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub results: BTreeMap<String, Option<PathBuf>>,
    pub errors: BTreeMap<String, String>,
    /// Parsed vector payload when the vector source succeeded
    pub vector: Option<VectorPayload>,
}

impl FetchReport {
    /// Records one source's outcome.
    pub fn record(&mut self, name: &str, outcome: FetchResult<PathBuf>) {
        match outcome {
            FetchResult::Ok(path) => {
                self.results.insert(name.to_string(), Some(path));
            }
            FetchResult::Empty(_) => {
                self.results.insert(name.to_string(), None);
            }
            FetchResult::Err(message) => {
                self.results.insert(name.to_string(), None);
                self.errors.insert(name.to_string(), message);
            }
        }
    }

    /// Whether the source took part in this round.
    pub fn requested(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    /// The source's outcome as `Err(message)`, `Ok(None)` or `Ok(Some(path))`.
    pub fn raw(&self, name: &str) -> Result<Option<PathBuf>, String> {
        if let Some(message) = self.errors.get(name) {
            return Err(message.clone());
        }
        Ok(self.results.get(name).cloned().flatten())
    }

    pub fn path(&self, name: &str) -> Option<&PathBuf> {
        self.results.get(name).and_then(Option::as_ref)
    }

    pub fn is_success(&self, name: &str) -> bool {
        self.path(name).is_some() && !self.errors.contains_key(name)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shapes() {
        let mut report = FetchReport::default();
        report.record(SOURCE_ELEVATION, FetchResult::Ok(PathBuf::from("/c/dem.tif")));
        report.record(SOURCE_EMBEDDING, FetchResult::Empty("no token".into()));
        report.record(SOURCE_LOCAL, FetchResult::Err("disk on fire".into()));

        assert!(report.is_success(SOURCE_ELEVATION));
        assert_eq!(report.raw(SOURCE_EMBEDDING), Ok(None));
        assert!(!report.errors.contains_key(SOURCE_EMBEDDING));
        assert_eq!(report.raw(SOURCE_LOCAL), Err("disk on fire".to_string()));
        assert_eq!(report.results[SOURCE_LOCAL], None);
        assert!(!report.requested(SOURCE_VECTOR));
        assert!(report.has_errors());
    }
}
