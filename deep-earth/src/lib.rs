//! Deep Earth - multi-source terrain data on a shared grid
//!
//! This library acquires elevation, satellite embeddings, map vectors and
//! local rasters for a geographic region, aligns them on one UTM grid and
//! scores how complete the result is.
//!
//! # Flow
//!
//! ```ignore
//! use deep_earth::config::ConfigFile;
//! use deep_earth::harmonize::Harmonizer;
//! use deep_earth::orchestrator::DefaultOrchestrator;
//! use deep_earth::provider::FetchRequest;
//! use deep_earth::rasterize::VectorRasterizer;
//! use deep_earth::region::RegionContext;
//!
//! let config = ConfigFile::load()?;
//! let region: RegionContext = "44.9,-93.1,45.1,-92.9".parse()?;
//! let request = FetchRequest::new(region, 30.0);
//!
//! let orchestrator = DefaultOrchestrator::from_config(&config)?;
//! let report = orchestrator.fetch_all(&request).await;
//!
//! let mut harmonizer = Harmonizer::new(region, 30.0)?.with_weights(config.quality.weights());
//! let integration = harmonizer.integrate(&report, &VectorRasterizer::new())?;
//! ```

pub mod cache;
pub mod config;
pub mod harmonize;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod raster;
pub mod rasterize;
pub mod region;

/// Version of the Deep Earth library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
