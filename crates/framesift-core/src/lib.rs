//! framesift core: error taxonomy, configuration, data directory layout.

pub mod config;
pub mod error;

pub use config::{DataPaths, DistanceMetric, FramesiftConfig};
pub use error::{Error, Result};
