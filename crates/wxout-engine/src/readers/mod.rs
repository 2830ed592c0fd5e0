use std::collections::BTreeMap;
use std::path::Path;

use ndarray::ArrayD;
use thiserror::Error;

#[cfg(feature = "netcdf")]
mod netcdf_io;

#[cfg(feature = "netcdf")]
pub use netcdf_io::NetcdfReader;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::error::Error),

    #[error("{0}")]
    Decode(String),
}

/// An open model output file.
///
/// Dropping the handle closes the file.
pub trait DatasetHandle {
    fn path(&self) -> &Path;

    /// Length of dimension `name`, `None` when the file has no such dimension.
    fn dimension_size(&self, name: &str) -> Option<usize>;

    /// Values of variable `name`, `Ok(None)` when the file has no such variable.
    fn coordinate_values(&self, name: &str) -> Result<Option<ArrayD<f64>>, ReaderError>;
}

pub trait FormatReader: Send + Sync {
    fn format(&self) -> &str;
    fn open(&self, path: &Path) -> Result<Box<dyn DatasetHandle>, ReaderError>;
}

#[derive(Default)]
pub struct ReaderRegistry {
    readers: BTreeMap<String, Box<dyn FormatReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: FormatReader + 'static>(&mut self, reader: R) {
        self.readers
            .insert(reader.format().trim().to_lowercase(), Box::new(reader));
    }

    pub fn get(&self, format: &str) -> Option<&dyn FormatReader> {
        self.readers
            .get(&format.trim().to_lowercase())
            .map(|reader| reader.as_ref())
    }

    pub fn formats(&self) -> Vec<String> {
        self.readers.keys().cloned().collect()
    }
}

/// Readers compiled into this build.
pub fn default_reader_registry() -> ReaderRegistry {
    #[allow(unused_mut)]
    let mut registry = ReaderRegistry::new();
    #[cfg(feature = "netcdf")]
    registry.register(NetcdfReader);
    registry
}
