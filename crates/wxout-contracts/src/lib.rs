//! Static configuration for reading gridded model output: which files a
//! model family writes, how it stamps times into their names, and what its
//! dimensions and coordinates are called.

pub mod error;
pub mod events;
pub mod models;

pub use error::ConfigError;
