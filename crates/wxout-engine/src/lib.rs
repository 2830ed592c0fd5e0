//! Finds, opens and describes gridded atmospheric model output (WRF, RRFS,
//! HRRR) using the vocabularies in [`wxout_contracts::models::ConfigRegistry`].
//!
//! ```no_run
//! use wxout_engine::ModelOutput;
//!
//! # fn main() -> wxout_engine::Result<()> {
//! let mut output = ModelOutput::new(
//!     "wrf",
//!     "netcdf",
//!     "/data/wrf",
//!     "run01",
//!     "2021-01-01_22:00:00",
//!     Some("d01"),
//! )?;
//! output.find_valid_files()?;
//! let report = output.read_file()?;
//! for failure in &report.failures {
//!     eprintln!("{failure}");
//! }
//! output.check_for_attributes("dims")?;
//! println!("nz = {:?}", output.dimension("nz"));
//! # Ok(())
//! # }
//! ```

mod attributes;
mod error;
mod output;
pub mod readers;

pub use attributes::{AttributeValue, ResolvedAttributes};
pub use error::{FileReadError, LoadError, Result};
pub use output::{ModelOutput, ReadReport};
