use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};

use super::{DatasetHandle, FormatReader, ReaderError};

/// Reads NetCDF (classic and NetCDF-4) model output through libnetcdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfReader;

impl FormatReader for NetcdfReader {
    fn format(&self) -> &str {
        "netcdf"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DatasetHandle>, ReaderError> {
        let file = netcdf::open(path)?;
        tracing::debug!("Opened NetCDF file {}", path.display());
        Ok(Box::new(NetcdfDataset {
            path: path.to_path_buf(),
            file,
        }))
    }
}

struct NetcdfDataset {
    path: PathBuf,
    file: netcdf::File,
}

impl DatasetHandle for NetcdfDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dimension_size(&self, name: &str) -> Option<usize> {
        self.file.dimension(name).map(|dim| dim.len())
    }

    fn coordinate_values(&self, name: &str) -> Result<Option<ArrayD<f64>>, ReaderError> {
        let Some(variable) = self.file.variable(name) else {
            return Ok(None);
        };
        let shape: Vec<usize> = variable.dimensions().iter().map(|dim| dim.len()).collect();
        // libnetcdf converts float/int storage to double on the way out
        let values = variable.get_values::<f64, _>(..)?;
        let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|err| {
            ReaderError::Decode(format!(
                "variable '{name}' in {} has inconsistent shape: {err}",
                self.path.display()
            ))
        })?;
        Ok(Some(array))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::NetcdfReader;
    use crate::readers::{DatasetHandle, FormatReader};

    fn write_wrfout(path: &Path) -> anyhow::Result<()> {
        let mut file = netcdf::create(path)?;
        file.add_dimension("bottom_top", 3)?;
        file.add_dimension("south_north", 2)?;
        file.add_dimension("west_east", 2)?;

        let mut xlat = file.add_variable::<f64>("XLAT", &["south_north", "west_east"])?;
        xlat.put_values(&[40.0, 40.0, 41.5, 41.5], ..)?;
        let mut znu = file.add_variable::<f32>("ZNU", &["bottom_top"])?;
        znu.put_values(&[0.75_f32, 0.5, 0.25], ..)?;
        Ok(())
    }

    #[test]
    fn reads_dimensions_and_coordinates() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wrfout_d01_2021-01-01_22:00:00");
        write_wrfout(&path)?;

        let dataset = NetcdfReader.open(&path)?;
        assert_eq!(dataset.path(), path.as_path());
        assert_eq!(dataset.dimension_size("bottom_top"), Some(3));
        assert_eq!(dataset.dimension_size("west_east"), Some(2));
        assert_eq!(dataset.dimension_size("soil_layers"), None);

        let xlat = dataset
            .coordinate_values("XLAT")?
            .ok_or_else(|| anyhow::anyhow!("XLAT missing"))?;
        assert_eq!(xlat.shape(), &[2, 2]);
        assert_eq!(xlat.iter().copied().collect::<Vec<_>>(), vec![40.0, 40.0, 41.5, 41.5]);

        let znu = dataset
            .coordinate_values("ZNU")?
            .ok_or_else(|| anyhow::anyhow!("ZNU missing"))?;
        assert_eq!(znu.shape(), &[3]);
        assert_eq!(znu.iter().copied().collect::<Vec<_>>(), vec![0.75, 0.5, 0.25]);
        Ok(())
    }

    #[test]
    fn missing_variable_is_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wrfout.nc");
        write_wrfout(&path)?;

        let dataset = NetcdfReader.open(&path)?;
        assert!(dataset.coordinate_values("XLONG")?.is_none());
        Ok(())
    }

    #[test]
    fn opening_a_non_netcdf_file_fails() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "not netcdf")?;
        assert!(NetcdfReader.open(&path).is_err());
        Ok(())
    }
}
