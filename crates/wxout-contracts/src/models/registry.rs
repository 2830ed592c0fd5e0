use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Deserialize;

use super::template::{FilenameTemplate, RenderContext, RenderedPattern};
use super::time_format::TimeFormat;
use crate::error::{ConfigError, Result};

pub const DIMS: &str = "dims";
pub const COORDS: &str = "coords";
pub const REGISTRY_ENV: &str = "WXOUT_REGISTRY";

/// Canonical name -> field name in the model's files, in resolution order.
pub type Vocabulary = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub family: String,
    pub format: String,
}

impl ConfigKey {
    pub fn new(family: &str, format: &str) -> Self {
        Self {
            family: normalize(family),
            format: normalize(format),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub family: String,
    pub format: String,
    pub time_format: Option<TimeFormat>,
    pub default_domain: Option<String>,
    pub templates: Vec<FilenameTemplate>,
    pub max_forecast_hour: u32,
    pub dims: Vocabulary,
    pub coords: Vocabulary,
    pub extra: IndexMap<String, Vocabulary>,
}

impl ModelConfig {
    pub fn key(&self) -> ConfigKey {
        ConfigKey::new(&self.family, &self.format)
    }

    pub fn dims(&self) -> &Vocabulary {
        &self.dims
    }

    pub fn coords(&self) -> &Vocabulary {
        &self.coords
    }

    pub fn templates(&self) -> &[FilenameTemplate] {
        &self.templates
    }

    pub fn vocabulary(&self, category: &str) -> Option<&Vocabulary> {
        match category {
            DIMS => Some(&self.dims),
            COORDS => Some(&self.coords),
            other => self.extra.get(other),
        }
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut names = vec![DIMS, COORDS];
        names.extend(self.extra.keys().map(String::as_str));
        names
    }

    /// Parses `value` with this family's time format.
    ///
    /// Families without one (static files such as geogrid) accept anything
    /// and yield `None`.
    pub fn parse_valid_time(&self, value: &str) -> Result<Option<NaiveDateTime>> {
        match &self.time_format {
            Some(format) => format.parse(value.trim()).map(Some),
            None => Ok(None),
        }
    }

    pub fn search_patterns(
        &self,
        domain: Option<&str>,
        valid_time: Option<&NaiveDateTime>,
    ) -> Result<Vec<RenderedPattern>> {
        let ctx = RenderContext {
            domain: domain.or(self.default_domain.as_deref()),
            valid_time,
            time_format: self.time_format.as_ref(),
            max_forecast_hour: self.max_forecast_hour,
        };
        let mut patterns = Vec::new();
        for template in &self.templates {
            patterns.extend(template.render(&ctx)?);
        }
        Ok(patterns)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ConfigError::InvalidRegistry {
            key: self.key().to_string(),
            reason,
        };
        if self.family.is_empty() || self.format.is_empty() {
            return Err(invalid("family and format must be non-empty".to_string()));
        }
        if self.templates.is_empty() {
            return Err(invalid("at least one file name template is required".to_string()));
        }
        if self.dims.is_empty() || self.coords.is_empty() {
            return Err(invalid("dims and coords vocabularies must be non-empty".to_string()));
        }
        for (category, vocabulary) in &self.extra {
            if category == DIMS || category == COORDS {
                return Err(invalid(format!("'{category}' is declared twice")));
            }
            if vocabulary.is_empty() {
                return Err(invalid(format!("vocabulary '{category}' is empty")));
            }
        }
        if self.time_format.is_none() {
            if let Some(template) = self.templates.iter().find(|t| t.needs_time()) {
                return Err(invalid(format!(
                    "template '{template}' needs a valid time but no time_format is set"
                )));
            }
        }
        Ok(())
    }
}

/// Read-only (family, format) -> [`ModelConfig`] table.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    models: IndexMap<ConfigKey, ModelConfig>,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ConfigRegistry {
    pub fn new(models: Option<IndexMap<ConfigKey, ModelConfig>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    /// Built-in entries merged with the document named by `WXOUT_REGISTRY`.
    pub fn load() -> Result<Self> {
        let mut registry = Self::default();
        if let Some(path) = registry_override_path() {
            tracing::info!("Merging registry overrides from {}", path.display());
            registry.merge_json_file(&path)?;
        }
        Ok(registry)
    }

    /// Process-wide registry, loaded once.
    ///
    /// A broken override document is reported and the built-in entries are
    /// used instead.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<ConfigRegistry>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let registry = Self::load().unwrap_or_else(|err| {
                    tracing::warn!("Ignoring registry overrides: {err}");
                    Self::default()
                });
                Arc::new(registry)
            })
            .clone()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut registry = Self {
            models: IndexMap::new(),
        };
        registry.merge_json_str(raw)?;
        Ok(registry)
    }

    /// Adds or replaces entries from a registry document.
    ///
    /// The whole document is validated before anything is merged.
    pub fn merge_json_str(&mut self, raw: &str) -> Result<()> {
        let document: RegistryDocument = serde_json::from_str(raw)?;
        let mut incoming = Vec::new();
        for entry in document.models {
            incoming.extend(entry.into_configs()?);
        }
        for config in incoming {
            self.models.insert(config.key(), config);
        }
        Ok(())
    }

    pub fn merge_json_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_json_str(&raw)
    }

    pub fn lookup(&self, family: &str, format: &str) -> Result<&ModelConfig> {
        let key = ConfigKey::new(family, format);
        self.models
            .get(&key)
            .ok_or_else(|| ConfigError::UnsupportedConfiguration {
                family: key.family,
                format: key.format,
                supported: self
                    .models
                    .keys()
                    .map(ConfigKey::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn contains(&self, family: &str, format: &str) -> bool {
        self.models.contains_key(&ConfigKey::new(family, format))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().map(|key| key.family.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn formats(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().map(|key| key.format.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

fn registry_override_path() -> Option<PathBuf> {
    env::var_os(REGISTRY_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    models: Vec<ModelEntryDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelEntryDocument {
    family: String,
    formats: Vec<String>,
    #[serde(default)]
    time_format: Option<String>,
    #[serde(default)]
    default_domain: Option<String>,
    templates: Vec<String>,
    #[serde(default)]
    max_forecast_hour: u32,
    dims: Vocabulary,
    coords: Vocabulary,
    #[serde(default)]
    vocabularies: IndexMap<String, Vocabulary>,
}

impl ModelEntryDocument {
    fn into_configs(self) -> Result<Vec<ModelConfig>> {
        if self.formats.is_empty() {
            return Err(ConfigError::InvalidRegistry {
                key: normalize(&self.family),
                reason: "at least one format is required".to_string(),
            });
        }
        let time_format = self.time_format.map(TimeFormat::new).transpose()?;
        let templates = self
            .templates
            .iter()
            .map(|source| FilenameTemplate::parse(source))
            .collect::<Result<Vec<_>>>()?;

        let mut configs = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let config = ModelConfig {
                family: normalize(&self.family),
                format: normalize(format),
                time_format: time_format.clone(),
                default_domain: self.default_domain.as_deref().map(normalize),
                templates: templates.clone(),
                max_forecast_hour: self.max_forecast_hour,
                dims: self.dims.clone(),
                coords: self.coords.clone(),
                extra: self
                    .vocabularies
                    .iter()
                    .map(|(name, vocabulary)| (normalize(name), vocabulary.clone()))
                    .collect(),
            };
            config.validate()?;
            configs.push(config);
        }
        Ok(configs)
    }
}

fn vocab(pairs: &[(&str, &str)]) -> Vocabulary {
    pairs
        .iter()
        .map(|(canonical, field)| (canonical.to_string(), field.to_string()))
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Built-in entries go through the same checks as registry documents; an
/// entry that fails them is logged and left out.
fn default_models() -> IndexMap<ConfigKey, ModelConfig> {
    let mut map = IndexMap::new();

    let mut insert = |entry: ModelEntryDocument| {
        let family = entry.family.clone();
        match entry.into_configs() {
            Ok(configs) => {
                for config in configs {
                    map.insert(config.key(), config);
                }
            }
            Err(err) => tracing::error!("Skipping built-in entry {family}: {err}"),
        }
    };

    insert(ModelEntryDocument {
        family: "wrf".to_string(),
        formats: strings(&["netcdf"]),
        time_format: Some("%Y-%m-%d_%H:%M:%S".to_string()),
        default_domain: Some("d01".to_string()),
        templates: strings(&["**/wrfout_{domain}_{valid_time}*"]),
        max_forecast_hour: 0,
        dims: vocab(&[
            ("nt", "Time"),
            ("nz", "bottom_top"),
            ("ny", "south_north"),
            ("nx", "west_east"),
        ]),
        coords: vocab(&[
            ("latitude", "XLAT"),
            ("longitude", "XLONG"),
            ("time", "XTIME"),
        ]),
        vocabularies: IndexMap::new(),
    });
    insert(ModelEntryDocument {
        family: "wrf-geogrid".to_string(),
        formats: strings(&["netcdf"]),
        time_format: None,
        default_domain: Some("d01".to_string()),
        templates: strings(&["@main/geo_em.{domain}.nc", "**/geo_em.{domain}.nc"]),
        max_forecast_hour: 0,
        dims: vocab(&[
            ("nt", "Time"),
            ("ny", "south_north_stag"),
            ("nx", "west_east_stag"),
        ]),
        coords: vocab(&[("latitude", "XLAT_M"), ("longitude", "XLONG_M")]),
        vocabularies: IndexMap::new(),
    });
    insert(ModelEntryDocument {
        family: "rrfs".to_string(),
        formats: strings(&["netcdf"]),
        time_format: Some("%Y%m%d%H".to_string()),
        default_domain: None,
        templates: strings(&["**/{init:%Y%m%d%H}/**/dynf{fhr:03}*"]),
        max_forecast_hour: 60,
        dims: vocab(&[
            ("nt", "time"),
            ("nz", "pfull"),
            ("nx", "grid_xt"),
            ("ny", "grid_yt"),
        ]),
        coords: vocab(&[
            ("xloc", "grid_xt"),
            ("yloc", "grid_yt"),
            ("pressure", "pfull"),
            ("time", "time"),
        ]),
        vocabularies: IndexMap::new(),
    });
    // GRIB2 and NetCDF conversions share field names but not file suffixes.
    for (format, suffix) in [("grib2", "grib2"), ("netcdf", "nc")] {
        insert(ModelEntryDocument {
            family: "hrrr".to_string(),
            formats: strings(&[format]),
            time_format: Some("%Y%m%d%H".to_string()),
            default_domain: None,
            templates: vec![format!(
                "**/hrrr.{{init:%Y%m%d}}/**/hrrr.t{{init:%H}}z.wrf*f{{fhr:02}}.{suffix}"
            )],
            max_forecast_hour: 48,
            dims: vocab(&[("nz", "lv_HYBL0"), ("ny", "ygrid_0"), ("nx", "xgrid_0")]),
            coords: vocab(&[("latitude", "gridlat_0"), ("longitude", "gridlon_0")]),
            vocabularies: IndexMap::new(),
        });
    }

    map
}
