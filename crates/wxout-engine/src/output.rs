use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use glob::Pattern;
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use wxout_contracts::events::{EventWriter, LoadEvent};
use wxout_contracts::models::{ConfigKey, ConfigRegistry, ModelConfig, TemplateRoot, DIMS};

use crate::attributes::{AttributeValue, ResolvedAttributes};
use crate::error::{FileReadError, LoadError, Result};
use crate::readers::{default_reader_registry, DatasetHandle, ReaderRegistry};

/// Outcome of one [`ModelOutput::read_file`] pass.
#[derive(Debug, Default)]
pub struct ReadReport {
    pub opened: Vec<PathBuf>,
    pub failures: Vec<FileReadError>,
}

impl ReadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turns the first failure into an error, for callers that want
    /// all-or-nothing reads.
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.into()),
            None => Ok(self.opened),
        }
    }
}

/// Output of one model run at one valid time, as found on disk.
pub struct ModelOutput {
    registry: Arc<ConfigRegistry>,
    key: ConfigKey,
    main_dir: PathBuf,
    sub_dir: Option<PathBuf>,
    valid_time: String,
    valid_at: Option<NaiveDateTime>,
    domain: Option<String>,
    readers: ReaderRegistry,
    events: Option<EventWriter>,
    valid_files: Vec<PathBuf>,
    unread_files: Vec<PathBuf>,
    handles: IndexMap<PathBuf, Box<dyn DatasetHandle>>,
    attributes: ResolvedAttributes,
}

impl ModelOutput {
    /// Builds a model output against the shared registry.
    ///
    /// `sub_dir` may be empty. `domain` falls back to the family's default
    /// (`d01` for WRF) when `None`.
    pub fn new(
        family: &str,
        format: &str,
        main_dir: impl Into<PathBuf>,
        sub_dir: impl Into<PathBuf>,
        valid_time: &str,
        domain: Option<&str>,
    ) -> Result<Self> {
        Self::with_registry(
            ConfigRegistry::shared(),
            family,
            format,
            main_dir,
            sub_dir,
            valid_time,
            domain,
        )
    }

    pub fn with_registry(
        registry: Arc<ConfigRegistry>,
        family: &str,
        format: &str,
        main_dir: impl Into<PathBuf>,
        sub_dir: impl Into<PathBuf>,
        valid_time: &str,
        domain: Option<&str>,
    ) -> Result<Self> {
        let config = registry.lookup(family, format)?;
        let key = config.key();
        let valid_at = config.parse_valid_time(valid_time)?;
        let domain = domain
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .or_else(|| config.default_domain.clone());
        let sub_dir: PathBuf = sub_dir.into();
        let sub_dir = Some(sub_dir).filter(|dir| !dir.as_os_str().is_empty());

        Ok(Self {
            registry,
            key,
            main_dir: main_dir.into(),
            sub_dir,
            valid_time: valid_time.trim().to_string(),
            valid_at,
            domain,
            readers: default_reader_registry(),
            events: None,
            valid_files: Vec::new(),
            unread_files: Vec::new(),
            handles: IndexMap::new(),
            attributes: ResolvedAttributes::default(),
        })
    }

    pub fn with_readers(mut self, readers: ReaderRegistry) -> Self {
        self.readers = readers;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn family(&self) -> &str {
        &self.key.family
    }

    pub fn format(&self) -> &str {
        &self.key.format
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    pub fn sub_dir(&self) -> Option<&Path> {
        self.sub_dir.as_deref()
    }

    pub fn valid_time(&self) -> &str {
        &self.valid_time
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn config(&self) -> Result<&ModelConfig> {
        Ok(self.registry.lookup(&self.key.family, &self.key.format)?)
    }

    pub fn valid_files(&self) -> &[PathBuf] {
        &self.valid_files
    }

    pub fn unread_files(&self) -> &[PathBuf] {
        &self.unread_files
    }

    pub fn opened_files(&self) -> impl Iterator<Item = &Path> {
        self.handles.keys().map(PathBuf::as_path)
    }

    pub fn attributes(&self) -> &ResolvedAttributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.attributes.dimension(name)
    }

    pub fn coordinate(&self, name: &str) -> Option<&ndarray::ArrayD<f64>> {
        self.attributes.coordinate(name)
    }

    /// Directory `main_dir` + `sub_dir` that search templates are rooted at.
    pub fn search_dir(&self) -> PathBuf {
        match &self.sub_dir {
            Some(sub_dir) => self.main_dir.join(sub_dir),
            None => self.main_dir.clone(),
        }
    }

    /// Re-scans the filesystem for files matching the family's templates.
    ///
    /// Replaces `valid_files`; `unread_files` becomes every valid file not
    /// already open, and handles for files that are no longer valid are
    /// closed.
    pub fn find_valid_files(&mut self) -> Result<&[PathBuf]> {
        let registry = Arc::clone(&self.registry);
        let config = registry.lookup(&self.key.family, &self.key.format)?;
        let patterns = config.search_patterns(self.domain.as_deref(), self.valid_at.as_ref())?;

        let mut found = BTreeSet::new();
        for rendered in patterns {
            let base = match rendered.root {
                TemplateRoot::Main => self.main_dir.clone(),
                TemplateRoot::Search => self.search_dir(),
            };
            let pattern = join_pattern(&base, &rendered.pattern);
            debug!("Searching {pattern}");
            for entry in glob::glob(&pattern)? {
                match entry {
                    Ok(path) if path.is_file() => {
                        found.insert(path);
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Skipping unreadable path: {err}"),
                }
            }
        }

        self.valid_files = found.into_iter().collect();
        let valid = &self.valid_files;
        self.handles.retain(|path, _| valid.binary_search(path).is_ok());
        self.unread_files = self
            .valid_files
            .iter()
            .filter(|path| !self.handles.contains_key(*path))
            .cloned()
            .collect();

        if self.valid_files.is_empty() {
            warn!(
                "No {} files found under {} for valid time '{}'",
                self.key,
                self.search_dir().display(),
                self.valid_time
            );
        } else {
            info!(
                "Found {} valid {} file(s), {} unread",
                self.valid_files.len(),
                self.key,
                self.unread_files.len()
            );
        }
        self.emit(LoadEvent::FilesFound {
            family: self.key.family.clone(),
            format: self.key.format.clone(),
            valid_time: self.valid_time.clone(),
            files: self.valid_files.iter().map(|path| path_text(path)).collect(),
        });

        Ok(&self.valid_files)
    }

    /// Opens every unread file with the reader for the data format.
    ///
    /// Per-file failures do not stop the pass; they are returned in the
    /// report and the file stays unread.
    pub fn read_file(&mut self) -> Result<ReadReport> {
        let Some(reader) = self.readers.get(&self.key.format) else {
            return Err(LoadError::UnsupportedFormat {
                format: self.key.format.clone(),
                registered: self.readers.formats().join(", "),
            });
        };

        let pending = std::mem::take(&mut self.unread_files);
        let mut report = ReadReport::default();
        for path in pending {
            match reader.open(&path) {
                Ok(handle) => {
                    info!("Read {} file {}", self.key.format, path.display());
                    if let Some(events) = &self.events {
                        emit_to(events, &LoadEvent::FileOpened {
                            path: path_text(&path),
                        });
                    }
                    // replacing an existing handle closes the old one
                    self.handles.insert(path.clone(), handle);
                    report.opened.push(path);
                }
                Err(source) => {
                    warn!("Failed to read {}: {source}", path.display());
                    if let Some(events) = &self.events {
                        emit_to(events, &LoadEvent::FileReadFailed {
                            path: path_text(&path),
                            error: source.to_string(),
                        });
                    }
                    self.unread_files.push(path.clone());
                    report.failures.push(FileReadError { path, source });
                }
            }
        }
        Ok(report)
    }

    /// Resolves every attribute of `category` from the first opened file.
    ///
    /// Either the whole category is stored or nothing is: a missing field
    /// leaves previously resolved attributes as they were. Returns the
    /// canonical names that were set.
    pub fn check_for_attributes(&mut self, category: &str) -> Result<Vec<String>> {
        let registry = Arc::clone(&self.registry);
        let config = registry.lookup(&self.key.family, &self.key.format)?;
        let category = category.trim().to_lowercase();
        let Some(vocabulary) = config.vocabulary(&category) else {
            return Err(LoadError::UnknownCategory {
                category,
                known: config.categories().join(", "),
            });
        };
        let Some((path, handle)) = self.handles.first() else {
            return Err(LoadError::NoDataLoaded);
        };

        info!("Checking {} {category} attributes", self.key.family);
        let mut staged = Vec::with_capacity(vocabulary.len());
        for (canonical, field) in vocabulary {
            let value = if category == DIMS {
                handle.dimension_size(field).map(AttributeValue::Size)
            } else {
                handle
                    .coordinate_values(field)
                    .map_err(|source| LoadError::FieldRead {
                        field: field.clone(),
                        path: path.clone(),
                        source,
                    })?
                    .map(AttributeValue::Array)
            };
            let Some(value) = value else {
                return Err(LoadError::MissingField {
                    category,
                    canonical: canonical.clone(),
                    field: field.clone(),
                });
            };
            debug!("Resolved {category} '{canonical}' from field '{field}'");
            staged.push((canonical.clone(), value));
        }

        let names: Vec<String> = staged.iter().map(|(name, _)| name.clone()).collect();
        self.attributes.commit(staged);
        self.emit(LoadEvent::AttributesResolved {
            category,
            names: names.clone(),
        });
        Ok(names)
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(events) = &self.events {
            emit_to(events, &event);
        }
    }
}

impl fmt::Debug for ModelOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelOutput")
            .field("family", &self.key.family)
            .field("format", &self.key.format)
            .field("main_dir", &self.main_dir)
            .field("sub_dir", &self.sub_dir)
            .field("valid_time", &self.valid_time)
            .field("domain", &self.domain)
            .field("valid_files", &self.valid_files)
            .field("unread_files", &self.unread_files)
            .field("opened_files", &self.handles.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes.names().collect::<Vec<_>>())
            .finish()
    }
}

fn emit_to(events: &EventWriter, event: &LoadEvent) {
    if let Err(err) = events.emit(event) {
        warn!(
            "Failed to append load event to {}: {err:#}",
            events.path().display()
        );
    }
}

fn join_pattern(base: &Path, pattern: &str) -> String {
    let base = base.to_string_lossy();
    let base = base.trim_end_matches('/');
    format!("{}/{}", Pattern::escape(base), pattern)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
