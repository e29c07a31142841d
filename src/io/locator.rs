//! Resolution of source locations.
//!
//! A location is one of:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `data/people.csv` | plain filesystem path |
//! | `file:///srv/data/people.csv` | file URL |
//! | `store://42/people.csv` | file `people.csv` among the source files of entity 42 |

use crate::config::InputFormat;
use crate::models::EntityId;
use crate::storage::ContentStore;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Readable input of a resource.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// A file on disk, reopened for every pass.
    Path(PathBuf),
    /// An in-memory buffer.
    Bytes(Arc<[u8]>),
}

impl SourceInput {
    /// Opens a fresh reader positioned at the start of the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the file cannot be opened.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            Self::Path(path) => {
                let file = File::open(path)
                    .map_err(|e| Error::in_source(path.display().to_string(), e.to_string()))?;
                Ok(Box::new(BufReader::new(file)))
            },
            Self::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }
}

/// A resolved source.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Display name.
    pub name: String,
    /// Readable input.
    pub input: SourceInput,
}

impl Resource {
    /// Creates a resource for a file on disk.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            input: SourceInput::Path(path),
        }
    }

    /// Creates a resource over an in-memory buffer.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            input: SourceInput::Bytes(Arc::from(bytes.into())),
        }
    }

    /// Lowercase file extension of the resource name.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    /// Warning text when the extension does not fit the format.
    ///
    /// Resources without an extension are not checked.
    #[must_use]
    pub fn format_mismatch(&self, format: InputFormat) -> Option<String> {
        let extension = self.extension()?;
        if format.extensions().contains(&extension.as_str()) {
            return None;
        }
        Some(format!(
            "{}: extension '.{extension}' does not look like {format} input",
            self.name
        ))
    }
}

/// Resolves location strings to resources.
pub struct ResourceLocator<'a> {
    store: Option<&'a dyn ContentStore>,
    source_field: String,
}

impl<'a> ResourceLocator<'a> {
    /// Creates a locator for plain paths and file URLs.
    #[must_use]
    pub fn new(source_field: impl Into<String>) -> Self {
        Self {
            store: None,
            source_field: source_field.into(),
        }
    }

    /// Enables `store://` locations backed by the given store.
    #[must_use]
    pub fn with_store(mut self, store: &'a dyn ContentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolves a location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] for unknown schemes, empty names and missing
    /// entities or files.
    pub fn resolve(&self, location: &str) -> Result<Resource> {
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::in_source("<empty>", "empty source location"));
        }

        if let Some(rest) = location.strip_prefix("store://") {
            return self.resolve_store(location, rest);
        }
        if let Some(path) = location.strip_prefix("file://") {
            return Self::resolve_path(location, path);
        }
        if let Some((scheme, _)) = location.split_once("://") {
            return Err(Error::in_source(
                location,
                format!("unsupported location scheme '{scheme}'"),
            ));
        }
        Self::resolve_path(location, location)
    }

    fn resolve_path(location: &str, path: &str) -> Result<Resource> {
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(Error::in_source(location, "file not found"));
        }
        Ok(Resource::from_path(path))
    }

    fn resolve_store(&self, location: &str, rest: &str) -> Result<Resource> {
        let store = self
            .store
            .ok_or_else(|| Error::in_source(location, "no content store configured"))?;
        let (id, file_name) = rest
            .split_once('/')
            .ok_or_else(|| Error::in_source(location, "expected store://<id>/<file>"))?;
        let entity: EntityId = id
            .parse()
            .map_err(|_| Error::in_source(location, format!("invalid entity id '{id}'")))?;
        if file_name.trim().is_empty() {
            return Err(Error::in_source(location, "empty file name"));
        }

        let files = store
            .get_field(entity, &self.source_field)
            .map_err(|e| Error::in_source(location, e.to_string()))?
            .map(|v| v.members())
            .unwrap_or_default();
        let path = files
            .iter()
            .map(PathBuf::from)
            .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(file_name))
            .ok_or_else(|| {
                Error::in_source(
                    location,
                    format!("'{file_name}' is not a source file of entity {entity}"),
                )
            })?;

        tracing::debug!(location, path = %path.display(), "Resolved store location");
        Ok(Resource {
            name: file_name.to_string(),
            input: SourceInput::Path(path),
        })
    }
}
