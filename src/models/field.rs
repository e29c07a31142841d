//! Field values and per-kind field configuration.

use super::EntityId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Date format used for datetime fields when none is configured.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Value of one field, either mapped from a record or stored on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// A single text value.
    Text(String),
    /// An ordered list of text values.
    List(Vec<String>),
    /// Identifiers of referenced entities.
    References(Vec<EntityId>),
}

impl FieldValue {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns `true` if the value carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.iter().all(String::is_empty),
            Self::References(ids) => ids.is_empty(),
        }
    }

    /// Returns the scalar used when the value is substituted into a selector.
    ///
    /// Lists contribute their first member.
    #[must_use]
    pub fn selector_scalar(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::List(items) => items.first().cloned(),
            Self::References(ids) => ids.first().map(ToString::to_string),
        }
    }

    /// Returns every member of the value as text.
    #[must_use]
    pub fn members(&self) -> Vec<String> {
        match self {
            Self::Text(s) => vec![s.clone()],
            Self::List(items) => items.clone(),
            Self::References(ids) => ids.iter().map(ToString::to_string).collect(),
        }
    }

    /// Returns `true` for multi-valued variants.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::List(_) | Self::References(_) => write!(f, "[{}]", self.members().join(", ")),
        }
    }
}

/// Ordered field name to value map for one record.
///
/// Rebuilt from scratch for every record and never reused.
pub type FieldData = IndexMap<String, FieldValue>;

/// An option of an options-typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Option identifier stored on the entity.
    pub id: u64,
    /// Machine value.
    #[serde(default)]
    pub value: String,
    /// Human readable title.
    #[serde(default)]
    pub title: String,
}

/// Configuration of a reference-typed field.
///
/// Used to build the secondary selector that resolves a mapped value to the
/// identifier of an existing entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Base selector of selectable entities.
    #[serde(default)]
    pub selector: Option<String>,
    /// Kind of selectable entities.
    #[serde(default)]
    pub template: Option<String>,
    /// Fields matched against the mapped value (defaults to `title`).
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// Parent that selectable entities live under.
    #[serde(default)]
    pub parent: Option<EntityId>,
}

/// Storage kind of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain text.
    Text,
    /// Date stored as text in a fixed chrono format.
    Datetime {
        /// chrono format string the value must parse with.
        #[serde(default = "default_date_format")]
        format: String,
    },
    /// One of a fixed set of options.
    Options {
        /// The selectable options.
        options: Vec<SelectOption>,
    },
    /// File attachments.
    File {
        /// Maximum number of files; `1` makes the field single-valued.
        #[serde(default)]
        max_files: usize,
    },
    /// Reference to other entities.
    Reference(ReferenceConfig),
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

/// Configuration of one field of a target kind, as served by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Field name.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
    /// Whether the store marks the field as required.
    #[serde(default)]
    pub required: bool,
}

impl FieldConfig {
    /// Creates a plain text field configuration.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            required: false,
        }
    }

    /// Creates a field configuration of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns `true` for reference-typed fields.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference(_))
    }

    /// Returns `true` if the field holds more than one value.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        match &self.kind {
            FieldKind::File { max_files } => *max_files != 1,
            FieldKind::Reference(_) => true,
            FieldKind::Text | FieldKind::Datetime { .. } | FieldKind::Options { .. } => false,
        }
    }
}
