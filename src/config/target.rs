//! The `pages` section: target kind, selector template and operation tags.

use super::document::{get_bool, get_string, get_string_list, kind_name};
use crate::services::selector::SelectorTemplate;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Target kind used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "basic-page";

/// Selector template used when none is configured.
pub const DEFAULT_SELECTOR: &str = "title=@title";

/// An operation tag gating create, update and delete behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationTag {
    /// Create entities when no match is found.
    Import,
    /// Populate unset fields of matched entities (`update` is an alias).
    Merge,
    /// Replace already populated fields of matched entities.
    Overwrite,
    /// Delete matched entities.
    Delete,
    /// Allow bulk deletion of every entity of the dataset.
    Purge,
}

impl OperationTag {
    /// Parses a tag name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown tags.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "import" => Ok(Self::Import),
            "merge" | "update" => Ok(Self::Merge),
            "overwrite" => Ok(Self::Overwrite),
            "delete" => Ok(Self::Delete),
            "purge" => Ok(Self::Purge),
            other => Err(Error::InvalidConfig(format!("unknown operation tag '{other}'"))),
        }
    }

    /// Returns the tag as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
            Self::Delete => "delete",
            Self::Purge => "purge",
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of operation tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTags(BTreeSet<OperationTag>);

impl OperationTags {
    /// Creates an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parses a comma or whitespace separated tag list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any tag is unknown.
    pub fn parse(list: &str) -> Result<Self> {
        super::document::split_list(list)
            .iter()
            .map(|t| OperationTag::parse(t))
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    /// Adds a tag.
    #[must_use]
    pub fn with(mut self, tag: OperationTag) -> Self {
        self.0.insert(tag);
        self
    }

    /// Removes a tag.
    #[must_use]
    pub fn without(mut self, tag: OperationTag) -> Self {
        self.0.remove(&tag);
        self
    }

    /// Returns the union of both sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Returns `true` if the tag is present.
    #[must_use]
    pub fn contains(&self, tag: OperationTag) -> bool {
        self.0.contains(&tag)
    }

    /// Returns `true` if matched entities may be updated.
    #[must_use]
    pub fn allows_update(&self) -> bool {
        self.contains(OperationTag::Merge) || self.contains(OperationTag::Overwrite)
    }

    /// Returns `true` if no tag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tags in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = OperationTag> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for OperationTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(OperationTag::as_str).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Target options of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Kind of the entities created and matched.
    pub template: String,
    /// Selector template with `@field` placeholders.
    pub selector: SelectorTemplate,
    /// Fields that must be present after mapping.
    pub required_fields: Vec<String>,
    /// Tags configured for every source of the dataset.
    pub tags: OperationTags,
    /// Fields replaced on update even without the `overwrite` tag.
    pub overwrite_fields: Vec<String>,
    /// Extra clause narrowing the purge selector.
    pub purge_selector: Option<String>,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            selector: SelectorTemplate::default_title(),
            required_fields: Vec::new(),
            tags: OperationTags::new(),
            overwrite_fields: Vec::new(),
            purge_selector: None,
        }
    }
}

impl TargetSpec {
    /// Builds the spec from the merged `pages` section.
    ///
    /// Besides `tags`, the flags `merge: true`, `overwrite: true`,
    /// `overwrite: [field, ...]` and `skip_new: true` are understood.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown tags, invalid selector
    /// templates or malformed lists.
    pub fn from_section(section: &Map<String, Value>) -> Result<Self> {
        let mut spec = Self::default();

        if let Some(template) = get_string(section, "template")?.filter(|t| !t.is_empty()) {
            spec.template = template;
        }
        if let Some(selector) = get_string(section, "selector")? {
            spec.selector = SelectorTemplate::parse(&selector)?;
        }
        spec.required_fields = get_string_list(section, "required_fields")?;

        let mut tags = OperationTags::new();
        for tag in get_string_list(section, "tags")? {
            tags = tags.with(OperationTag::parse(&tag)?);
        }
        if get_bool(section, "merge")? == Some(true) {
            tags = tags.with(OperationTag::Merge);
        }
        match section.get("overwrite") {
            None | Some(Value::Null) => {},
            Some(Value::Array(_) | Value::String(_)) => {
                spec.overwrite_fields = get_string_list(section, "overwrite")?;
            },
            Some(Value::Bool(_) | Value::Number(_)) => {
                if get_bool(section, "overwrite")? == Some(true) {
                    tags = tags.with(OperationTag::Overwrite);
                }
            },
            Some(other) => {
                return Err(Error::InvalidConfig(format!(
                    "'overwrite' must be a boolean or a field list, found {}",
                    kind_name(other)
                )));
            },
        }
        if get_bool(section, "skip_new")? == Some(true) {
            tags = tags.without(OperationTag::Import);
        }
        spec.tags = tags;
        spec.purge_selector = get_string(section, "purge_selector")?.filter(|s| !s.is_empty());

        Ok(spec)
    }

    /// Returns `true` if the field is replaced on update.
    #[must_use]
    pub fn overwrites(&self, tags: &OperationTags, field: &str) -> bool {
        tags.contains(OperationTag::Overwrite) || self.overwrite_fields.iter().any(|f| f == field)
    }

    /// Returns `true` if the field is listed as required.
    #[must_use]
    pub fn is_required(&self, field: &str) -> bool {
        self.required_fields.iter().any(|f| f == field)
    }
}
