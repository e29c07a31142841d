//! Import configuration.
//!
//! An [`ImportConfig`] is parsed once per invocation from the dataset-wide
//! default document overlaid by the per-source description. Both documents
//! are JSON or YAML with the sections below; unknown sections are errors.
//!
//! ```yaml
//! name: Books
//! input:
//!   type: csv
//!   delimiter: ";"
//!   header: 1
//! fieldmappings:
//!   title: 1
//!   isbn: 0
//!   author: [3, ", ", 2]
//!   keywords: {explode: 5, separator: "|"}
//! field_data_defaults:
//!   language: en
//! csv_data_defaults:
//!   4: unknown
//! pages:
//!   template: book
//!   selector: "isbn=@isbn"
//!   required_fields: [title, isbn]
//!   tags: [import, merge]
//! ```

use super::column::ColumnSpec;
use super::document::{self, get_string, kind_name, section};
use super::input::InputSpec;
use super::target::TargetSpec;
use crate::models::FieldValue;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Top-level sections of an import configuration document.
pub const SECTIONS: &[&str] = &[
    "name",
    "comment",
    "input",
    "csv_data_defaults",
    "field_data_defaults",
    "fieldmappings",
    "pages",
];

/// Parsed, validated import configuration.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Human readable name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Reader options.
    pub input: InputSpec,
    /// Field name to column spec, in declaration order.
    pub field_mappings: IndexMap<String, ColumnSpec>,
    /// Target options.
    pub target: TargetSpec,
    /// Values used for fields that mapped to nothing.
    pub field_defaults: IndexMap<String, FieldValue>,
    /// Values used for missing or empty columns.
    pub column_defaults: BTreeMap<usize, String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let mut field_mappings = IndexMap::new();
        field_mappings.insert("title".to_string(), ColumnSpec::Direct(1));
        Self {
            name: "Default import configuration".to_string(),
            comment: String::new(),
            input: InputSpec::default(),
            field_mappings,
            target: TargetSpec::default(),
            field_defaults: IndexMap::new(),
            column_defaults: BTreeMap::new(),
        }
    }
}

impl ImportConfig {
    /// The default document every configuration is merged over.
    #[must_use]
    pub fn default_document() -> Map<String, Value> {
        let value = json!({
            "name": "Default import configuration",
            "comment": "",
            "input": {
                "type": "csv",
                "delimiter": ",",
                "max_line_length": 2048,
                "header": 1,
                "enclosure": "\""
            },
            "csv_data_defaults": {},
            "field_data_defaults": {},
            "fieldmappings": {"title": 1},
            "pages": {
                "template": super::target::DEFAULT_TEMPLATE,
                "selector": super::target::DEFAULT_SELECTOR
            }
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Parses one configuration document over the defaults.
    ///
    /// Empty input yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfigSection`] for unknown sections and
    /// [`Error::InvalidConfig`] for any other invalid content.
    pub fn parse(raw: &str) -> Result<Self> {
        Self::parse_layered(&[raw])
    }

    /// Parses several documents, each overlaying the previous one.
    ///
    /// The dataset-wide document comes first, the per-source description last.
    ///
    /// # Errors
    ///
    /// Same as [`ImportConfig::parse`].
    pub fn parse_layered(layers: &[&str]) -> Result<Self> {
        let mut merged = Self::default_document();
        for raw in layers {
            let layer = document::parse(raw)?;
            validate_sections(&layer)?;
            let layer = layer
                .into_iter()
                .map(|(k, v)| (k, document::sanitize(v)))
                .collect();
            document::merge(&mut merged, layer);
        }
        Self::from_document(&merged)
    }

    /// Builds the typed configuration from a merged document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid section content.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self> {
        validate_sections(doc)?;
        let empty = Map::new();

        let name = get_string(doc, "name")?.unwrap_or_default();
        let comment = get_string(doc, "comment")?.unwrap_or_default();
        let input = InputSpec::from_section(section(doc, "input", &empty)?)?;
        let target = TargetSpec::from_section(section(doc, "pages", &empty)?)?;

        let field_mappings = section(doc, "fieldmappings", &empty)?
            .iter()
            .map(|(field, value)| {
                ColumnSpec::from_value(field, value).map(|spec| (field.clone(), spec))
            })
            .collect::<Result<IndexMap<_, _>>>()?;
        if field_mappings.is_empty() {
            return Err(Error::InvalidConfig(
                "'fieldmappings' must map at least one field".to_string(),
            ));
        }

        let field_defaults = section(doc, "field_data_defaults", &empty)?
            .iter()
            .map(|(field, value)| default_value(field, value).map(|v| (field.clone(), v)))
            .collect::<Result<IndexMap<_, _>>>()?;

        let column_defaults = section(doc, "csv_data_defaults", &empty)?
            .iter()
            .map(|(column, value)| {
                let index = column.trim().parse::<usize>().map_err(|_| {
                    Error::InvalidConfig(format!("csv_data_defaults key '{column}' is not a column index"))
                })?;
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(Error::InvalidConfig(format!(
                            "csv_data_defaults value for column {column} must be a scalar, found {}",
                            kind_name(other)
                        )));
                    },
                };
                Ok((index, text))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let config = Self {
            name,
            comment,
            input,
            field_mappings,
            target,
            field_defaults,
            column_defaults,
        };
        config.validate()?;
        Ok(config)
    }

    /// Every selector placeholder must name a mapped or defaulted field.
    fn validate(&self) -> Result<()> {
        let unknown = self.target.selector.placeholders().find(|field| {
            !self.field_mappings.contains_key(*field) && !self.field_defaults.contains_key(*field)
        });
        match unknown {
            Some(field) => Err(Error::InvalidConfig(format!(
                "selector placeholder '@{field}' names no mapped field"
            ))),
            None => Ok(()),
        }
    }

    /// Minimum number of columns a tabular record needs.
    ///
    /// Indices covered by a column default do not count.
    #[must_use]
    pub fn required_column_count(&self) -> usize {
        self.field_mappings
            .values()
            .flat_map(ColumnSpec::column_indices)
            .chain(self.input.exclude.iter().filter_map(|r| r.column.index()))
            .filter(|i| !self.column_defaults.contains_key(i))
            .map(|i| i + 1)
            .max()
            .unwrap_or(0)
    }

    /// Fields whose values are substituted into the selector.
    #[must_use]
    pub fn selector_fields(&self) -> Vec<&str> {
        self.target.selector.placeholders().collect()
    }
}

fn validate_sections(doc: &Map<String, Value>) -> Result<()> {
    doc.keys()
        .find(|k| !SECTIONS.contains(&k.as_str()))
        .map_or(Ok(()), |unknown| Err(Error::InvalidConfigSection(unknown.clone())))
}

fn default_value(field: &str, value: &Value) -> Result<FieldValue> {
    match value {
        Value::String(s) => Ok(FieldValue::Text(s.clone())),
        Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
        Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(Error::InvalidConfig(format!(
                    "default for field '{field}' contains a {}",
                    kind_name(other)
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(FieldValue::List),
        other => Err(Error::InvalidConfig(format!(
            "default for field '{field}' must be a scalar or list, found {}",
            kind_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::column::GluePart;
    use crate::config::input::InputFormat;
    use crate::config::target::OperationTag;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ImportConfig::parse("").unwrap_or_default();
        assert_eq!(config.name, "Default import configuration");
        assert_eq!(config.input.format, InputFormat::Tabular);
        assert_eq!(config.input.header, 1);
        assert_eq!(
            config.field_mappings.get("title"),
            Some(&ColumnSpec::Direct(1))
        );
        assert_eq!(config.target.template, "basic-page");
        assert_eq!(config.target.selector.source(), "title=@title");
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let err = ImportConfig::parse("fieldmapping:\n  title: 1\n");
        assert!(matches!(err, Err(Error::InvalidConfigSection(s)) if s == "fieldmapping"));
    }

    #[test]
    fn test_yaml_document() {
        let raw = r#"
name: Books
input:
  delimiter: ";"
fieldmappings:
  isbn: 0
  author: [3, ", ", 2]
  keywords: {explode: 5, separator: "|"}
field_data_defaults:
  language: en
csv_data_defaults:
  4: unknown
pages:
  template: book
  selector: "isbn=@isbn"
  tags: [import, merge]
"#;
        let config = ImportConfig::parse(raw).unwrap_or_default();
        assert_eq!(config.name, "Books");
        assert_eq!(config.input.delimiter, ";");
        // default mapping is kept unless removed
        assert_eq!(
            config.field_mappings.keys().collect::<Vec<_>>(),
            vec!["title", "isbn", "author", "keywords"]
        );
        assert_eq!(
            config.field_mappings.get("author"),
            Some(&ColumnSpec::Glue(vec![
                GluePart::Column(3),
                GluePart::Literal(", ".to_string()),
                GluePart::Column(2),
            ]))
        );
        assert_eq!(
            config.field_defaults.get("language"),
            Some(&FieldValue::text("en"))
        );
        assert_eq!(config.column_defaults.get(&4).map(String::as_str), Some("unknown"));
        assert!(config.target.tags.contains(OperationTag::Import));
        assert_eq!(config.selector_fields(), vec!["isbn"]);
    }

    #[test]
    fn test_json_prefix_document() {
        let raw = r#"JSON{"fieldmappings": {"title": null, "name": 2}, "pages": {"selector": "name=@name"}}"#;
        let config = ImportConfig::parse(raw).unwrap_or_default();
        assert_eq!(config.field_mappings.len(), 1);
        assert_eq!(config.field_mappings.get("name"), Some(&ColumnSpec::Direct(2)));
    }

    #[test]
    fn test_layered_documents() {
        let dataset = "pages: {template: book, tags: import}\ninput: {delimiter: ';'}";
        let file = "input: {header: 0}\nfieldmappings: {isbn: 0}";
        let config = ImportConfig::parse_layered(&[dataset, file]).unwrap_or_default();
        assert_eq!(config.target.template, "book");
        assert_eq!(config.input.delimiter, ";");
        assert_eq!(config.input.header, 0);
        assert!(config.field_mappings.contains_key("title"));
        assert!(config.field_mappings.contains_key("isbn"));
    }

    #[test]
    fn test_selector_placeholder_must_be_mapped() {
        let err = ImportConfig::parse("pages: {selector: 'isbn=@isbn'}");
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_mapping_is_config_error() {
        let err = ImportConfig::parse("fieldmappings: {title: true}");
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_mappings_cannot_be_emptied() {
        let err = ImportConfig::parse("fieldmappings: {title: null}");
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_required_column_count() {
        let raw = "fieldmappings: {a: 0, b: [4, '-', 2]}\ncsv_data_defaults: {4: x}";
        let config = ImportConfig::parse(raw).unwrap_or_default();
        // title:1, a:0, b:[4,2] with 4 defaulted -> highest required index is 2
        assert_eq!(config.required_column_count(), 3);
    }

    #[test]
    fn test_scalar_settings_are_sanitized() {
        let config = ImportConfig::parse("name: \"  Books\\u0007  \"").unwrap_or_default();
        assert_eq!(config.name, "Books");
    }
}
