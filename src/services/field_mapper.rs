//! Field mapping.
//!
//! Turns a raw record into the ordered field set of one entity, following
//! the `fieldmappings` section of the import configuration.

use crate::config::{ColumnRef, ColumnSpec, GluePart, ImportConfig};
use crate::io::RawRecord;
use crate::models::{FieldData, FieldValue};
use crate::{Error, Result};
use std::collections::HashSet;

/// Maximum length, in characters, of a value substituted into a selector.
pub const MAX_SELECTOR_VALUE_CHARS: usize = 100;

/// Trims whitespace and stray quote characters from a column value.
#[must_use]
pub fn clean_value(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '\0' | '\x0B'))
}

/// Bounds a selector value to `max` characters.
///
/// The cut happens at the last whitespace inside the bound, or exactly at
/// the bound when there is none.
#[must_use]
pub fn truncate_at_whitespace(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let cut = value
        .char_indices()
        .nth(max)
        .map_or(value.len(), |(i, _)| i);
    let head = &value[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}

/// Outcome of resolving one column.
enum Column {
    Value(String),
    Missing,
}

/// Maps raw records to field data.
pub struct FieldMapper<'a> {
    config: &'a ImportConfig,
    selector_fields: HashSet<&'a str>,
}

impl<'a> FieldMapper<'a> {
    /// Creates a mapper for one invocation.
    #[must_use]
    pub fn new(config: &'a ImportConfig) -> Self {
        Self {
            config,
            selector_fields: config.selector_fields().into_iter().collect(),
        }
    }

    /// Returns a description of the first exclusion rule the record matches.
    #[must_use]
    pub fn exclusion(&self, record: &RawRecord) -> Option<String> {
        self.config.input.exclude.iter().find_map(|rule| {
            let value = match &rule.column {
                ColumnRef::Index(i) => record.column(*i),
                ColumnRef::Path(p) => record.select(p),
            }?;
            rule.pattern
                .is_match(clean_value(&value))
                .then(|| format!("column {} matches /{}/", rule.column, rule.pattern))
        })
    }

    /// Maps a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Record`] if a required column is empty, a mapped
    /// column is missing without a default, or required fields are absent
    /// after mapping.
    pub fn map(&self, record: &RawRecord) -> Result<FieldData> {
        for index in &self.config.input.required_columns {
            let present = matches!(self.column(record, *index), Column::Value(v) if !v.is_empty());
            if !present {
                return Err(Error::record(
                    record.serial,
                    format!("required column {index} is empty"),
                ));
            }
        }

        let mut data = FieldData::new();
        for (field, spec) in &self.config.field_mappings {
            let value = match self.resolve(record, spec) {
                Ok(value) => value,
                Err(what) if self.config.field_defaults.contains_key(field) => {
                    tracing::debug!(record = record.serial, field = %field, what = %what, "Using field default");
                    None
                },
                Err(what) => {
                    return Err(Error::record(
                        record.serial,
                        format!("field '{field}': {what}"),
                    ));
                },
            };
            let Some(value) = value else {
                continue;
            };
            let value = if self.selector_fields.contains(field.as_str()) {
                bound_for_selector(value)
            } else {
                value
            };
            if !value.is_empty() {
                data.insert(field.clone(), value);
            }
        }

        for (field, default) in &self.config.field_defaults {
            if !data.contains_key(field) {
                data.insert(field.clone(), default.clone());
            }
        }

        self.check_required(record.serial, &data)?;
        Ok(data)
    }

    /// Checks that every required field has a value.
    ///
    /// # Errors
    ///
    /// Returns one [`Error::Record`] naming all missing fields.
    pub fn check_required(&self, serial: u64, data: &FieldData) -> Result<()> {
        let missing: Vec<&str> = self
            .config
            .target
            .required_fields
            .iter()
            .filter(|f| data.get(f.as_str()).is_none_or(FieldValue::is_empty))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::record(
            serial,
            format!("missing required fields: {}", missing.join(", ")),
        ))
    }

    fn column(&self, record: &RawRecord, index: usize) -> Column {
        let value = record.column(index).map(|v| clean_value(&v).to_string());
        match value {
            Some(v) if !v.is_empty() => Column::Value(v),
            other => match self.config.column_defaults.get(&index) {
                Some(default) => Column::Value(default.clone()),
                None if other.is_some() => Column::Value(String::new()),
                None => Column::Missing,
            },
        }
    }

    fn lookup(&self, record: &RawRecord, column: &ColumnRef) -> std::result::Result<String, String> {
        match column {
            ColumnRef::Index(i) => match self.column(record, *i) {
                Column::Value(v) => Ok(v),
                Column::Missing => Err(format!(
                    "column {i} is missing (record has {} columns)",
                    record.column_count()
                )),
            },
            ColumnRef::Path(path) => record
                .select(path)
                .map(|v| clean_value(&v).to_string())
                .ok_or_else(|| format!("path '{path}' not found")),
        }
    }

    /// Resolves a spec to a value, `None` when the record has no data for it.
    fn resolve(
        &self,
        record: &RawRecord,
        spec: &ColumnSpec,
    ) -> std::result::Result<Option<FieldValue>, String> {
        let value = match spec {
            ColumnSpec::Direct(i) => {
                Some(FieldValue::Text(self.lookup(record, &ColumnRef::Index(*i))?))
            },
            ColumnSpec::Path(path) => {
                Some(FieldValue::Text(self.lookup(record, &ColumnRef::Path(path.clone()))?))
            },
            ColumnSpec::Glue(parts) => {
                let mut out = String::new();
                let mut has_data = false;
                for part in parts {
                    match part {
                        GluePart::Literal(text) => out.push_str(text),
                        GluePart::Column(i) => {
                            let value = self.lookup(record, &ColumnRef::Index(*i))?;
                            has_data |= !value.is_empty();
                            out.push_str(&value);
                        },
                    }
                }
                has_data.then(|| FieldValue::Text(clean_value(&out).to_string()))
            },
            ColumnSpec::Explode { source, separator } => {
                let joined = self.lookup(record, source)?;
                let members: Vec<String> = joined
                    .split(separator.as_str())
                    .map(clean_value)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                (!members.is_empty()).then_some(FieldValue::List(members))
            },
        };
        Ok(value.filter(|v| !v.is_empty()))
    }
}

fn bound_for_selector(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(text) => {
            FieldValue::Text(truncate_at_whitespace(&text, MAX_SELECTOR_VALUE_CHARS))
        },
        FieldValue::List(members) => FieldValue::List(
            members
                .iter()
                .map(|m| truncate_at_whitespace(m, MAX_SELECTOR_VALUE_CHARS))
                .collect(),
        ),
        other @ FieldValue::References(_) => other,
    }
}
