//! Column specifiers of field mappings.
//!
//! Every mapping value of the `fieldmappings` section is decided into a
//! [`ColumnSpec`] once, at configuration parse time. Invalid shapes are
//! configuration errors and never reach the record loop.
//!
//! | Document value | Spec |
//! |----------------|------|
//! | `2`, `"2"` | `Direct(2)` |
//! | `"name"`, `"author/@id"`, `"."` | `Path(..)` |
//! | `[1, " ", 2]` | `Glue([Column(1), Literal(" "), Column(2)])` |
//! | `{explode: 3, separator: "|"}` | `Explode { source: Index(3), separator: "|" }` |

use crate::{Error, Result};
use serde_json::Value;
use std::fmt;

/// Separator used by explode specs that do not name one.
pub const DEFAULT_EXPLODE_SEPARATOR: &str = ",";

/// Reference to one column of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    /// 0-based column index.
    Index(usize),
    /// Header name (tabular) or element path (hierarchical).
    Path(String),
}

impl ColumnRef {
    /// Parses a scalar column reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for empty strings, negative or
    /// fractional numbers and non-scalar values.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(Self::Index)
                .ok_or_else(|| Error::InvalidConfig(format!("invalid column index '{n}'"))),
            Value::String(s) => Self::parse(s),
            other => Err(Error::InvalidConfig(format!(
                "invalid column specifier '{other}'"
            ))),
        }
    }

    /// Parses a column reference from text: digits are an index, anything
    /// else a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the text is empty.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidConfig("empty column specifier".to_string()));
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse()
                .map(Self::Index)
                .map_err(|e| Error::InvalidConfig(format!("invalid column '{trimmed}': {e}")));
        }
        Ok(Self::Path(trimmed.to_string()))
    }

    /// Returns the index for index references.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Path(_) => None,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Path(p) => write!(f, "{p}"),
        }
    }
}

/// One element of a glue specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GluePart {
    /// Text copied verbatim.
    Literal(String),
    /// Value of a column.
    Column(usize),
}

/// How a field's value is derived from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSpec {
    /// A single column by index.
    Direct(usize),
    /// A header name or element path.
    Path(String),
    /// Concatenation of literals and columns.
    Glue(Vec<GluePart>),
    /// A column split into a list.
    Explode {
        /// Column holding the joined value.
        source: ColumnRef,
        /// Separator between list members.
        separator: String,
    },
}

impl ColumnSpec {
    /// Decides the spec for one mapping value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the field when the value has
    /// an unsupported shape.
    pub fn from_value(field: &str, value: &Value) -> Result<Self> {
        let spec = match value {
            Value::Number(_) | Value::String(_) => match ColumnRef::from_value(value)? {
                ColumnRef::Index(i) => Self::Direct(i),
                ColumnRef::Path(p) => Self::Path(p),
            },
            Value::Array(items) => Self::Glue(parse_glue(items)?),
            Value::Object(map) => {
                let mut source = None;
                let mut separator = DEFAULT_EXPLODE_SEPARATOR.to_string();
                for (key, v) in map {
                    match key.as_str() {
                        "explode" => source = Some(ColumnRef::from_value(v)?),
                        "separator" => match v {
                            Value::String(s) if !s.is_empty() => separator.clone_from(s),
                            _ => {
                                return Err(Error::InvalidConfig(format!(
                                    "field '{field}': separator must be a non-empty string"
                                )));
                            },
                        },
                        other => {
                            return Err(Error::InvalidConfig(format!(
                                "field '{field}': unknown column option '{other}'"
                            )));
                        },
                    }
                }
                let source = source.ok_or_else(|| {
                    Error::InvalidConfig(format!("field '{field}': object mapping needs 'explode'"))
                })?;
                Self::Explode { source, separator }
            },
            Value::Null | Value::Bool(_) => {
                return Err(Error::InvalidConfig(format!(
                    "field '{field}': invalid column specifier '{value}'"
                )));
            },
        };
        Ok(spec)
    }

    /// Column indices the spec reads, in order.
    #[must_use]
    pub fn column_indices(&self) -> Vec<usize> {
        match self {
            Self::Direct(i) => vec![*i],
            Self::Path(_) => Vec::new(),
            Self::Glue(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    GluePart::Column(i) => Some(*i),
                    GluePart::Literal(_) => None,
                })
                .collect(),
            Self::Explode { source, .. } => source.index().into_iter().collect(),
        }
    }
}

fn parse_glue(items: &[Value]) -> Result<Vec<GluePart>> {
    let parts = items
        .iter()
        .map(|item| match item {
            Value::Number(_) => ColumnRef::from_value(item).and_then(|r| {
                r.index()
                    .map(GluePart::Column)
                    .ok_or_else(|| Error::InvalidConfig(format!("invalid glue column '{item}'")))
            }),
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
                .parse()
                .map(GluePart::Column)
                .map_err(|e| Error::InvalidConfig(format!("invalid glue column '{s}': {e}"))),
            Value::String(s) => Ok(GluePart::Literal(s.clone())),
            other => Err(Error::InvalidConfig(format!(
                "invalid glue element '{other}'"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    if !parts.iter().any(|p| matches!(p, GluePart::Column(_))) {
        return Err(Error::InvalidConfig(
            "glue specifier needs at least one column".to_string(),
        ));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(1), ColumnSpec::Direct(1); "number")]
    #[test_case(json!("3"), ColumnSpec::Direct(3); "numeric string")]
    #[test_case(json!("name"), ColumnSpec::Path("name".to_string()); "header name")]
    #[test_case(json!("author/@id"), ColumnSpec::Path("author/@id".to_string()); "element path")]
    fn test_scalar_specs(value: Value, expected: ColumnSpec) {
        assert_eq!(ColumnSpec::from_value("f", &value).ok(), Some(expected));
    }

    #[test]
    fn test_glue_spec() {
        let spec = ColumnSpec::from_value("name", &json!([2, " ", "1"])).ok();
        assert_eq!(
            spec,
            Some(ColumnSpec::Glue(vec![
                GluePart::Column(2),
                GluePart::Literal(" ".to_string()),
                GluePart::Column(1),
            ]))
        );
    }

    #[test]
    fn test_explode_spec() {
        let spec = ColumnSpec::from_value("tags", &json!({"explode": 4, "separator": "|"})).ok();
        assert_eq!(
            spec,
            Some(ColumnSpec::Explode {
                source: ColumnRef::Index(4),
                separator: "|".to_string(),
            })
        );
        let spec = ColumnSpec::from_value("tags", &json!({"explode": "keywords"})).ok();
        assert_eq!(
            spec,
            Some(ColumnSpec::Explode {
                source: ColumnRef::Path("keywords".to_string()),
                separator: ",".to_string(),
            })
        );
    }

    #[test_case(json!(null); "null")]
    #[test_case(json!(true); "boolean")]
    #[test_case(json!(-1); "negative")]
    #[test_case(json!(1.5); "fractional")]
    #[test_case(json!(""); "empty string")]
    #[test_case(json!([" ", "-"]); "glue without columns")]
    #[test_case(json!([1, {"a": 1}]); "nested glue")]
    #[test_case(json!({"split": 1}); "unknown option")]
    #[test_case(json!({"separator": ";"}); "explode without source")]
    fn test_invalid_specs(value: Value) {
        let err = ColumnSpec::from_value("f", &value);
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_column_indices() {
        let spec = ColumnSpec::Glue(vec![
            GluePart::Column(2),
            GluePart::Literal("-".to_string()),
            GluePart::Column(5),
        ]);
        assert_eq!(spec.column_indices(), vec![2, 5]);
        assert!(ColumnSpec::Path("x".to_string()).column_indices().is_empty());
    }
}
