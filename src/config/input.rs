//! The `input` section: source format and reader options.

use super::column::ColumnRef;
use super::document::{get_string, get_u64, kind_name};
use crate::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

/// Default maximum raw record length in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2048;

/// Record source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// Delimited text (CSV and friends).
    Tabular,
    /// Stream of repeating XML elements.
    Hierarchical,
}

impl InputFormat {
    /// Parses a format name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "tsv" | "tabular" => Ok(Self::Tabular),
            "xml" | "hierarchical" => Ok(Self::Hierarchical),
            other => Err(Error::InvalidConfig(format!("unknown input type '{other}'"))),
        }
    }

    /// Returns the format as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "csv",
            Self::Hierarchical => "xml",
        }
    }

    /// File extensions expected for this format.
    #[must_use]
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Tabular => &["csv", "tsv", "txt"],
            Self::Hierarchical => &["xml"],
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Character encoding every record must be valid in.
///
/// Labels resolve through the WHATWG label table of `encoding_rs`, so
/// `latin1` and `iso-8859-1` decode as windows-1252. `ascii` is kept strict:
/// any byte above 0x7F fails the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    codec: &'static encoding_rs::Encoding,
    ascii_only: bool,
}

impl Default for Encoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl Encoding {
    /// Strict UTF-8.
    #[must_use]
    pub fn utf8() -> Self {
        Self {
            codec: encoding_rs::UTF_8,
            ascii_only: false,
        }
    }

    /// 7-bit ASCII.
    #[must_use]
    pub fn ascii() -> Self {
        Self {
            codec: encoding_rs::UTF_8,
            ascii_only: true,
        }
    }

    /// Parses an encoding label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unknown labels and for encodings
    /// that are not ASCII compatible, since delimiters are matched on bytes.
    pub fn parse(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase().replace('_', "-");
        if matches!(label.as_str(), "ascii" | "us-ascii") {
            return Ok(Self::ascii());
        }
        let codec = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| Error::InvalidConfig(format!("unsupported encoding '{label}'")))?;
        if !codec.is_ascii_compatible() {
            return Err(Error::InvalidConfig(format!(
                "encoding '{}' cannot be read byte by byte",
                codec.name()
            )));
        }
        Ok(Self {
            codec,
            ascii_only: false,
        })
    }

    /// Canonical name of the encoding.
    #[must_use]
    pub fn name(&self) -> &'static str {
        if self.ascii_only { "US-ASCII" } else { self.codec.name() }
    }

    /// Decodes raw bytes into text.
    ///
    /// Returns a description of the problem if the bytes are not valid in
    /// this encoding.
    pub fn decode(self, bytes: &[u8]) -> std::result::Result<String, String> {
        if self.ascii_only {
            if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                return Err(format!("non-ASCII byte at position {pos}"));
            }
        }
        self.codec
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(std::borrow::Cow::into_owned)
            .ok_or_else(|| format!("malformed {} sequence", self.codec.name()))
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a short tabular record does to the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColumnMismatchPolicy {
    /// Abort the whole source.
    #[default]
    Fail,
    /// Fail only the record.
    Skip,
}

/// A record is excluded when the column value matches the pattern.
#[derive(Debug, Clone)]
pub struct ExcludeRule {
    /// Column tested.
    pub column: ColumnRef,
    /// Pattern searched in the column value.
    pub pattern: Regex,
}

impl ExcludeRule {
    fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidConfig(format!(
                "exclude rules must be mappings, found {}",
                kind_name(value)
            )));
        };
        let column = map
            .get("column")
            .ok_or_else(|| Error::InvalidConfig("exclude rule needs 'column'".to_string()))
            .and_then(ColumnRef::from_value)?;
        let pattern = get_string(map, "pattern")?
            .ok_or_else(|| Error::InvalidConfig("exclude rule needs 'pattern'".to_string()))?;
        let pattern = Regex::new(&pattern)
            .map_err(|e| Error::InvalidConfig(format!("invalid exclude pattern: {e}")))?;
        Ok(Self { column, pattern })
    }
}

/// Reader options of a record source.
#[derive(Debug, Clone)]
pub struct InputSpec {
    /// Source format.
    pub format: InputFormat,
    /// Field delimiter (tabular) or record element name (hierarchical).
    pub delimiter: String,
    /// Quote character of tabular sources.
    pub enclosure: u8,
    /// Header rows at the top of a tabular source.
    pub header: usize,
    /// Encoding records must be valid in.
    pub encoding: Encoding,
    /// Maximum raw record length in bytes; 0 disables the check.
    pub max_line_length: usize,
    /// Stop after this many records.
    pub limit: Option<u64>,
    /// Records matching any rule are skipped.
    pub exclude: Vec<ExcludeRule>,
    /// Columns that must be non-empty.
    pub required_columns: Vec<usize>,
    /// Handling of records with too few columns.
    pub on_column_mismatch: ColumnMismatchPolicy,
    /// Overrides the location nominally associated with the task.
    pub location: Option<String>,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            format: InputFormat::Tabular,
            delimiter: ",".to_string(),
            enclosure: b'"',
            header: 1,
            encoding: Encoding::utf8(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            limit: None,
            exclude: Vec::new(),
            required_columns: Vec::new(),
            on_column_mismatch: ColumnMismatchPolicy::Fail,
            location: None,
        }
    }
}

impl InputSpec {
    /// Builds the spec from the merged `input` section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid types, delimiters,
    /// encodings, exclusion rules or column lists.
    pub fn from_section(section: &Map<String, Value>) -> Result<Self> {
        let mut spec = Self::default();

        if let Some(kind) = get_string(section, "type")? {
            spec.format = InputFormat::parse(&kind)?;
        }
        if let Some(delimiter) = get_string(section, "delimiter")? {
            spec.delimiter = delimiter;
        }
        if let Some(enclosure) = get_string(section, "enclosure")? {
            spec.enclosure = single_byte("enclosure", &enclosure)?;
        }
        if let Some(header) = get_u64(section, "header")? {
            spec.header = to_usize("header", header)?;
        }
        if let Some(encoding) = get_string(section, "encoding")? {
            spec.encoding = Encoding::parse(&encoding)?;
        }
        if let Some(max) = get_u64(section, "max_line_length")? {
            spec.max_line_length = to_usize("max_line_length", max)?;
        }
        spec.limit = get_u64(section, "limit")?.filter(|l| *l > 0);
        spec.exclude = match section.get("exclude") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rules)) => rules
                .iter()
                .map(ExcludeRule::from_value)
                .collect::<Result<_>>()?,
            Some(rule) => vec![ExcludeRule::from_value(rule)?],
        };
        spec.required_columns = match section.get("required_columns") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(cols)) => cols
                .iter()
                .map(|c| {
                    ColumnRef::from_value(c)?.index().ok_or_else(|| {
                        Error::InvalidConfig(format!("required column '{c}' must be an index"))
                    })
                })
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(Error::InvalidConfig(format!(
                    "'required_columns' must be a list, found {}",
                    kind_name(other)
                )));
            },
        };
        if let Some(policy) = get_string(section, "on_column_mismatch")? {
            spec.on_column_mismatch = match policy.trim().to_lowercase().as_str() {
                "fail" => ColumnMismatchPolicy::Fail,
                "skip" => ColumnMismatchPolicy::Skip,
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "unknown column mismatch policy '{other}'"
                    )));
                },
            };
        }
        spec.location = get_string(section, "location")?.filter(|l| !l.is_empty());

        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        match self.format {
            InputFormat::Tabular => {
                self.delimiter_byte()?;
            },
            InputFormat::Hierarchical => {
                let valid = !self.delimiter.is_empty()
                    && self
                        .delimiter
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
                if !valid {
                    return Err(Error::InvalidConfig(format!(
                        "'{}' is not a valid record element name",
                        self.delimiter
                    )));
                }
            },
        }
        Ok(())
    }

    /// Returns the tabular field delimiter as a single byte.
    ///
    /// The two-character escape `\t` is accepted for tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the delimiter is not one byte.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter == "\\t" {
            return Ok(b'\t');
        }
        single_byte("delimiter", &self.delimiter)
    }

    /// Returns the record element name of hierarchical sources.
    #[must_use]
    pub fn record_element(&self) -> &str {
        &self.delimiter
    }
}

fn single_byte(key: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] => Ok(*b),
        _ => Err(Error::InvalidConfig(format!(
            "'{key}' must be a single-byte character, found '{value}'"
        ))),
    }
}

fn to_usize(key: &str, value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::InvalidConfig(format!("'{key}' is too large")))
}
