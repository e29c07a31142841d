//! Core traits for record sources.
//!
//! Defines the [`RecordSource`] trait that format adapters implement and
//! the [`RawRecord`] they yield.

use crate::Result;
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// A node of an element's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Nested element.
    Element(XmlElement),
    /// Character data, entity references already resolved.
    Text(String),
}

/// One element of a hierarchical record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local element name.
    pub name: String,
    /// Attributes in document order.
    pub attributes: IndexMap<String, String>,
    /// Child elements and text in document order.
    pub content: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends text, merging it with a preceding text node.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.content.last_mut() {
            Some(XmlNode::Text(last)) => last.push_str(text),
            _ => self.content.push(XmlNode::Text(text.to_string())),
        }
    }

    /// Appends a child element.
    pub fn push_child(&mut self, child: Self) {
        self.content.push(XmlNode::Element(child));
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.content.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Returns `true` if the element carries no attributes, children or
    /// non-blank text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.content.iter().all(|node| match node {
                XmlNode::Text(text) => text.trim().is_empty(),
                XmlNode::Element(_) => false,
            })
    }

    /// Text content of the element and all its descendants, in document
    /// order.
    #[must_use]
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.content {
            match node {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(element) => element.collect_text(out),
            }
        }
    }

    /// First child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children().find(|c| c.name == name)
    }

    /// Resolves a path relative to this element.
    ///
    /// Supported forms: `.` (the element as XML), `@attr`, `child`,
    /// `child/grandchild` and `child/@attr`.
    #[must_use]
    pub fn select(&self, path: &str) -> Option<String> {
        let path = path.trim().trim_start_matches("./");
        if path == "." {
            return Some(self.to_xml());
        }
        let mut current = self;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            if let Some(attr) = segment.strip_prefix('@') {
                return if segments.peek().is_none() {
                    current.attributes.get(attr).cloned()
                } else {
                    None
                };
            }
            current = current.child(segment)?;
        }
        if std::ptr::eq(current, self) {
            return None;
        }
        Some(current.inner_text())
    }

    /// Serializes the element back to XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {key}=\"{}\"", quick_xml::escape::escape(value.as_str()));
        }
        if self.content.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.content {
            match node {
                XmlNode::Text(text) => out.push_str(&quick_xml::escape::escape(text.as_str())),
                XmlNode::Element(element) => element.write_xml(out),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

/// Format-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    /// Columns of a delimited text row.
    Tabular {
        /// Decoded column values.
        columns: Vec<String>,
        /// First header row, shared by all records of the source.
        headers: Arc<Vec<String>>,
    },
    /// A repeating XML element.
    Hierarchical(XmlElement),
}

/// A raw record, before field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based position in the source, counting data records only.
    pub serial: u64,
    /// Raw text of the record, for diagnostics.
    pub text: String,
    /// Format-specific payload.
    pub body: RecordBody,
}

impl RawRecord {
    /// Creates a tabular record without headers.
    #[must_use]
    pub fn tabular(serial: u64, columns: Vec<String>) -> Self {
        Self {
            serial,
            text: columns.join(","),
            body: RecordBody::Tabular {
                columns,
                headers: Arc::new(Vec::new()),
            },
        }
    }

    /// Value of a column by 0-based index.
    ///
    /// Columns of a hierarchical record are its child elements in order.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<String> {
        match &self.body {
            RecordBody::Tabular { columns, .. } => columns.get(index).cloned(),
            RecordBody::Hierarchical(element) => {
                element.children().nth(index).map(XmlElement::inner_text)
            },
        }
    }

    /// Value addressed by a header name or element path.
    #[must_use]
    pub fn select(&self, path: &str) -> Option<String> {
        match &self.body {
            RecordBody::Tabular { columns, headers } => headers
                .iter()
                .position(|h| h.trim() == path.trim())
                .and_then(|i| columns.get(i).cloned()),
            RecordBody::Hierarchical(element) => element.select(path),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        match &self.body {
            RecordBody::Tabular { columns, .. } => columns.len(),
            RecordBody::Hierarchical(element) => element.children().count(),
        }
    }
}

/// Positional stream of raw records.
///
/// Implementations own their file handles, so dropping the source closes
/// them on every exit path.
///
/// # Streaming
///
/// Records are read incrementally; neither [`count`](Self::count) nor
/// [`seek_to`](Self::seek_to) loads the whole input into memory.
pub trait RecordSource {
    /// Display name of the source.
    fn name(&self) -> &str;

    /// Counts the data records of the whole input.
    ///
    /// Independent of the read position.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the input cannot be read or parsed.
    fn count(&mut self) -> Result<u64>;

    /// Restarts the stream and skips the first `records` data records.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the input cannot be read or parsed.
    fn seek_to(&mut self, records: u64) -> Result<()>;

    /// Returns the next record, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Per-record problems are returned as [`crate::Error::Record`] after
    /// the record was consumed; everything else is fatal.
    fn next_record(&mut self) -> Result<Option<RawRecord>>;
}
