//! XML element-stream record source.
//!
//! Streams over a repeating record element with the `quick-xml` pull
//! parser. Each matching element, wherever it appears outside another
//! record, becomes one record; its descendants are consumed as part of it.
//! The document type declaration is ignored and entity references other
//! than the XML built-ins are kept literally. Text is kept untrimmed and in
//! document order, so mixed content reads as written.

use crate::io::locator::{Resource, SourceInput};
use crate::io::traits::{RawRecord, RecordBody, RecordSource, XmlElement};
use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use std::io::BufRead;

/// Pulls record elements out of an XML document.
struct ElementStream {
    reader: Reader<Box<dyn BufRead + Send>>,
    buf: Vec<u8>,
    element: String,
}

impl ElementStream {
    fn open(input: &SourceInput, element: &str) -> Result<Self> {
        let reader = Reader::from_reader(input.open()?);
        Ok(Self {
            reader,
            buf: Vec::with_capacity(8192),
            element: element.to_string(),
        })
    }

    /// Returns the next non-empty record element.
    fn next_element(&mut self) -> std::result::Result<Option<XmlElement>, String> {
        let mut stack: Vec<XmlElement> = Vec::new();
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(format!(
                        "malformed XML near byte {}: {e}",
                        self.reader.buffer_position()
                    ));
                },
            };

            match event {
                Event::Start(ref start) => {
                    if !stack.is_empty() || local_name(start) == self.element {
                        stack.push(element_from(start)?);
                    }
                },
                Event::Empty(ref start) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(element_from(start)?);
                    } else if local_name(start) == self.element {
                        let record = element_from(start)?;
                        if !record.is_empty() {
                            return Ok(Some(record));
                        }
                    }
                },
                Event::Text(ref text) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&text_of(text));
                    }
                },
                Event::CData(ref data) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&String::from_utf8_lossy(data));
                    }
                },
                Event::End(_) => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.push_child(done),
                            None if done.is_empty() => {},
                            None => return Ok(Some(done)),
                        }
                    }
                },
                Event::Eof => {
                    if let Some(open) = stack.first() {
                        return Err(format!(
                            "document ends inside <{}> element",
                            open.name
                        ));
                    }
                    return Ok(None);
                },
                _ => {},
            }
        }
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn element_from(start: &BytesStart<'_>) -> std::result::Result<XmlElement, String> {
    let mut element = XmlElement::new(local_name(start));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("malformed attribute: {e}"))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = unescape_lenient(&String::from_utf8_lossy(&attr.value));
        element.attributes.insert(key, value);
    }
    Ok(element)
}

fn text_of(text: &BytesText<'_>) -> String {
    unescape_lenient(&String::from_utf8_lossy(text))
}

/// Replaces the predefined entities and character references.
///
/// Any other entity reference is kept as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let resolved = tail.find(';').and_then(|end| {
            let replacement = match &tail[1..end] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                name => name.strip_prefix('#').and_then(|code| {
                    code.strip_prefix('x')
                        .map_or_else(|| code.parse().ok(), |hex| u32::from_str_radix(hex, 16).ok())
                        .and_then(char::from_u32)
                }),
            };
            replacement.map(|c| (c, end))
        });
        match resolved {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

/// Record source over repeating XML elements.
pub struct HierarchicalSource {
    name: String,
    input: SourceInput,
    element: String,
    stream: Option<ElementStream>,
    serial: u64,
}

impl HierarchicalSource {
    /// Creates a source yielding every `element` of the resource.
    #[must_use]
    pub fn new(resource: &Resource, element: impl Into<String>) -> Self {
        Self {
            name: resource.name.clone(),
            input: resource.input.clone(),
            element: element.into(),
            stream: None,
            serial: 0,
        }
    }

    fn restart(&mut self) -> Result<()> {
        self.stream = Some(ElementStream::open(&self.input, &self.element)?);
        self.serial = 0;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<XmlElement>> {
        if self.stream.is_none() {
            self.restart()?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        stream
            .next_element()
            .map_err(|message| Error::in_source(&self.name, message))
    }
}

impl RecordSource for HierarchicalSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&mut self) -> Result<u64> {
        let mut stream = ElementStream::open(&self.input, &self.element)?;
        let mut records = 0;
        while stream
            .next_element()
            .map_err(|message| Error::in_source(&self.name, message))?
            .is_some()
        {
            records += 1;
        }
        Ok(records)
    }

    fn seek_to(&mut self, records: u64) -> Result<()> {
        self.restart()?;
        while self.serial < records && self.pull()?.is_some() {
            self.serial += 1;
        }
        tracing::debug!(source = %self.name, skipped = self.serial, "Seeked XML source");
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let Some(element) = self.pull()? else {
            return Ok(None);
        };
        self.serial += 1;
        Ok(Some(RawRecord {
            serial: self.serial,
            text: element.to_xml(),
            body: RecordBody::Hierarchical(element),
        }))
    }
}
