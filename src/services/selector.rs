//! Selector templates and the selector builder.
//!
//! A selector template such as `isbn=@isbn, author=@author` is tokenized once
//! into literals and `@field` placeholders. Building a selector substitutes
//! every placeholder in a single pass, so a value that itself contains
//! placeholder text is never rescanned.
//!
//! Reference-typed fields are resolved first: the mapped value is looked up
//! with a secondary selector built from the field's own configuration and
//! replaced by the identifier of the matching entity.

use crate::config::TargetSpec;
use crate::models::{EntityId, FieldData, FieldKind, FieldValue, ReferenceConfig};
use crate::services::journal::Journal;
use crate::storage::ContentStore;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Placeholder syntax: `@` followed by a field name.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap_or_else(|_| unreachable!())
});

/// Search field used by reference lookups that configure none.
const DEFAULT_SEARCH_FIELD: &str = "title";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Placeholder(String),
}

/// A tokenized selector template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorTemplate {
    source: String,
    tokens: Vec<Token>,
}

impl SelectorTemplate {
    /// Tokenizes a template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if an `@` is not followed by a field
    /// name.
    pub fn parse(source: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_literal(&mut tokens, &source[last..whole.start()])?;
            tokens.push(Token::Placeholder(name.as_str().to_string()));
            last = whole.end();
        }
        push_literal(&mut tokens, &source[last..])?;

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// The `title=@title` template.
    #[must_use]
    pub fn default_title() -> Self {
        Self {
            source: "title=@title".to_string(),
            tokens: vec![
                Token::Literal("title=".to_string()),
                Token::Placeholder("title".to_string()),
            ],
        }
    }

    /// Returns the template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Iterates over placeholder field names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Placeholder(name) => Some(name.as_str()),
            Token::Literal(_) => None,
        })
    }

    /// Returns `true` if the field appears as a placeholder.
    #[must_use]
    pub fn uses(&self, field: &str) -> bool {
        self.placeholders().any(|p| p == field)
    }

    /// Substitutes placeholders in one pass.
    ///
    /// `value` returns the already escaped literal of a field, or `None` if
    /// the field has no value.
    ///
    /// # Errors
    ///
    /// Returns the name of the first placeholder without a value.
    pub fn instantiate<F>(&self, mut value: F) -> std::result::Result<String, String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Placeholder(name) => match value(name) {
                    Some(v) => out.push_str(&v),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Display for SelectorTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn push_literal(tokens: &mut Vec<Token>, text: &str) -> Result<()> {
    if text.contains('@') {
        return Err(Error::InvalidConfig(format!(
            "selector template has an '@' without a field name near '{text}'"
        )));
    }
    if !text.is_empty() {
        tokens.push(Token::Literal(text.to_string()));
    }
    Ok(())
}

/// A selector instantiated for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSelector {
    /// The instantiated template, as configured.
    pub instance: String,
    /// The instance scoped to the dataset parent and target kind.
    pub query: String,
}

/// Builds record selectors against a content store.
pub struct SelectorBuilder<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    parent: EntityId,
}

impl<'a, S: ContentStore + ?Sized> SelectorBuilder<'a, S> {
    /// Creates a builder scoped to the dataset parent.
    pub const fn new(store: &'a S, parent: EntityId) -> Self {
        Self { store, parent }
    }

    /// Resolves reference fields and instantiates the target's selector.
    ///
    /// Resolved reference fields are replaced in `data` by the identifiers
    /// of the referenced entities. Unresolved optional references are
    /// removed from `data` and their placeholders match the empty value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Record`] if a required reference cannot be resolved
    /// or a placeholder has no value. Store failures are propagated.
    pub fn build(
        &self,
        target: &TargetSpec,
        data: &mut FieldData,
        record: u64,
        journal: &mut Journal,
    ) -> Result<BuiltSelector> {
        let cleared = self.resolve_references(target, data, record, journal)?;

        let instance = target
            .selector
            .instantiate(|field| {
                if cleared.contains(field) {
                    return Some(self.store.escape_value(""));
                }
                data.get(field)
                    .and_then(FieldValue::selector_scalar)
                    .map(|v| self.store.escape_value(&v))
            })
            .map_err(|field| {
                Error::record(record, format!("selector placeholder '@{field}' has no value"))
            })?;

        let query = format!(
            "parent={}, template={}, {instance}",
            self.parent,
            self.store.escape_value(&target.template)
        );
        Ok(BuiltSelector { instance, query })
    }

    fn resolve_references(
        &self,
        target: &TargetSpec,
        data: &mut FieldData,
        record: u64,
        journal: &mut Journal,
    ) -> Result<HashSet<String>> {
        let mut cleared = HashSet::new();
        let fields: Vec<String> = data.keys().cloned().collect();

        for field in fields {
            let Some(config) = self.store.field_config(&target.template, &field)? else {
                continue;
            };
            let FieldKind::Reference(reference) = &config.kind else {
                continue;
            };
            let Some(value) = data.get(&field) else {
                continue;
            };

            let mut ids = Vec::new();
            for member in value.members() {
                let selector = self.reference_selector(reference, &member);
                match self.store.find_one(&selector)? {
                    Some(id) => ids.push(id),
                    None => journal.warn(format!(
                        "record {record}: no entity for '{member}' referenced by field '{field}'"
                    )),
                }
            }

            if ids.is_empty() {
                if config.required || target.is_required(&field) {
                    return Err(Error::record(
                        record,
                        format!("required reference field '{field}' could not be resolved"),
                    ));
                }
                journal.warn(format!(
                    "record {record}: clearing unresolved reference field '{field}'"
                ));
                data.shift_remove(&field);
                cleared.insert(field);
            } else {
                data.insert(field, FieldValue::References(ids));
            }
        }

        Ok(cleared)
    }

    /// Builds the lookup selector of a reference field for one value.
    #[must_use]
    pub fn reference_selector(&self, reference: &ReferenceConfig, value: &str) -> String {
        let mut clauses: Vec<String> = Vec::new();
        if let Some(base) = reference.selector.as_deref().filter(|s| !s.is_empty()) {
            clauses.push(base.to_string());
        }
        if let Some(template) = reference.template.as_deref().filter(|s| !s.is_empty()) {
            clauses.push(format!("template={}", self.store.escape_value(template)));
        }
        if let Some(parent) = reference.parent {
            if clauses.is_empty() {
                clauses.push(format!("parent={parent}"));
            } else {
                clauses.push(format!("has_parent={parent}"));
            }
        }
        let search = if reference.search_fields.is_empty() {
            DEFAULT_SEARCH_FIELD.to_string()
        } else {
            reference.search_fields.join("|")
        };
        clauses.push(format!("{search}={}", self.store.escape_value(value)));
        clauses.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldConfig;
    use crate::storage::InMemoryContentStore;

    #[test]
    fn test_parse_tokens() {
        let template = SelectorTemplate::parse("isbn=@isbn, author=@author_name").ok();
        let template = template.unwrap_or_else(SelectorTemplate::default_title);
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec!["isbn", "author_name"]
        );
        assert!(template.uses("isbn"));
        assert!(!template.uses("title"));
    }

    #[test]
    fn test_parse_rejects_dangling_at() {
        assert!(matches!(
            SelectorTemplate::parse("title=@"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SelectorTemplate::parse("title=@ x"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_instantiate_is_single_pass() {
        let template = SelectorTemplate::parse("a=@a, b=@b").unwrap_or_else(|_| SelectorTemplate::default_title());
        let out = template.instantiate(|f| match f {
            "a" => Some("@b".to_string()),
            "b" => Some("two".to_string()),
            _ => None,
        });
        assert_eq!(out.ok().as_deref(), Some("a=@b, b=two"));
    }

    #[test]
    fn test_instantiate_reports_missing_field() {
        let template = SelectorTemplate::default_title();
        assert_eq!(template.instantiate(|_| None), Err("title".to_string()));
    }

    #[test]
    fn test_build_scopes_and_escapes() {
        let store = InMemoryContentStore::new();
        let parent = store.root();
        let builder = SelectorBuilder::new(&store, parent);
        let target = TargetSpec::default();
        let mut data = FieldData::new();
        data.insert("title".to_string(), FieldValue::text("Smith, John"));
        let mut journal = Journal::new();

        let built = builder.build(&target, &mut data, 1, &mut journal);
        let built = built.unwrap_or_else(|_| BuiltSelector {
            instance: String::new(),
            query: String::new(),
        });
        assert_eq!(built.instance, "title=\"Smith, John\"");
        assert_eq!(
            built.query,
            format!("parent={parent}, template=basic-page, title=\"Smith, John\"")
        );
    }

    #[test]
    fn test_build_missing_placeholder_is_record_error() {
        let store = InMemoryContentStore::new();
        let builder = SelectorBuilder::new(&store, store.root());
        let mut data = FieldData::new();
        let mut journal = Journal::new();
        let err = builder.build(&TargetSpec::default(), &mut data, 4, &mut journal);
        assert!(matches!(err, Err(Error::Record { record: 4, .. })));
    }

    fn store_with_authors() -> (InMemoryContentStore, EntityId) {
        let store = InMemoryContentStore::new();
        let authors = store
            .insert_entity(store.root(), "folder", &[("title", "Authors")])
            .unwrap_or(store.root());
        store
            .insert_entity(authors, "author", &[("title", "Ada Lovelace")])
            .ok();
        store.define_field(
            "book",
            FieldConfig::new(
                "author",
                FieldKind::Reference(ReferenceConfig {
                    template: Some("author".to_string()),
                    parent: Some(authors),
                    ..ReferenceConfig::default()
                }),
            ),
        );
        (store, authors)
    }

    #[test]
    fn test_reference_resolution() {
        let (store, _) = store_with_authors();
        let builder = SelectorBuilder::new(&store, store.root());
        let target = TargetSpec {
            template: "book".to_string(),
            selector: SelectorTemplate::parse("author=@author")
                .unwrap_or_else(|_| SelectorTemplate::default_title()),
            ..TargetSpec::default()
        };
        let mut data = FieldData::new();
        data.insert("author".to_string(), FieldValue::text("Ada Lovelace"));
        let mut journal = Journal::new();

        let built = builder.build(&target, &mut data, 1, &mut journal);
        assert!(built.is_ok());
        let Some(FieldValue::References(ids)) = data.get("author") else {
            unreachable!("author must be resolved");
        };
        assert_eq!(ids.len(), 1);
        assert!(built.is_ok_and(|b| b.instance == format!("author={}", ids[0])));
    }

    #[test]
    fn test_unresolved_optional_reference_is_cleared() {
        let (store, _) = store_with_authors();
        let builder = SelectorBuilder::new(&store, store.root());
        let target = TargetSpec {
            template: "book".to_string(),
            selector: SelectorTemplate::parse("author=@author")
                .unwrap_or_else(|_| SelectorTemplate::default_title()),
            ..TargetSpec::default()
        };
        let mut data = FieldData::new();
        data.insert("author".to_string(), FieldValue::text("Nobody"));
        let mut journal = Journal::new();

        let built = builder.build(&target, &mut data, 2, &mut journal);
        assert!(built.is_ok_and(|b| b.instance == "author=\"\""));
        assert!(!data.contains_key("author"));
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_unresolved_required_reference_fails_record() {
        let (store, _) = store_with_authors();
        let builder = SelectorBuilder::new(&store, store.root());
        let target = TargetSpec {
            template: "book".to_string(),
            required_fields: vec!["author".to_string()],
            ..TargetSpec::default()
        };
        let mut data = FieldData::new();
        data.insert("title".to_string(), FieldValue::text("Notes"));
        data.insert("author".to_string(), FieldValue::text("Nobody"));
        let mut journal = Journal::new();

        let err = builder.build(&target, &mut data, 3, &mut journal);
        assert!(matches!(err, Err(Error::Record { record: 3, .. })));
    }

    #[test]
    fn test_reference_selector_shapes() {
        let store = InMemoryContentStore::new();
        let builder = SelectorBuilder::new(&store, store.root());
        let alone = ReferenceConfig {
            parent: Some(EntityId::new(9)),
            ..ReferenceConfig::default()
        };
        assert_eq!(builder.reference_selector(&alone, "Ada"), "parent=9, title=Ada");

        let scoped = ReferenceConfig {
            selector: Some("status=active".to_string()),
            template: Some("author".to_string()),
            search_fields: vec!["title".to_string(), "alias".to_string()],
            parent: Some(EntityId::new(9)),
        };
        assert_eq!(
            builder.reference_selector(&scoped, "Ada"),
            "status=active, template=author, has_parent=9, title|alias=Ada"
        );
    }
}
