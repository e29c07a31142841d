//! Selector query language of the bundled stores.
//!
//! A selector is a comma separated list of clauses, all of which must match:
//!
//! | Clause | Matches |
//! |--------|---------|
//! | `title=Alice` | field equals value (any member for lists) |
//! | `title!=Alice` | field differs from value |
//! | `title%=ali` | field contains value, case-insensitive |
//! | `title\|alias=Alice` | any of the fields matches |
//! | `title=""` | field is unset or empty |
//! | `id=5`, `parent=1`, `has_parent=1`, `template=book` | entity attributes |
//! | `include=all`, `check_access=0`, `sort=...`, `limit=...` | accepted and ignored |
//!
//! Values may be wrapped in double or single quotes to include commas and
//! operators; inside quotes a backslash escapes the next character.

use crate::models::{EntityId, FieldValue};
use crate::{Error, Result};

/// Comparison operator of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `%=`
    Contains,
}

/// One parsed selector clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Entity identifier.
    Id(Operator, String),
    /// Direct parent.
    Parent(Operator, String),
    /// Any ancestor.
    HasParent(String),
    /// Entity kind.
    Template(Operator, String),
    /// Field comparison over one or more alternative fields.
    Field {
        /// Alternative field names.
        names: Vec<String>,
        /// Operator.
        op: Operator,
        /// Unquoted value.
        value: String,
    },
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    /// Clauses that must all match.
    pub clauses: Vec<Clause>,
}

/// Entity view the query is evaluated against.
pub trait Candidate {
    /// Entity identifier.
    fn id(&self) -> EntityId;
    /// Kind of the entity.
    fn kind(&self) -> &str;
    /// Direct parent.
    fn parent(&self) -> Option<EntityId>;
    /// Returns `true` if `ancestor` is a parent, grandparent, etc.
    fn has_ancestor(&self, ancestor: EntityId) -> bool;
    /// Field value.
    fn field(&self, name: &str) -> Option<&FieldValue>;
}

impl Query {
    /// Parses a selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Target`] for clauses without an operator or with an
    /// empty field name.
    pub fn parse(selector: &str) -> Result<Self> {
        let clauses = split_outside_quotes(selector, ',')
            .into_iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(parse_clause)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        Ok(Self { clauses })
    }

    /// Returns `true` if the candidate matches every clause.
    pub fn matches<C: Candidate>(&self, candidate: &C) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Id(op, value) => compare(*op, &[candidate.id().to_string()], value),
            Clause::Parent(op, value) => compare(
                *op,
                &candidate.parent().map(|p| p.to_string()).into_iter().collect::<Vec<_>>(),
                value,
            ),
            Clause::HasParent(value) => value
                .parse::<EntityId>()
                .is_ok_and(|ancestor| candidate.has_ancestor(ancestor)),
            Clause::Template(op, value) => compare(*op, &[candidate.kind().to_string()], value),
            Clause::Field { names, op, value } => {
                let any = |predicate: &dyn Fn(&[String]) -> bool| {
                    names.iter().any(|name| {
                        let members = candidate
                            .field(name)
                            .map(FieldValue::members)
                            .unwrap_or_default();
                        predicate(&members)
                    })
                };
                match op {
                    Operator::NotEquals => !any(&|m| compare(Operator::Equals, m, value)),
                    _ => any(&|m| compare(*op, m, value)),
                }
            },
        })
    }
}

fn parse_clause(text: &str) -> Result<Option<Clause>> {
    let Some(eq) = find_outside_quotes(text, '=') else {
        return Err(Error::target(
            "parse_selector",
            format!("clause '{text}' has no operator"),
        ));
    };
    let (left, op) = match text[..eq].chars().last() {
        Some('!') => (&text[..eq - 1], Operator::NotEquals),
        Some('%') => (&text[..eq - 1], Operator::Contains),
        _ => (&text[..eq], Operator::Equals),
    };
    let key = left.trim();
    let value = unquote(text[eq + 1..].trim());
    if key.is_empty() {
        return Err(Error::target(
            "parse_selector",
            format!("clause '{text}' has no field"),
        ));
    }

    let clause = match key {
        "id" => Clause::Id(op, value),
        "parent" | "parent_id" => Clause::Parent(op, value),
        "has_parent" => Clause::HasParent(value),
        "template" | "kind" => Clause::Template(op, value),
        "include" | "check_access" | "sort" | "limit" => return Ok(None),
        _ => Clause::Field {
            names: key.split('|').map(|n| n.trim().to_string()).collect(),
            op,
            value,
        },
    };
    Ok(Some(clause))
}

fn compare(op: Operator, members: &[String], value: &str) -> bool {
    match op {
        Operator::Equals if value.is_empty() => members.iter().all(String::is_empty),
        Operator::Equals => members.iter().any(|m| m == value),
        Operator::NotEquals => !compare(Operator::Equals, members, value),
        Operator::Contains => {
            let needle = value.to_lowercase();
            members.iter().any(|m| m.to_lowercase().contains(&needle))
        },
    }
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        let mut unescaped = String::with_capacity(value.len() - 2);
        let mut chars = value[1..value.len() - 1].chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => unescaped.extend(chars.next()),
                c => unescaped.push(c),
            }
        }
        return unescaped;
    }
    value.to_string()
}

/// Position of `needle` outside quoted values; a backslash inside quotes
/// escapes the next character.
fn find_outside_quotes(text: &str, needle: char) -> Option<usize> {
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, c) if c == needle => return Some(i),
            _ => {},
        }
    }
    None
}

fn split_outside_quotes(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(pos) = find_outside_quotes(rest, separator) {
        parts.push(&rest[..pos]);
        rest = &rest[pos + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}
