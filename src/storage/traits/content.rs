//! Content store trait.

use crate::Result;
use crate::models::{EntityId, FieldConfig, FieldValue};

/// Characters that force a selector value to be quoted.
const SELECTOR_SPECIAL: &[char] = &[',', '|', '=', '<', '>', '!', '%', '*', '~', '^', '$', '"', '\''];

/// Escapes a literal for use as a selector value.
///
/// Plain values pass unchanged. Values containing selector operators,
/// separators or surrounding whitespace are wrapped in double quotes, with
/// embedded double quotes and backslashes escaped by a backslash. The empty
/// string becomes `""`.
#[must_use]
pub fn escape_selector_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(SELECTOR_SPECIAL)
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if !needs_quotes {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// The external content store that imported entities live in.
///
/// The pipeline treats selectors as opaque strings; only the store
/// interprets them. Every dataset operation is scoped by the selector
/// clauses `parent=<id>` and `template=<kind>`.
///
/// Implementations use interior mutability so a store can be shared by the
/// pipeline, the selector builder and the resource locator.
pub trait ContentStore: Send + Sync {
    /// Returns the first entity matching the selector.
    fn find_one(&self, selector: &str) -> Result<Option<EntityId>>;

    /// Returns every entity matching the selector, in store order.
    fn find_many(&self, selector: &str) -> Result<Vec<EntityId>>;

    /// Counts the entities matching the selector.
    fn count(&self, selector: &str) -> Result<u64> {
        Ok(self.find_many(selector)?.len() as u64)
    }

    /// Creates an unsaved entity of the given kind under the parent.
    fn create_entity(&self, parent: EntityId, kind: &str) -> Result<EntityId>;

    /// Reads a field of an entity; `None` if unset.
    fn get_field(&self, entity: EntityId, name: &str) -> Result<Option<FieldValue>>;

    /// Sets a field of an entity.
    ///
    /// Fails with a target error if the field is not part of the entity's kind.
    fn set_field(&self, entity: EntityId, name: &str, value: FieldValue) -> Result<()>;

    /// Persists an entity.
    fn save(&self, entity: EntityId) -> Result<()>;

    /// Deletes an entity, with its descendants when `recursive` is set.
    fn delete(&self, entity: EntityId, recursive: bool) -> Result<()>;

    /// Returns the configuration of a field of the kind, `None` if the kind
    /// has no such field.
    fn field_config(&self, kind: &str, name: &str) -> Result<Option<FieldConfig>>;

    /// Escapes a literal for substitution into a selector.
    fn escape_value(&self, value: &str) -> String {
        escape_selector_value(value)
    }

    /// Makes pending changes durable.
    ///
    /// Called before every progress checkpoint.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
