//! Upsert driver.
//!
//! Decides, per record, whether the entity matched by the record's selector
//! is created, updated, deleted or left alone, and writes the field values.
//!
//! | Match | Tags | Outcome |
//! |-------|------|---------|
//! | none | `import` | create |
//! | none | no `import` | skipped, warning |
//! | one | `delete` | delete (recursive) |
//! | one | `merge`/`update` or `overwrite` | update |
//! | one | neither | skipped, warning |

use crate::config::{OperationTag, OperationTags, TargetSpec};
use crate::models::{EntityId, FieldConfig, FieldData, FieldKind, FieldValue, SkipReason, UpsertOutcome};
use crate::services::journal::Journal;
use crate::services::selector::BuiltSelector;
use crate::storage::ContentStore;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};

/// Converts a mapped value to the representation the field kind stores.
///
/// # Errors
///
/// Returns a description of the problem when the value does not fit the
/// field kind.
pub fn convert_value(config: &FieldConfig, value: &FieldValue) -> std::result::Result<FieldValue, String> {
    match &config.kind {
        FieldKind::Text | FieldKind::Reference(_) => Ok(value.clone()),
        FieldKind::Datetime { format } => {
            for member in value.members() {
                let valid = NaiveDate::parse_from_str(&member, format).is_ok()
                    || NaiveDateTime::parse_from_str(&member, format).is_ok();
                if !valid {
                    return Err(format!("'{member}' does not match date format '{format}'"));
                }
            }
            Ok(value.clone())
        },
        FieldKind::Options { options } => {
            let ids: Vec<String> = value
                .members()
                .into_iter()
                .map(|member| {
                    options
                        .iter()
                        .find(|o| o.value == member || o.title == member)
                        .map_or(member, |o| o.id.to_string())
                })
                .collect();
            Ok(match ids.as_slice() {
                [single] if !value.is_multi() => FieldValue::Text(single.clone()),
                _ => FieldValue::List(ids),
            })
        },
        FieldKind::File { max_files } => {
            let mut files = value.members();
            if *max_files == 1 {
                return files
                    .into_iter()
                    .next()
                    .map(FieldValue::Text)
                    .ok_or_else(|| "no file name".to_string());
            }
            if *max_files > 1 {
                files.truncate(*max_files);
            }
            Ok(FieldValue::List(files))
        },
    }
}

/// Appends the members of `incoming` that `existing` lacks.
///
/// Returns `None` when nothing is new.
fn append_members(existing: &FieldValue, incoming: &FieldValue) -> Option<FieldValue> {
    match (existing, incoming) {
        (FieldValue::References(have), FieldValue::References(new)) => {
            let added: Vec<EntityId> = new.iter().filter(|id| !have.contains(id)).copied().collect();
            (!added.is_empty()).then(|| FieldValue::References([have.clone(), added].concat()))
        },
        _ => {
            let have = existing.members();
            let added: Vec<String> = incoming
                .members()
                .into_iter()
                .filter(|m| !have.contains(m))
                .collect();
            (!added.is_empty()).then(|| FieldValue::List([have, added].concat()))
        },
    }
}

/// Applies records to the content store.
pub struct UpsertDriver<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    parent: EntityId,
    target: &'a TargetSpec,
}

impl<'a, S: ContentStore + ?Sized> UpsertDriver<'a, S> {
    /// Creates a driver creating entities below `parent`.
    pub const fn new(store: &'a S, parent: EntityId, target: &'a TargetSpec) -> Self {
        Self {
            store,
            parent,
            target,
        }
    }

    /// Creates, updates, deletes or skips the entity matched by `selector`.
    ///
    /// Never returns an error: problems are reported as
    /// [`UpsertOutcome::Failed`] and as journal lines.
    pub fn apply(
        &self,
        record: u64,
        selector: &BuiltSelector,
        data: &FieldData,
        tags: &OperationTags,
        journal: &mut Journal,
    ) -> UpsertOutcome {
        let instance = selector.instance.trim();
        if instance.chars().count() < 2 || !instance.contains('=') {
            return UpsertOutcome::Failed(Error::record(
                record,
                format!("selector '{instance}' is not usable"),
            ));
        }

        let found = match self.store.find_one(&selector.query) {
            Ok(found) => found,
            Err(e) => return UpsertOutcome::Failed(e),
        };

        match found {
            None if tags.contains(OperationTag::Import) => self.create(record, data, journal),
            None => {
                journal.warn(format!(
                    "record {record}: {instance}: {}",
                    SkipReason::NoMatch
                ));
                UpsertOutcome::Skipped(SkipReason::NoMatch)
            },
            Some(id) if tags.contains(OperationTag::Delete) => match self.store.delete(id, true) {
                Ok(()) => {
                    tracing::debug!(record, entity = %id, "Deleted entity");
                    UpsertOutcome::Deleted(id)
                },
                Err(e) => UpsertOutcome::Failed(e),
            },
            Some(id) if tags.allows_update() => self.update(record, id, data, tags, journal),
            Some(id) => {
                journal.warn(format!(
                    "record {record}: {instance} (entity {id}): {}",
                    SkipReason::ExistsNoMerge
                ));
                UpsertOutcome::Skipped(SkipReason::ExistsNoMerge)
            },
        }
    }

    fn is_required(&self, config: &FieldConfig) -> bool {
        config.required || self.target.is_required(&config.name)
    }

    fn field_configs(&self, data: &FieldData) -> Result<Vec<(FieldConfig, FieldValue)>> {
        let mut configs = Vec::with_capacity(data.len());
        let mut unknown = Vec::new();
        for (name, value) in data {
            match self.store.field_config(&self.target.template, name)? {
                Some(config) => configs.push((config, value.clone())),
                None => unknown.push(name.as_str()),
            }
        }
        if !unknown.is_empty() {
            return Err(Error::target(
                "map_fields",
                format!(
                    "template '{}' has no field(s) {}",
                    self.target.template,
                    unknown.join(", ")
                ),
            ));
        }
        Ok(configs)
    }

    fn create(&self, record: u64, data: &FieldData, journal: &mut Journal) -> UpsertOutcome {
        if !data.get("title").is_some_and(|title| !title.is_empty()) {
            return UpsertOutcome::Failed(Error::record(
                record,
                "cannot create an entity without a title",
            ));
        }
        let fields = match self.field_configs(data) {
            Ok(fields) => fields,
            Err(e) => return UpsertOutcome::Failed(e),
        };
        let id = match self.store.create_entity(self.parent, &self.target.template) {
            Ok(id) => id,
            Err(e) => return UpsertOutcome::Failed(e),
        };

        let (title, rest): (Vec<_>, Vec<_>) = fields.into_iter().partition(|(c, _)| c.name == "title");
        let phases = [title, rest];
        for (phase, fields) in phases.iter().enumerate() {
            for (config, value) in fields {
                let written = convert_value(config, value)
                    .map_err(|e| Error::target("convert_field", e))
                    .and_then(|v| self.store.set_field(id, &config.name, v));
                match written {
                    Ok(()) => {},
                    Err(e) if self.is_required(config) => {
                        return self.rollback(record, id, &config.name, e, journal);
                    },
                    Err(e) => journal.warn(format!(
                        "record {record}: field '{}' skipped: {e}",
                        config.name
                    )),
                }
            }
            if let Err(e) = self.store.save(id) {
                let stage = if phase == 0 { "title" } else { "fields" };
                return self.rollback(record, id, stage, e, journal);
            }
        }

        tracing::debug!(record, entity = %id, "Created entity");
        UpsertOutcome::Created(id)
    }

    fn rollback(
        &self,
        record: u64,
        id: EntityId,
        field: &str,
        cause: Error,
        journal: &mut Journal,
    ) -> UpsertOutcome {
        if let Err(e) = self.store.delete(id, true) {
            journal.error(format!(
                "record {record}: could not remove incomplete entity {id}: {e}"
            ));
        }
        UpsertOutcome::Failed(Error::target(
            "create",
            format!("field '{field}': {cause}"),
        ))
    }

    fn update(
        &self,
        record: u64,
        id: EntityId,
        data: &FieldData,
        tags: &OperationTags,
        journal: &mut Journal,
    ) -> UpsertOutcome {
        let fields = match self.field_configs(data) {
            Ok(fields) => fields,
            Err(e) => return UpsertOutcome::Failed(e),
        };

        for (config, value) in &fields {
            match self.update_field(record, id, config, value, tags, journal) {
                Ok(()) => {},
                Err(e) if self.is_required(config) => {
                    return UpsertOutcome::Failed(Error::target(
                        "update",
                        format!("field '{}': {e}", config.name),
                    ));
                },
                Err(e) => journal.warn(format!(
                    "record {record}: field '{}' not updated: {e}",
                    config.name
                )),
            }
        }

        match self.store.save(id) {
            Ok(()) => {
                tracing::debug!(record, entity = %id, "Updated entity");
                UpsertOutcome::Updated(id)
            },
            Err(e) => UpsertOutcome::Failed(e),
        }
    }

    fn update_field(
        &self,
        record: u64,
        id: EntityId,
        config: &FieldConfig,
        value: &FieldValue,
        tags: &OperationTags,
        journal: &mut Journal,
    ) -> Result<()> {
        let value = convert_value(config, value).map_err(|e| Error::target("convert_field", e))?;
        if self.target.overwrites(tags, &config.name) {
            return self.store.set_field(id, &config.name, value);
        }

        let existing = self
            .store
            .get_field(id, &config.name)?
            .filter(|v| !v.is_empty());
        let Some(existing) = existing else {
            return self.store.set_field(id, &config.name, value);
        };

        if config.is_multi() || existing.is_multi() || value.is_multi() {
            if let Some(merged) = append_members(&existing, &value) {
                return self.store.set_field(id, &config.name, merged);
            }
            return Ok(());
        }

        if existing != value {
            journal.warn(format!(
                "record {record}: field '{}' of entity {id} keeps '{existing}', \
                 '{value}' needs the overwrite tag",
                config.name
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectOption;
    use crate::services::selector::{SelectorBuilder, SelectorTemplate};
    use crate::storage::InMemoryContentStore;

    fn data(pairs: &[(&str, FieldValue)]) -> FieldData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn run(
        store: &InMemoryContentStore,
        target: &TargetSpec,
        fields: &FieldData,
        tags: &str,
        journal: &mut Journal,
    ) -> UpsertOutcome {
        let mut fields = fields.clone();
        let selector = SelectorBuilder::new(store, store.root())
            .build(target, &mut fields, 1, journal)
            .expect("selector");
        let tags = OperationTags::parse(tags).expect("tags");
        UpsertDriver::new(store, store.root(), target).apply(1, &selector, &fields, &tags, journal)
    }

    #[test]
    fn test_create_then_skip_then_update() {
        let store = InMemoryContentStore::new();
        let target = TargetSpec::default();
        let fields = data(&[
            ("title", FieldValue::text("Alice")),
            ("city", FieldValue::text("Oslo")),
        ]);
        let mut journal = Journal::new();

        let created = run(&store, &target, &fields, "import", &mut journal);
        let Some(id) = created.entity() else {
            unreachable!("expected a created entity");
        };
        assert!(matches!(created, UpsertOutcome::Created(_)));

        let again = run(&store, &target, &fields, "import", &mut journal);
        assert!(matches!(again, UpsertOutcome::Skipped(SkipReason::ExistsNoMerge)));

        let moved = data(&[
            ("title", FieldValue::text("Alice")),
            ("city", FieldValue::text("Bergen")),
        ]);
        let merged = run(&store, &target, &moved, "merge", &mut journal);
        assert!(matches!(merged, UpsertOutcome::Updated(_)));
        assert_eq!(
            store.get_field(id, "city").expect("get"),
            Some(FieldValue::text("Oslo"))
        );
        assert!(journal.len() >= 2);

        let overwritten = run(&store, &target, &moved, "overwrite", &mut journal);
        assert!(matches!(overwritten, UpsertOutcome::Updated(_)));
        assert_eq!(
            store.get_field(id, "city").expect("get"),
            Some(FieldValue::text("Bergen"))
        );
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_no_match_without_import_tag() {
        let store = InMemoryContentStore::new();
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &TargetSpec::default(),
            &data(&[("title", FieldValue::text("Bob"))]),
            "merge",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Skipped(SkipReason::NoMatch)));
        assert_eq!(store.entity_count(), 0);
        let messages = journal.into_messages();
        assert!(messages[0].text.contains("no match, import tag absent"));
    }

    #[test]
    fn test_delete() {
        let store = InMemoryContentStore::new();
        store
            .insert_entity(store.root(), "basic-page", &[("title", "Bob")])
            .expect("insert");
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &TargetSpec::default(),
            &data(&[("title", FieldValue::text("Bob"))]),
            "delete",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Deleted(_)));
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn test_lists_are_appended_on_merge() {
        let store = InMemoryContentStore::new();
        let target = TargetSpec::default();
        let mut journal = Journal::new();
        let first = data(&[
            ("title", FieldValue::text("Ada")),
            ("tags", FieldValue::List(vec!["math".to_string()])),
        ]);
        let created = run(&store, &target, &first, "import", &mut journal);
        let id = created.entity().expect("created");

        let second = data(&[
            ("title", FieldValue::text("Ada")),
            ("tags", FieldValue::List(vec!["math".to_string(), "poetry".to_string()])),
        ]);
        run(&store, &target, &second, "merge", &mut journal);
        assert_eq!(
            store.get_field(id, "tags").expect("get"),
            Some(FieldValue::List(vec!["math".to_string(), "poetry".to_string()]))
        );
    }

    #[test]
    fn test_unknown_field_fails_create_without_leftovers() {
        let store = InMemoryContentStore::new();
        store.define_field("book", FieldConfig::text("isbn"));
        let target = TargetSpec {
            template: "book".to_string(),
            ..TargetSpec::default()
        };
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &target,
            &data(&[
                ("title", FieldValue::text("Dune")),
                ("color", FieldValue::text("red")),
            ]),
            "import",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Failed(Error::Target { .. })));
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn test_create_requires_a_title() {
        let store = InMemoryContentStore::new();
        let target = TargetSpec {
            template: "book".to_string(),
            selector: SelectorTemplate::parse("isbn=@isbn").expect("template"),
            ..TargetSpec::default()
        };
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &target,
            &data(&[("isbn", FieldValue::text("978-1"))]),
            "import",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Failed(Error::Record { record: 1, .. })));
        assert_eq!(store.entity_count(), 0);

        let outcome = run(
            &store,
            &target,
            &data(&[("title", FieldValue::text("")), ("isbn", FieldValue::text("978-1"))]),
            "import",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Failed(Error::Record { .. })));
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn test_required_conversion_failure_rolls_back() {
        let store = InMemoryContentStore::new();
        store.define_field(
            "event",
            FieldConfig::new(
                "date",
                FieldKind::Datetime {
                    format: "%Y-%m-%d".to_string(),
                },
            )
            .required(),
        );
        let target = TargetSpec {
            template: "event".to_string(),
            ..TargetSpec::default()
        };
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &target,
            &data(&[
                ("title", FieldValue::text("Launch")),
                ("date", FieldValue::text("tomorrow")),
            ]),
            "import",
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Failed(_)));
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn test_optional_conversion_failure_still_creates() {
        let store = InMemoryContentStore::new();
        store.define_field(
            "event",
            FieldConfig::new(
                "date",
                FieldKind::Datetime {
                    format: "%Y-%m-%d".to_string(),
                },
            ),
        );
        let target = TargetSpec {
            template: "event".to_string(),
            ..TargetSpec::default()
        };
        let mut journal = Journal::new();
        let outcome = run(
            &store,
            &target,
            &data(&[
                ("title", FieldValue::text("Launch")),
                ("date", FieldValue::text("tomorrow")),
            ]),
            "import",
            &mut journal,
        );
        let id = outcome.entity().expect("created");
        assert!(store.get_field(id, "date").expect("get").is_none());
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_unusable_selector() {
        let store = InMemoryContentStore::new();
        let target = TargetSpec::default();
        let selector = BuiltSelector {
            instance: "x".to_string(),
            query: "x".to_string(),
        };
        let mut journal = Journal::new();
        let outcome = UpsertDriver::new(&store, store.root(), &target).apply(
            3,
            &selector,
            &FieldData::new(),
            &OperationTags::parse("import").expect("tags"),
            &mut journal,
        );
        assert!(matches!(outcome, UpsertOutcome::Failed(Error::Record { record: 3, .. })));
    }

    #[test]
    fn test_convert_value() {
        let options = FieldConfig::new(
            "color",
            FieldKind::Options {
                options: vec![SelectOption {
                    id: 2,
                    value: "r".to_string(),
                    title: "Red".to_string(),
                }],
            },
        );
        assert_eq!(
            convert_value(&options, &FieldValue::text("Red")),
            Ok(FieldValue::text("2"))
        );
        assert_eq!(
            convert_value(&options, &FieldValue::text("Blue")),
            Ok(FieldValue::text("Blue"))
        );

        let single_file = FieldConfig::new("cover", FieldKind::File { max_files: 1 });
        assert_eq!(
            convert_value(
                &single_file,
                &FieldValue::List(vec!["a.png".to_string(), "b.png".to_string()])
            ),
            Ok(FieldValue::text("a.png"))
        );

        let stamp = FieldConfig::new(
            "at",
            FieldKind::Datetime {
                format: "%Y-%m-%d %H:%M".to_string(),
            },
        );
        assert!(convert_value(&stamp, &FieldValue::text("2024-05-01 10:30")).is_ok());
        assert!(convert_value(&stamp, &FieldValue::text("2024-05-01")).is_err());
    }
}
