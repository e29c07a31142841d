//! In-memory content store.
//!
//! Provides a fast, non-persistent implementation of [`ContentStore`] for
//! tests, dry runs and as the engine behind the JSON file store.
//!
//! Entities form a tree below a root entity. Kinds are schema-less until a
//! field is defined for them; from then on only defined fields (plus
//! `title`) may be set.

use super::query::{Candidate, Query};
use super::traits::ContentStore;
use crate::models::{EntityId, FieldConfig, FieldValue};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Identifier of the root entity.
pub const ROOT_ID: EntityId = EntityId::new(1);

/// A stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Identifier.
    pub id: EntityId,
    /// Parent, `None` for the root.
    pub parent: Option<EntityId>,
    /// Kind.
    pub kind: String,
    /// Field values.
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,
    /// Set once the entity has been saved; unsaved entities are not found.
    #[serde(default)]
    pub saved: bool,
}

/// Serializable state of a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Next identifier to hand out.
    pub next_id: u64,
    /// Entities in identifier order.
    pub entities: Vec<StoredEntity>,
    /// Field definitions per kind.
    #[serde(default)]
    pub templates: BTreeMap<String, Vec<FieldConfig>>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    entities: BTreeMap<EntityId, StoredEntity>,
    templates: HashMap<String, IndexMap<String, FieldConfig>>,
}

impl Default for State {
    fn default() -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(
            ROOT_ID,
            StoredEntity {
                id: ROOT_ID,
                parent: None,
                kind: "root".to_string(),
                fields: IndexMap::new(),
                saved: true,
            },
        );
        Self {
            next_id: ROOT_ID.as_u64() + 1,
            entities,
            templates: HashMap::new(),
        }
    }
}

struct View<'a> {
    entity: &'a StoredEntity,
    entities: &'a BTreeMap<EntityId, StoredEntity>,
}

impl Candidate for View<'_> {
    fn id(&self) -> EntityId {
        self.entity.id
    }

    fn kind(&self) -> &str {
        &self.entity.kind
    }

    fn parent(&self) -> Option<EntityId> {
        self.entity.parent
    }

    fn has_ancestor(&self, ancestor: EntityId) -> bool {
        let mut current = self.entity.parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.entities.get(&id).and_then(|e| e.parent);
        }
        false
    }

    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.entity.fields.get(name)
    }
}

/// In-memory content store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
///
/// # Example
///
/// ```rust,ignore
/// use dataset::storage::{ContentStore, InMemoryContentStore};
///
/// let store = InMemoryContentStore::new();
/// let id = store.insert_entity(store.root(), "basic-page", &[("title", "Alice")])?;
/// assert_eq!(store.find_one("title=Alice")?, Some(id));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    state: RwLock<State>,
}

impl InMemoryContentStore {
    /// Creates a store holding only the root entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the root entity.
    #[must_use]
    pub const fn root(&self) -> EntityId {
        ROOT_ID
    }

    /// Restores a store from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = State::default();
        for entity in snapshot.entities {
            state.entities.insert(entity.id, entity);
        }
        let highest = state.entities.keys().next_back().map_or(0, |id| id.as_u64());
        state.next_id = snapshot.next_id.max(highest + 1);
        state.templates = snapshot
            .templates
            .into_iter()
            .map(|(kind, fields)| {
                let fields = fields.into_iter().map(|f| (f.name.clone(), f)).collect();
                (kind, fields)
            })
            .collect();
        Self {
            state: RwLock::new(state),
        }
    }

    /// Captures the saved state of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let state = self.read("snapshot")?;
        Ok(StoreSnapshot {
            next_id: state.next_id,
            entities: state.entities.values().filter(|e| e.saved).cloned().collect(),
            templates: state
                .templates
                .iter()
                .map(|(kind, fields)| (kind.clone(), fields.values().cloned().collect()))
                .collect(),
        })
    }

    /// Defines a field of a kind, making the kind's schema strict.
    pub fn define_field(&self, kind: &str, config: FieldConfig) {
        if let Ok(mut state) = self.state.write() {
            state
                .templates
                .entry(kind.to_string())
                .or_default()
                .insert(config.name.clone(), config);
        }
    }

    /// Creates and saves an entity with text fields in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent does not exist or a field is rejected.
    pub fn insert_entity(
        &self,
        parent: EntityId,
        kind: &str,
        fields: &[(&str, &str)],
    ) -> Result<EntityId> {
        let id = self.create_entity(parent, kind)?;
        for (name, value) in fields {
            self.set_field(id, name, FieldValue::text(*value))?;
        }
        self.save(id)?;
        Ok(id)
    }

    /// Returns a copy of a saved entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<StoredEntity> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.entities.get(&id).filter(|e| e.saved).cloned())
    }

    /// Number of saved entities, excluding the root.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state
            .read()
            .map(|s| s.entities.values().filter(|e| e.saved).count().saturating_sub(1))
            .unwrap_or(0)
    }

    /// Saved children of an entity, in identifier order.
    #[must_use]
    pub fn children(&self, parent: EntityId) -> Vec<StoredEntity> {
        self.state
            .read()
            .map(|s| {
                s.entities
                    .values()
                    .filter(|e| e.saved && e.parent == Some(parent))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text values of a field across the saved children of an entity.
    #[must_use]
    pub fn child_values(&self, parent: EntityId, field: &str) -> Vec<String> {
        self.children(parent)
            .iter()
            .filter_map(|e| e.fields.get(field).map(ToString::to_string))
            .collect()
    }

    fn read(&self, operation: &str) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    fn write(&self, operation: &str) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    fn select(&self, selector: &str, limit: Option<usize>) -> Result<Vec<EntityId>> {
        let query = Query::parse(selector)?;
        let state = self.read("find")?;
        let matches = state
            .entities
            .values()
            .filter(|e| e.saved && e.id != ROOT_ID)
            .filter(|e| {
                query.matches(&View {
                    entity: e,
                    entities: &state.entities,
                })
            })
            .map(|e| e.id);
        Ok(match limit {
            Some(n) => matches.take(n).collect(),
            None => matches.collect(),
        })
    }
}

impl ContentStore for InMemoryContentStore {
    fn find_one(&self, selector: &str) -> Result<Option<EntityId>> {
        Ok(self.select(selector, Some(1))?.into_iter().next())
    }

    fn find_many(&self, selector: &str) -> Result<Vec<EntityId>> {
        self.select(selector, None)
    }

    fn create_entity(&self, parent: EntityId, kind: &str) -> Result<EntityId> {
        let mut state = self.write("create_entity")?;
        if !state.entities.contains_key(&parent) {
            return Err(Error::target(
                "create_entity",
                format!("parent {parent} does not exist"),
            ));
        }
        let id = EntityId::new(state.next_id);
        state.next_id += 1;
        state.entities.insert(
            id,
            StoredEntity {
                id,
                parent: Some(parent),
                kind: kind.to_string(),
                fields: IndexMap::new(),
                saved: false,
            },
        );
        Ok(id)
    }

    fn get_field(&self, entity: EntityId, name: &str) -> Result<Option<FieldValue>> {
        let state = self.read("get_field")?;
        let stored = state
            .entities
            .get(&entity)
            .ok_or_else(|| Error::target("get_field", format!("entity {entity} does not exist")))?;
        Ok(stored.fields.get(name).cloned())
    }

    fn set_field(&self, entity: EntityId, name: &str, value: FieldValue) -> Result<()> {
        let mut state = self.write("set_field")?;
        let kind = state
            .entities
            .get(&entity)
            .map(|e| e.kind.clone())
            .ok_or_else(|| Error::target("set_field", format!("entity {entity} does not exist")))?;
        if name != "title" {
            if let Some(fields) = state.templates.get(&kind) {
                if !fields.contains_key(name) {
                    return Err(Error::target(
                        "set_field",
                        format!("field '{name}' is not part of template '{kind}'"),
                    ));
                }
            }
        }
        if let Some(stored) = state.entities.get_mut(&entity) {
            stored.fields.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn save(&self, entity: EntityId) -> Result<()> {
        let mut state = self.write("save")?;
        let stored = state
            .entities
            .get_mut(&entity)
            .ok_or_else(|| Error::target("save", format!("entity {entity} does not exist")))?;
        stored.saved = true;
        Ok(())
    }

    fn delete(&self, entity: EntityId, recursive: bool) -> Result<()> {
        if entity == ROOT_ID {
            return Err(Error::target("delete", "the root entity cannot be deleted"));
        }
        let mut state = self.write("delete")?;
        if !state.entities.contains_key(&entity) {
            return Err(Error::target(
                "delete",
                format!("entity {entity} does not exist"),
            ));
        }

        let mut doomed = vec![entity];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor];
            doomed.extend(
                state
                    .entities
                    .values()
                    .filter(|e| e.parent == Some(current))
                    .map(|e| e.id),
            );
            cursor += 1;
        }
        if doomed.len() > 1 && !recursive {
            return Err(Error::target(
                "delete",
                format!("entity {entity} has children"),
            ));
        }
        for id in doomed {
            state.entities.remove(&id);
        }
        Ok(())
    }

    fn field_config(&self, kind: &str, name: &str) -> Result<Option<FieldConfig>> {
        let state = self.read("field_config")?;
        let config = match state.templates.get(kind) {
            Some(fields) => fields
                .get(name)
                .cloned()
                .or_else(|| (name == "title").then(|| FieldConfig::text("title"))),
            None => Some(FieldConfig::text(name)),
        };
        Ok(config)
    }
}
