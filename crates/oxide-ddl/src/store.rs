//! Generic entity store.
//!
//! An [`EntityStore`] is an ordered collection of one entity kind. Every
//! dialect defines its own entity structs and implements [`Entity`] for
//! them; the store, the diff engine and the propagation helpers only rely
//! on the natural key an entity exposes.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{DdlError, Result};

/// Natural key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKey {
    /// Key of a schema-level entity (tables, views) or of an entity whose
    /// name is unique schema-wide.
    Name(String),
    /// Key of an entity bound to a table.
    Scoped {
        /// Owning table.
        table: String,
        /// Entity name.
        name: String,
    },
}

impl EntityKey {
    /// Creates a scoped key.
    #[must_use]
    pub fn scoped(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Scoped {
            table: table.into(),
            name: name.into(),
        }
    }
}

/// An entity kind that can live in an [`EntityStore`].
pub trait Entity: Clone + Debug + PartialEq {
    /// Human-readable kind name, used in errors and logs.
    const KIND: &'static str;

    /// Field-level differences between two versions of the same entity.
    type Alter: Clone + Debug + PartialEq;

    /// Returns the natural key.
    fn key(&self) -> EntityKey;

    /// Returns the field-level differences, or `None` when both versions
    /// are structurally equal.
    fn alter(from: &Self, to: &Self) -> Option<Self::Alter>;
}

/// An entity that belongs to a table.
pub trait TableBound {
    /// Returns the owning table.
    fn table(&self) -> &str;

    /// Moves the entity to another table.
    fn set_table(&mut self, table: &str);
}

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStatus {
    /// The entity was stored.
    Ok,
    /// An entity with the same key already exists; nothing was stored.
    Conflict,
}

/// Result of [`EntityStore::insert`].
#[derive(Debug, Clone, PartialEq)]
pub struct Insert<T> {
    /// Whether the entity was stored.
    pub status: InsertStatus,
    /// The inserted (or rejected) entity.
    pub data: T,
}

impl<T> Insert<T> {
    /// Returns true if the insert conflicted with an existing entity.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == InsertStatus::Conflict
    }
}

/// Ordered collection of one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStore<T> {
    entities: Vec<T>,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
        }
    }
}

impl<T: Entity> EntityStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entities.iter()
    }

    /// Inserts an entity, rejecting it when its natural key is taken.
    pub fn insert(&mut self, entity: T) -> Insert<T> {
        self.insert_unique_by(entity, T::key)
    }

    /// Inserts an entity, rejecting it when `key` maps it onto the key of an
    /// entity already stored.
    ///
    /// Used for kinds whose uniqueness is wider than their natural key, such
    /// as SQLite index names which are unique across the whole schema.
    pub fn insert_unique_by(&mut self, entity: T, key: impl Fn(&T) -> EntityKey) -> Insert<T> {
        let candidate = key(&entity);
        if self.entities.iter().any(|existing| key(existing) == candidate) {
            return Insert {
                status: InsertStatus::Conflict,
                data: entity,
            };
        }
        self.entities.push(entity.clone());
        Insert {
            status: InsertStatus::Ok,
            data: entity,
        }
    }

    /// Returns every entity.
    #[must_use]
    pub fn all(&self) -> Vec<&T> {
        self.entities.iter().collect()
    }

    /// Returns every entity matching `filter`, in insertion order.
    pub fn list(&self, filter: impl Fn(&T) -> bool) -> Vec<&T> {
        self.entities.iter().filter(|it| filter(it)).collect()
    }

    /// Returns the single entity matching `filter`.
    ///
    /// Only meant for lookups on keys known to be unique: more than one match
    /// is an error.
    pub fn one(&self, filter: impl Fn(&T) -> bool) -> Result<Option<&T>> {
        let matches = self.list(filter);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            count => Err(DdlError::AmbiguousLookup {
                kind: T::KIND,
                count,
            }),
        }
    }

    /// Looks an entity up by natural key.
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&T> {
        self.entities.iter().find(|it| it.key() == *key)
    }

    /// Returns true if an entity with `key` exists.
    #[must_use]
    pub fn contains_key(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    /// Applies `set` to every entity matching `filter` and returns how many
    /// entities were touched.
    pub fn update(&mut self, filter: impl Fn(&T) -> bool, mut set: impl FnMut(&mut T)) -> usize {
        let mut count = 0;
        for entity in self.entities.iter_mut().filter(|it| filter(it)) {
            set(entity);
            count += 1;
        }
        count
    }

    /// Removes every entity matching `filter` and returns how many were removed.
    pub fn delete(&mut self, filter: impl Fn(&T) -> bool) -> usize {
        let before = self.entities.len();
        self.entities.retain(|it| !filter(it));
        before - self.entities.len()
    }
}

impl<'a, T> IntoIterator for &'a EntityStore<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ddl::{Column, Index, IndexColumn};

    fn columns() -> EntityStore<Column> {
        let mut store = EntityStore::new();
        store.insert(Column::new("users", "id", "integer"));
        store.insert(Column::new("users", "name", "text"));
        store.insert(Column::new("posts", "id", "integer"));
        store
    }

    #[test]
    fn test_insert_conflict_keeps_store_unchanged() {
        let mut store = columns();
        let result = store.insert(Column::new("users", "name", "integer"));

        assert!(result.is_conflict());
        assert_eq!(result.data.ty, "integer");
        assert_eq!(store.len(), 3);
        assert_eq!(
            store
                .get(&EntityKey::scoped("users", "name"))
                .map(|c| c.ty.as_str()),
            Some("text")
        );
    }

    #[test]
    fn test_insert_unique_by_widens_the_key() {
        let mut store = EntityStore::new();
        let first = Index::new("users", "idx_name", vec![IndexColumn::column("name")]);
        let second = Index::new("posts", "idx_name", vec![IndexColumn::column("title")]);

        assert!(!store.insert(first).is_conflict());
        // Same name on another table is fine under the natural key...
        assert!(!store.clone().insert(second.clone()).is_conflict());
        // ...but not when uniqueness is schema-wide.
        let result = store.insert_unique_by(second, |it| EntityKey::Name(it.name.clone()));
        assert!(result.is_conflict());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let store = columns();
        let names: Vec<&str> = store
            .list(|c| c.table == "users")
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_one_rejects_ambiguous_lookups() {
        let store = columns();
        assert!(store.one(|c| c.table == "nope").unwrap().is_none());
        assert_eq!(
            store.one(|c| c.table == "posts").unwrap().unwrap().name,
            "id"
        );
        assert!(matches!(
            store.one(|c| c.name == "id"),
            Err(DdlError::AmbiguousLookup { count: 2, .. })
        ));
    }

    #[test]
    fn test_update_applies_to_every_match() {
        let mut store = columns();
        let touched = store.update(|c| c.table == "users", |c| c.table = "accounts".into());

        assert_eq!(touched, 2);
        assert_eq!(store.list(|c| c.table == "accounts").len(), 2);
        assert!(store.list(|c| c.table == "users").is_empty());
    }

    #[test]
    fn test_delete() {
        let mut store = columns();
        assert_eq!(store.delete(|c| c.name == "id"), 2);
        assert_eq!(store.len(), 1);
    }
}
