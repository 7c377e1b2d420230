//! Structural diff between two entity stores.
//!
//! Diffing is done per entity kind. [`diff`] reports entities that only
//! exist on one side, [`alters`] reports field-level changes of entities
//! present on both sides.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::{Entity, EntityKey, EntityStore};

/// Direction of a one-sided difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    /// Present in the target store only.
    Create,
    /// Present in the source store only.
    Drop,
}

/// An entity tagged with its [`DiffType`].
#[derive(Debug, Clone, PartialEq)]
pub struct Diffed<T> {
    /// Whether the entity is created or dropped.
    pub diff_type: DiffType,
    /// The entity, as found in the store it exists in.
    pub entity: T,
}

/// A changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    /// Value in the source store.
    pub from: T,
    /// Value in the target store.
    pub to: T,
}

impl<T: Clone + PartialEq> Change<T> {
    /// Returns a change when the two values differ.
    pub fn between(from: &T, to: &T) -> Option<Self> {
        (from != to).then(|| Self {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

/// Computes creates and drops of one entity kind.
///
/// Creates come first, in the insertion order of `b`; drops follow in the
/// insertion order of `a`.
pub fn diff<T: Entity>(a: &EntityStore<T>, b: &EntityStore<T>) -> Vec<Diffed<T>> {
    let keys_a: HashSet<EntityKey> = a.iter().map(Entity::key).collect();
    let keys_b: HashSet<EntityKey> = b.iter().map(Entity::key).collect();

    let created = b
        .iter()
        .filter(|it| !keys_a.contains(&it.key()))
        .map(|it| Diffed {
            diff_type: DiffType::Create,
            entity: it.clone(),
        });
    let dropped = a
        .iter()
        .filter(|it| !keys_b.contains(&it.key()))
        .map(|it| Diffed {
            diff_type: DiffType::Drop,
            entity: it.clone(),
        });

    created.chain(dropped).collect()
}

/// Computes field-level changes of entities present in both stores, in the
/// insertion order of `b`.
pub fn alters<T: Entity>(a: &EntityStore<T>, b: &EntityStore<T>) -> Vec<T::Alter> {
    b.iter()
        .filter_map(|to| {
            let from = a.get(&to.key())?;
            T::alter(from, to)
        })
        .collect()
}

/// Splits a diff into `(created, dropped)` entities.
pub fn split<T>(diffs: Vec<Diffed<T>>) -> (Vec<T>, Vec<T>) {
    let mut created = Vec::new();
    let mut dropped = Vec::new();
    for it in diffs {
        match it.diff_type {
            DiffType::Create => created.push(it.entity),
            DiffType::Drop => dropped.push(it.entity),
        }
    }
    (created, dropped)
}
