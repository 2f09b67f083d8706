//! Differ - Compare desired state with current state
//!
//! Compares the desired attributes declared in configuration with the current
//! state read from the Provider and decides which action reconciles them.

use std::collections::{BTreeSet, HashMap};

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changes: ChangeSet,
    },
    /// A force-new attribute changed -> delete and create again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changes: ChangeSet,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Set of attribute names whose desired value differs from the current one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changed: BTreeSet<String>,
}

impl ChangeSet {
    /// Compare desired attributes against the prior state
    ///
    /// Declared values that differ are changes. Attributes present in the
    /// prior state but no longer declared count as changes unless the schema
    /// marks them computed. Keys starting with `_` are internal and skipped.
    pub fn between(
        desired: &HashMap<String, Value>,
        current: &HashMap<String, Value>,
        schema: Option<&ResourceSchema>,
    ) -> Self {
        let mut changed = BTreeSet::new();
        let desired = match schema {
            Some(s) => s.with_defaults(desired),
            None => desired.clone(),
        };

        for (key, desired_value) in &desired {
            if key.starts_with('_') {
                continue;
            }
            match current.get(key) {
                Some(current_value) if declared_matches(desired_value, current_value) => {}
                // Blank and absent are equivalent
                None if !desired_value.is_set() => {}
                _ => {
                    changed.insert(key.clone());
                }
            }
        }

        for (key, current_value) in current {
            if key.starts_with('_') || desired.contains_key(key) || !current_value.is_set() {
                continue;
            }
            let computed =
                schema.is_none_or(|s| s.is_computed(key) || !s.attributes.contains_key(key));
            if !computed {
                changed.insert(key.clone());
            }
        }

        Self { changed }
    }

    pub fn has_change(&self, key: &str) -> bool {
        self.changed.contains(key)
    }

    /// True if any of `keys` changed
    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.changed.contains(*k))
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }
}

/// Whether the declared value agrees with the current one
///
/// Blocks (maps inside lists) only compare their declared fields, so fields
/// the provider fills in do not count as drift.
fn declared_matches(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(d, c)| block_matches(d, c))
        }
        _ => desired == current,
    }
}

fn block_matches(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d.iter().all(|(key, value)| match c.get(key) {
            Some(current_value) => block_matches(value, current_value),
            None => !value.is_set(),
        }),
        _ => desired == current,
    }
}

/// Whether a change of `name` can only be applied by replacing the resource
///
/// A force-new block list is replaced when its length changes or when a
/// force-new field of one of its blocks changes. Other block fields are
/// updated in place.
fn requires_replace(
    schema: &ResourceSchema,
    name: &str,
    desired: Option<&Value>,
    current: Option<&Value>,
) -> bool {
    let Some(attr) = schema.attributes.get(name) else {
        return false;
    };
    if !attr.force_new {
        return false;
    }
    let fields = match &attr.attr_type {
        AttributeType::List(inner) => match inner.as_ref() {
            AttributeType::Struct { fields, .. } => fields,
            _ => return true,
        },
        _ => return true,
    };
    match (desired, current) {
        (Some(Value::List(d)), Some(Value::List(c))) if d.len() == c.len() => {
            d.iter().zip(c).any(|(d, c)| {
                let (Value::Map(d), Value::Map(c)) = (d, c) else {
                    return d != c;
                };
                fields.iter().filter(|f| f.force_new).any(|f| {
                    match (d.get(&f.name), c.get(&f.name)) {
                        (Some(dv), Some(cv)) => dv.is_set() && !block_matches(dv, cv),
                        (Some(dv), None) => dv.is_set(),
                        (None, _) => false,
                    }
                })
            })
        }
        _ => true,
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changes = ChangeSet::between(&desired.attributes, &current.attributes, schema);

    if changes.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| {
        changes.iter().any(|k| {
            requires_replace(s, k, desired.attributes.get(k), current.attributes.get(k))
        })
    });
    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changes,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changes,
        }
    }
}
