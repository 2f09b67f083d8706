//! Resource - Representing declared resources and their state

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "compute_instance", "networking_secgroups")
    pub resource_type: String,
    /// Resource name (local name given in configuration)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// A value counts as "set" unless it is an empty string, list or map.
    /// Mirrors how optional attributes are treated when left blank.
    pub fn is_set(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Int(_) | Value::Bool(_) => true,
        }
    }

    /// Build a list of strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a map of strings
    pub fn string_map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Typed accessors over an attribute map
pub trait Attributes {
    fn get_string(&self, key: &str) -> Option<&str>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_list(&self, key: &str) -> Option<&[Value]>;
    fn get_map(&self, key: &str) -> Option<&HashMap<String, Value>>;

    /// Get a boolean attribute with a default value
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Get a non-empty string attribute
    fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get_string(key).filter(|s| !s.is_empty())
    }

    /// Get a list of strings as a set (ignores non-string items)
    fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        self.get_list(key)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get a map of strings (ignores non-string values)
    fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get_map(key)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Attributes for HashMap<String, Value> {
    fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    fn get_map(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.get(key).and_then(Value::as_map)
    }
}

/// Desired state declared in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    /// Declare a data source
    pub fn data_source(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(resource_type, name).with_read_only(true)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Remote identifier assigned by the cloud (e.g., the server UUID)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    /// State of a resource known only by its remote identifier (import)
    pub fn imported(id: ResourceId, identifier: impl Into<String>) -> Self {
        Self::existing(id, HashMap::new()).with_identifier(identifier)
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Attributes of `self` overlaid with the declared attributes of `resource`
    ///
    /// Used to build the prior state handed to a read after create/update,
    /// so configuration-only attributes survive the round trip.
    pub fn overlay(&self, resource: &Resource) -> State {
        let mut attributes = self.attributes.clone();
        for (key, value) in &resource.attributes {
            attributes.insert(key.clone(), value.clone());
        }
        State {
            id: self.id.clone(),
            identifier: self.identifier.clone(),
            attributes,
            exists: self.exists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_accessors() {
        let resource = Resource::new("compute_instance", "web")
            .with_attribute("name", Value::string("web-01"))
            .with_attribute("stop_before_destroy", Value::Bool(true))
            .with_attribute("system_disk_size", Value::Int(40))
            .with_attribute(
                "security_group_ids",
                Value::string_list(["sg-b", "sg-a", "sg-b"]),
            );

        let attrs = &resource.attributes;
        assert_eq!(attrs.get_string("name"), Some("web-01"));
        assert_eq!(attrs.get_int("system_disk_size"), Some(40));
        assert!(attrs.get_bool_or("stop_before_destroy", false));
        assert!(attrs.get_bool_or("delete_eip_on_termination", true));
        assert_eq!(
            attrs
                .get_string_set("security_group_ids")
                .into_iter()
                .collect::<Vec<_>>(),
            vec!["sg-a".to_string(), "sg-b".to_string()]
        );
        assert_eq!(attrs.get_non_empty("description"), None);
    }

    #[test]
    fn empty_values_are_not_set() {
        assert!(!Value::string("").is_set());
        assert!(!Value::List(vec![]).is_set());
        assert!(Value::Bool(false).is_set());
    }

    #[test]
    fn overlay_prefers_declared_attributes() {
        let id = ResourceId::new("compute_instance", "web");
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::string("old"));
        attrs.insert("status".to_string(), Value::string("ACTIVE"));
        let state = State::existing(id, attrs).with_identifier("srv-1");

        let desired =
            Resource::new("compute_instance", "web").with_attribute("name", Value::string("new"));
        let merged = state.overlay(&desired);

        assert_eq!(merged.identifier.as_deref(), Some("srv-1"));
        assert_eq!(merged.attributes.get_string("name"), Some("new"));
        assert_eq!(merged.attributes.get_string("status"), Some("ACTIVE"));
    }
}
