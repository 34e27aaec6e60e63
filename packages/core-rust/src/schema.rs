use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps entity fields to the qualified action that serves the entities they
/// reference.
///
/// Schemas are immutable value objects: narrowing or overriding one derives
/// a new schema and leaves the original (usually a service default shared by
/// every call) untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopulationSchema {
    fields: BTreeMap<String, String>,
}

impl PopulationSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with one more field mapping.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, action: impl Into<String>) -> Self {
        self.fields.insert(field.into(), action.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Target action for a field, if the field is part of the schema.
    #[must_use]
    pub fn target(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Whether any field of the schema populates through `action`.
    #[must_use]
    pub fn targets(&self, action: &str) -> bool {
        self.fields.values().any(|a| a == action)
    }

    /// Iterates `(field, qualified action)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, a)| (f.as_str(), a.as_str()))
    }

    /// Derives the sub-schema restricted to the named fields.
    ///
    /// Names not present in `self` are ignored.
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let fields = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.fields
                    .get(name)
                    .map(|action| (name.to_string(), action.clone()))
            })
            .collect();
        Self { fields }
    }

    /// Derives the schema a call asked for through its `populate` parameter.
    ///
    /// - absent, `null` or `false`: no population
    /// - `true` (or the text `"true"`): the service default
    /// - a space-delimited string or a list: that subset of the default
    /// - an object: an explicit `field -> action` mapping, limited to
    ///   actions the default schema already targets
    ///
    /// Returns `None` when nothing is to be populated.
    #[must_use]
    pub fn from_request(param: Option<&Value>, default: &Self) -> Option<Self> {
        let schema = match param? {
            Value::Bool(true) => default.clone(),
            Value::String(flag) if flag == "true" || flag == "1" => default.clone(),
            Value::String(names) => {
                let names: Vec<&str> = names.split_whitespace().collect();
                default.select(&names)
            }
            Value::Array(items) => {
                let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                default.select(&names)
            }
            Value::Object(map) => Self {
                fields: map
                    .iter()
                    .filter_map(|(field, action)| {
                        action
                            .as_str()
                            .filter(|a| default.targets(a))
                            .map(|a| (field.clone(), a.to_string()))
                    })
                    .collect(),
            },
            _ => return None,
        };
        (!schema.is_empty()).then_some(schema)
    }
}

impl<F, A> FromIterator<(F, A)> for PopulationSchema
where
    F: Into<String>,
    A: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (F, A)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(f, a)| (f.into(), a.into()))
                .collect(),
        }
    }
}

/// Field selection applied to each entity of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilter {
    /// Use the owning service's configured default field list.
    ServiceDefault,
    /// Keep exactly these fields.
    Fields(Vec<String>),
}

impl FieldFilter {
    /// Parses a space-delimited field list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::Fields(list.split_whitespace().map(str::to_string).collect())
    }

    /// Reads the `propFilter` parameter. `true` selects the service default;
    /// a string or list selects explicit fields; anything else means no
    /// filtering.
    #[must_use]
    pub fn from_param(param: Option<&Value>) -> Option<Self> {
        match param? {
            Value::Bool(true) => Some(Self::ServiceDefault),
            Value::String(s) if s == "true" => Some(Self::ServiceDefault),
            Value::String(s) if !s.trim().is_empty() => Some(Self::parse(s)),
            Value::Array(items) => Some(Self::Fields(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            )),
            _ => None,
        }
    }
}
