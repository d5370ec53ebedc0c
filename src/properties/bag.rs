use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::properties::constants::{
    MAX_PROPERTIES, MAX_PROPERTY_KEY_LENGTH, MAX_PROPERTY_VALUE_LENGTH,
};

/// A single custom property value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(value) => f.write_str(value),
            PropertyValue::Integer(value) => write!(f, "{value}"),
            PropertyValue::Float(value) => write!(f, "{value}"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        PropertyValue::String(value.clone())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

/// Bounded key/value metadata attached to a moment, flow or log event.
///
/// A bag never holds more than [`MAX_PROPERTIES`] entries. Anything past the cap is dropped
/// silently, as are empty or oversized keys and repeated keys (the first occurrence wins).
/// String values longer than [`MAX_PROPERTY_VALUE_LENGTH`] characters are truncated.
///
/// Insertion order is kept, which is what makes truncation deterministic: when a bag is
/// built with [`PropertyBag::merged`], implicit entries go in first and caller entries
/// fill whatever room is left, in the order they were supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyBag {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from implicit (domain) properties followed by caller properties.
    pub fn merged<I, C, K, V, CK, CV>(implicit: I, caller: C) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        C: IntoIterator<Item = (CK, CV)>,
        K: Into<String>,
        V: Into<PropertyValue>,
        CK: Into<String>,
        CV: Into<PropertyValue>,
    {
        let mut bag = Self::new();
        bag.extend(implicit);
        bag.extend(caller);
        bag
    }

    /// Builder-style insert; overflow and invalid keys are ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an entry and reports whether it was kept.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> bool {
        let key = key.into();
        if self.entries.len() >= MAX_PROPERTIES
            || key.trim().is_empty()
            || key.chars().count() > MAX_PROPERTY_KEY_LENGTH
            || self.contains_key(&key)
        {
            return false;
        }
        self.entries.push((key, clamp_value(value.into())));
        true
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_PROPERTIES
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

fn clamp_value(value: PropertyValue) -> PropertyValue {
    match value {
        PropertyValue::String(text) if text.chars().count() > MAX_PROPERTY_VALUE_LENGTH => {
            PropertyValue::String(text.chars().take(MAX_PROPERTY_VALUE_LENGTH).collect())
        }
        other => other,
    }
}

impl<K, V> Extend<(K, V)> for PropertyBag
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            if self.is_full() {
                break;
            }
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for PropertyBag
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut bag = Self::new();
        bag.extend(iter);
        bag
    }
}

impl IntoIterator for PropertyBag {
    type Item = (String, PropertyValue);
    type IntoIter = std::vec::IntoIter<(String, PropertyValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyBag {
    type Item = (String, PropertyValue);
    type IntoIter = std::iter::Cloned<std::slice::Iter<'a, (String, PropertyValue)>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().cloned()
    }
}

impl Serialize for PropertyBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
