//! PDF dictionary implementation

use indexmap::IndexMap;

use super::{object::write_name, Object, ObjectId, WritePdf};

/// PDF dictionary object, keys kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: IndexMap<Vec<u8>, Object>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Get value by key
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&Object> {
        self.entries.get(key.as_ref())
    }

    /// Get mutable value by key
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut Object> {
        self.entries.get_mut(key.as_ref())
    }

    /// Check whether a key is present
    pub fn has(&self, key: impl AsRef<[u8]>) -> bool {
        self.entries.contains_key(key.as_ref())
    }

    /// Set value, replacing in place when the key exists
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Object>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<Object> {
        self.entries.shift_remove(key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Object)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Object)> {
        self.entries.iter_mut()
    }

    /// Check the `/Type` entry
    pub fn type_is(&self, type_name: &str) -> bool {
        self.get_name("Type") == Some(type_name)
    }

    /// Get integer value
    pub fn get_integer(&self, key: impl AsRef<[u8]>) -> Option<i64> {
        self.get(key).and_then(|value| value.as_i64().ok())
    }

    /// Get integer or real value
    pub fn get_number(&self, key: impl AsRef<[u8]>) -> Option<f64> {
        self.get(key).and_then(|value| value.as_f64().ok())
    }

    /// Get boolean value
    pub fn get_boolean(&self, key: impl AsRef<[u8]>) -> Option<bool> {
        self.get(key).and_then(|value| value.as_bool().ok())
    }

    /// Get name value
    pub fn get_name(&self, key: impl AsRef<[u8]>) -> Option<&str> {
        self.get(key).and_then(|value| value.as_name_str().ok())
    }

    /// Get raw string bytes
    pub fn get_string(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.get(key).and_then(|value| value.as_str().ok())
    }

    /// Get reference value
    pub fn get_reference(&self, key: impl AsRef<[u8]>) -> Option<ObjectId> {
        self.get(key).and_then(|value| value.as_reference().ok())
    }

    /// Get direct dictionary value
    pub fn get_dict(&self, key: impl AsRef<[u8]>) -> Option<&Dictionary> {
        match self.get(key) {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        }
    }

    /// Get direct array value
    pub fn get_array(&self, key: impl AsRef<[u8]>) -> Option<&Vec<Object>> {
        match self.get(key) {
            Some(Object::Array(array)) => Some(array),
            _ => None,
        }
    }

    /// Set reference value
    pub fn set_reference(&mut self, key: impl Into<Vec<u8>>, id: ObjectId) {
        self.set(key, Object::Reference(id));
    }

    /// Set name value
    pub fn set_name(&mut self, key: impl Into<Vec<u8>>, name: impl Into<Vec<u8>>) {
        self.set(key, Object::Name(name.into()));
    }
}

impl FromIterator<(Vec<u8>, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Vec<u8>, Object)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl WritePdf for Dictionary {
    fn write_to(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(b"<<");
        for (key, value) in &self.entries {
            write_name(key, output);
            output.push(b' ');
            value.write_to(output);
        }
        output.extend_from_slice(b">>");
    }
}
