//! Entry string attributes and binary attachments

use std::collections::{BTreeMap, BTreeSet};

pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";

/// Reserved attribute names, always present on every entry
pub const DEFAULT_ATTRIBUTES: [&str; 5] = [TITLE, USERNAME, PASSWORD, URL, NOTES];

/// Whether `key` is one of the five reserved attribute names
pub fn is_default_attribute(key: &str) -> bool {
    DEFAULT_ATTRIBUTES.contains(&key)
}

/// Named string values of an entry plus their protection flags
///
/// Mutators return `true` when they changed anything, which is what the
/// owning database turns into a data-changed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttributes {
    values: BTreeMap<String, String>,
    protected: BTreeSet<String>,
}

impl Default for EntryAttributes {
    fn default() -> Self {
        let values = DEFAULT_ATTRIBUTES
            .iter()
            .map(|key| (key.to_string(), String::new()))
            .collect();
        Self {
            values,
            protected: BTreeSet::new(),
        }
    }
}

impl EntryAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// All names in key order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Names other than the reserved five
    pub fn custom_keys(&self) -> impl Iterator<Item = &str> {
        self.keys().filter(|key| !is_default_attribute(key))
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_protected(&self, key: &str) -> bool {
        self.protected.contains(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Insert or overwrite `key`, setting its protection flag
    pub fn set(&mut self, key: &str, value: &str, protect: bool) -> bool {
        let mut changed = false;
        match self.values.get_mut(key) {
            Some(existing) if existing != value => {
                *existing = value.to_string();
                changed = true;
            }
            Some(_) => {}
            None => {
                self.values.insert(key.to_string(), value.to_string());
                changed = true;
            }
        }

        if protect != self.protected.contains(key) {
            if protect {
                self.protected.insert(key.to_string());
            } else {
                self.protected.remove(key);
            }
            changed = true;
        }
        changed
    }

    /// Change the protection flag of an existing key
    pub fn set_protected(&mut self, key: &str, protect: bool) -> bool {
        match self.values.get(key) {
            Some(value) => {
                let value = value.clone();
                self.set(key, &value, protect)
            }
            None => false,
        }
    }

    /// Remove a custom attribute; reserved names cannot be removed
    pub fn remove(&mut self, key: &str) -> bool {
        if is_default_attribute(key) || !self.values.contains_key(key) {
            return false;
        }
        self.values.remove(key);
        self.protected.remove(key);
        true
    }

    /// Rename a custom attribute, keeping its value and protection
    ///
    /// Refused when either name is reserved, the source is missing or the
    /// target already exists.
    pub fn rename(&mut self, old_key: &str, new_key: &str) -> bool {
        if is_default_attribute(old_key) || is_default_attribute(new_key) {
            return false;
        }
        if old_key == new_key || self.values.contains_key(new_key) {
            return false;
        }
        let Some(value) = self.values.remove(old_key) else {
            return false;
        };
        let was_protected = self.protected.remove(old_key);
        self.values.insert(new_key.to_string(), value);
        if was_protected {
            self.protected.insert(new_key.to_string());
        }
        true
    }

    /// Reset to the five empty reserved attributes
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Sum of UTF-8 lengths of every name and value
    pub fn attributes_size(&self) -> usize {
        self.values.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Named binary payloads attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryAttachments {
    values: BTreeMap<String, Vec<u8>>,
}

impl EntryAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn values(&self) -> impl Iterator<Item = &[u8]> {
        self.values.values().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>) -> bool {
        match self.values.get(key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.values.insert(key.to_string(), value);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
