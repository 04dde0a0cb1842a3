//! Database-level settings and bookkeeping

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::attributes;
use super::entry::HistoryPolicy;
use super::{Color, Identifier};
use crate::utils::{now, truncate_to_seconds};

/// Default cap on history items per entry
pub const DEFAULT_HISTORY_MAX_ITEMS: i32 = 10;
/// Default cap on history bytes per entry (6 MiB)
pub const DEFAULT_HISTORY_MAX_SIZE: i64 = 6 * 1024 * 1024;
/// Default days of history kept by maintenance
pub const DEFAULT_MAINTENANCE_HISTORY_DAYS: i32 = 365;

/// Which default attributes are protected when new values are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProtection {
    pub title: bool,
    pub username: bool,
    pub password: bool,
    pub url: bool,
    pub notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            title: false,
            username: false,
            password: true,
            url: false,
            notes: false,
        }
    }
}

impl MemoryProtection {
    /// Protection flag for a reserved attribute name; custom names are unprotected
    pub fn for_attribute(&self, key: &str) -> bool {
        match key {
            attributes::TITLE => self.title,
            attributes::USERNAME => self.username,
            attributes::PASSWORD => self.password,
            attributes::URL => self.url,
            attributes::NOTES => self.notes,
            _ => false,
        }
    }
}

/// Metadata block of a database
#[derive(Debug, Clone)]
pub struct Metadata {
    generator: String,
    name: String,
    name_changed: DateTime<Utc>,
    description: String,
    description_changed: DateTime<Utc>,
    default_user_name: String,
    default_user_name_changed: DateTime<Utc>,
    maintenance_history_days: i32,
    color: Option<Color>,
    master_key_changed: DateTime<Utc>,
    master_key_change_rec: i32,
    master_key_change_force: i32,
    memory_protection: MemoryProtection,
    custom_icons: HashMap<Identifier, Vec<u8>>,
    custom_icon_order: Vec<Identifier>,
    recycle_bin_enabled: bool,
    recycle_bin: Option<Identifier>,
    recycle_bin_changed: DateTime<Utc>,
    entry_templates_group: Option<Identifier>,
    entry_templates_group_changed: DateTime<Utc>,
    last_selected_group: Option<Identifier>,
    last_top_visible_group: Option<Identifier>,
    history_max_items: i32,
    history_max_size: i64,
    custom_data: BTreeMap<String, String>,
}

impl Default for Metadata {
    fn default() -> Self {
        let current = now();
        Self {
            generator: crate::GENERATOR_NAME.to_string(),
            name: String::new(),
            name_changed: current,
            description: String::new(),
            description_changed: current,
            default_user_name: String::new(),
            default_user_name_changed: current,
            maintenance_history_days: DEFAULT_MAINTENANCE_HISTORY_DAYS,
            color: None,
            master_key_changed: current,
            master_key_change_rec: -1,
            master_key_change_force: -1,
            memory_protection: MemoryProtection::default(),
            custom_icons: HashMap::new(),
            custom_icon_order: Vec::new(),
            recycle_bin_enabled: true,
            recycle_bin: None,
            recycle_bin_changed: current,
            entry_templates_group: None,
            entry_templates_group_changed: current,
            last_selected_group: None,
            last_top_visible_group: None,
            history_max_items: DEFAULT_HISTORY_MAX_ITEMS,
            history_max_size: DEFAULT_HISTORY_MAX_SIZE,
            custom_data: BTreeMap::new(),
        }
    }
}

fn non_null(uuid: Option<Identifier>) -> Option<Identifier> {
    uuid.filter(|uuid| !uuid.is_null())
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn set_generator(&mut self, generator: &str) {
        self.generator = generator.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_changed(&self) -> DateTime<Utc> {
        self.name_changed
    }

    /// Set the name, stamping its changed time when it differs
    pub fn set_name(&mut self, name: &str) {
        if self.name != name {
            self.name = name.to_string();
            self.name_changed = now();
        }
    }

    pub fn set_name_changed(&mut self, dt: DateTime<Utc>) {
        self.name_changed = truncate_to_seconds(dt);
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn description_changed(&self) -> DateTime<Utc> {
        self.description_changed
    }

    pub fn set_description(&mut self, description: &str) {
        if self.description != description {
            self.description = description.to_string();
            self.description_changed = now();
        }
    }

    pub fn set_description_changed(&mut self, dt: DateTime<Utc>) {
        self.description_changed = truncate_to_seconds(dt);
    }

    pub fn default_user_name(&self) -> &str {
        &self.default_user_name
    }

    pub fn default_user_name_changed(&self) -> DateTime<Utc> {
        self.default_user_name_changed
    }

    pub fn set_default_user_name(&mut self, user_name: &str) {
        if self.default_user_name != user_name {
            self.default_user_name = user_name.to_string();
            self.default_user_name_changed = now();
        }
    }

    pub fn set_default_user_name_changed(&mut self, dt: DateTime<Utc>) {
        self.default_user_name_changed = truncate_to_seconds(dt);
    }

    pub fn maintenance_history_days(&self) -> i32 {
        self.maintenance_history_days
    }

    pub fn set_maintenance_history_days(&mut self, days: i32) {
        self.maintenance_history_days = days;
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn set_color(&mut self, color: Option<Color>) {
        self.color = color;
    }

    pub fn master_key_changed(&self) -> DateTime<Utc> {
        self.master_key_changed
    }

    pub fn set_master_key_changed(&mut self, dt: DateTime<Utc>) {
        self.master_key_changed = truncate_to_seconds(dt);
    }

    /// Days after which a key change is recommended, -1 when disabled
    pub fn master_key_change_rec(&self) -> i32 {
        self.master_key_change_rec
    }

    pub fn set_master_key_change_rec(&mut self, days: i32) {
        self.master_key_change_rec = days;
    }

    /// Days after which a key change is forced, -1 when disabled
    pub fn master_key_change_force(&self) -> i32 {
        self.master_key_change_force
    }

    pub fn set_master_key_change_force(&mut self, days: i32) {
        self.master_key_change_force = days;
    }

    pub fn memory_protection(&self) -> &MemoryProtection {
        &self.memory_protection
    }

    pub fn memory_protection_mut(&mut self) -> &mut MemoryProtection {
        &mut self.memory_protection
    }

    pub fn custom_icon(&self, uuid: &Identifier) -> Option<&[u8]> {
        self.custom_icons.get(uuid).map(Vec::as_slice)
    }

    pub fn contains_custom_icon(&self, uuid: &Identifier) -> bool {
        self.custom_icons.contains_key(uuid)
    }

    /// Custom icons in insertion order
    pub fn custom_icons(&self) -> impl Iterator<Item = (Identifier, &[u8])> {
        self.custom_icon_order
            .iter()
            .filter_map(|uuid| self.custom_icons.get(uuid).map(|data| (*uuid, data.as_slice())))
    }

    pub fn custom_icon_count(&self) -> usize {
        self.custom_icon_order.len()
    }

    /// Add a custom icon; a null or already used uuid is refused
    pub fn add_custom_icon(&mut self, uuid: Identifier, data: Vec<u8>) -> bool {
        if uuid.is_null() || self.custom_icons.contains_key(&uuid) {
            return false;
        }
        self.custom_icons.insert(uuid, data);
        self.custom_icon_order.push(uuid);
        true
    }

    pub fn remove_custom_icon(&mut self, uuid: &Identifier) -> bool {
        if self.custom_icons.remove(uuid).is_none() {
            return false;
        }
        self.custom_icon_order.retain(|existing| existing != uuid);
        true
    }

    pub fn recycle_bin_enabled(&self) -> bool {
        self.recycle_bin_enabled
    }

    pub fn set_recycle_bin_enabled(&mut self, enabled: bool) {
        self.recycle_bin_enabled = enabled;
    }

    pub fn recycle_bin(&self) -> Option<Identifier> {
        self.recycle_bin
    }

    pub fn set_recycle_bin(&mut self, group: Option<Identifier>) {
        self.recycle_bin = non_null(group);
        self.recycle_bin_changed = now();
    }

    pub fn recycle_bin_changed(&self) -> DateTime<Utc> {
        self.recycle_bin_changed
    }

    pub fn set_recycle_bin_changed(&mut self, dt: DateTime<Utc>) {
        self.recycle_bin_changed = truncate_to_seconds(dt);
    }

    pub fn entry_templates_group(&self) -> Option<Identifier> {
        self.entry_templates_group
    }

    pub fn set_entry_templates_group(&mut self, group: Option<Identifier>) {
        self.entry_templates_group = non_null(group);
        self.entry_templates_group_changed = now();
    }

    pub fn entry_templates_group_changed(&self) -> DateTime<Utc> {
        self.entry_templates_group_changed
    }

    pub fn set_entry_templates_group_changed(&mut self, dt: DateTime<Utc>) {
        self.entry_templates_group_changed = truncate_to_seconds(dt);
    }

    pub fn last_selected_group(&self) -> Option<Identifier> {
        self.last_selected_group
    }

    pub fn set_last_selected_group(&mut self, group: Option<Identifier>) {
        self.last_selected_group = non_null(group);
    }

    pub fn last_top_visible_group(&self) -> Option<Identifier> {
        self.last_top_visible_group
    }

    pub fn set_last_top_visible_group(&mut self, group: Option<Identifier>) {
        self.last_top_visible_group = non_null(group);
    }

    pub fn history_max_items(&self) -> i32 {
        self.history_max_items
    }

    pub fn set_history_max_items(&mut self, max_items: i32) {
        self.history_max_items = max_items;
    }

    pub fn history_max_size(&self) -> i64 {
        self.history_max_size
    }

    pub fn set_history_max_size(&mut self, max_size: i64) {
        self.history_max_size = max_size;
    }

    /// Current history limits as a policy value
    pub fn history_policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            max_items: self.history_max_items,
            max_size: self.history_max_size,
        }
    }

    pub fn custom_data(&self) -> &BTreeMap<String, String> {
        &self.custom_data
    }

    pub fn set_custom_data(&mut self, key: &str, value: &str) {
        self.custom_data.insert(key.to_string(), value.to_string());
    }

    pub fn remove_custom_data(&mut self, key: &str) -> Option<String> {
        self.custom_data.remove(key)
    }

    /// Forget references to a group that no longer exists
    pub(crate) fn clear_group_references(&mut self, group: &Identifier) {
        if self.recycle_bin == Some(*group) {
            self.recycle_bin = None;
        }
        if self.entry_templates_group == Some(*group) {
            self.entry_templates_group = None;
        }
        if self.last_selected_group == Some(*group) {
            self.last_selected_group = None;
        }
        if self.last_top_visible_group == Some(*group) {
            self.last_top_visible_group = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let meta = Metadata::new();
        assert_eq!(meta.generator(), crate::GENERATOR_NAME);
        assert_eq!(meta.history_max_items(), 10);
        assert_eq!(meta.history_max_size(), 6 * 1024 * 1024);
        assert_eq!(meta.maintenance_history_days(), 365);
        assert_eq!(meta.master_key_change_rec(), -1);
        assert_eq!(meta.master_key_change_force(), -1);
        assert!(meta.recycle_bin_enabled());
        assert!(meta.memory_protection().password);
        assert!(!meta.memory_protection().title);
    }

    #[test]
    fn test_protection_lookup() {
        let protection = MemoryProtection {
            username: true,
            ..MemoryProtection::default()
        };
        assert!(protection.for_attribute(attributes::USERNAME));
        assert!(protection.for_attribute(attributes::PASSWORD));
        assert!(!protection.for_attribute(attributes::NOTES));
        assert!(!protection.for_attribute("Custom"));
    }

    #[test]
    fn test_custom_icons_keep_order() {
        let mut meta = Metadata::new();
        let uuids: Vec<Identifier> = (0..5).map(|_| Identifier::random()).collect();
        for (i, uuid) in uuids.iter().enumerate() {
            assert!(meta.add_custom_icon(*uuid, vec![i as u8]));
        }
        assert!(!meta.add_custom_icon(uuids[0], vec![9]));
        assert!(!meta.add_custom_icon(Identifier::null(), vec![9]));

        let listed: Vec<Identifier> = meta.custom_icons().map(|(uuid, _)| uuid).collect();
        assert_eq!(listed, uuids);

        assert!(meta.remove_custom_icon(&uuids[2]));
        assert_eq!(meta.custom_icon_count(), 4);
        assert_eq!(meta.custom_icon(&uuids[3]), Some(&[3u8][..]));
    }

    #[test]
    fn test_group_reference_cleanup() {
        let mut meta = Metadata::new();
        let bin = Identifier::random();
        meta.set_recycle_bin(Some(bin));
        meta.set_last_selected_group(Some(bin));
        meta.clear_group_references(&bin);
        assert!(meta.recycle_bin().is_none());
        assert!(meta.last_selected_group().is_none());
    }

    #[test]
    fn test_history_policy() {
        let mut meta = Metadata::new();
        meta.set_history_max_items(3);
        meta.set_history_max_size(-1);
        assert_eq!(
            meta.history_policy(),
            HistoryPolicy {
                max_items: 3,
                max_size: -1
            }
        );
    }
}
