//! Password entries and their history
//!
//! An entry belongs to exactly one group of a database, recorded here as a
//! non-owning group id. History items are full entries owned by their parent
//! entry; they carry the parent's uuid and never belong to a group.

use std::collections::HashSet;

use super::attributes::{self, EntryAttachments, EntryAttributes};
use super::{Color, Icon, Identifier, TimeInfo};

/// One window-title to keystroke-sequence mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoTypeAssociation {
    pub window: String,
    pub sequence: String,
}

/// Auto-type settings of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoTypeSettings {
    pub enabled: bool,
    pub obfuscation: i32,
    pub default_sequence: String,
    pub associations: Vec<AutoTypeAssociation>,
}

impl Default for AutoTypeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            obfuscation: 0,
            default_sequence: String::new(),
            associations: Vec::new(),
        }
    }
}

/// History retention limits; negative values disable a limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub max_items: i32,
    pub max_size: i64,
}

impl HistoryPolicy {
    pub const UNLIMITED: HistoryPolicy = HistoryPolicy {
        max_items: -1,
        max_size: -1,
    };
}

/// A password entry
#[derive(Debug, Clone)]
pub struct Entry {
    uuid: Identifier,
    icon: Icon,
    foreground_color: Option<Color>,
    background_color: Option<Color>,
    override_url: String,
    tags: String,
    auto_type: AutoTypeSettings,
    times: TimeInfo,
    attributes: EntryAttributes,
    attachments: EntryAttachments,
    history: Vec<Entry>,
    group: Option<Identifier>,
    pending_snapshot: Option<Box<Entry>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    /// New detached entry with a random uuid
    pub fn new() -> Self {
        Self::with_uuid(Identifier::random())
    }

    pub fn with_uuid(uuid: Identifier) -> Self {
        Self {
            uuid,
            icon: Icon::default(),
            foreground_color: None,
            background_color: None,
            override_url: String::new(),
            tags: String::new(),
            auto_type: AutoTypeSettings::default(),
            times: TimeInfo::default(),
            attributes: EntryAttributes::default(),
            attachments: EntryAttachments::default(),
            history: Vec::new(),
            group: None,
            pending_snapshot: None,
        }
    }

    pub fn uuid(&self) -> Identifier {
        self.uuid
    }

    /// Null uuids are ignored
    pub fn set_uuid(&mut self, uuid: Identifier) {
        if !uuid.is_null() {
            self.uuid = uuid;
        }
    }

    pub fn icon(&self) -> Icon {
        self.icon
    }

    pub fn set_icon(&mut self, icon: Icon) {
        self.icon = icon;
    }

    pub fn set_icon_number(&mut self, number: i32) {
        self.icon = Icon::Builtin(number);
    }

    /// A null uuid falls back to builtin icon 0
    pub fn set_custom_icon(&mut self, uuid: Identifier) {
        self.icon = if uuid.is_null() {
            Icon::default()
        } else {
            Icon::Custom(uuid)
        };
    }

    pub fn foreground_color(&self) -> Option<Color> {
        self.foreground_color
    }

    pub fn set_foreground_color(&mut self, color: Option<Color>) {
        self.foreground_color = color;
    }

    pub fn background_color(&self) -> Option<Color> {
        self.background_color
    }

    pub fn set_background_color(&mut self, color: Option<Color>) {
        self.background_color = color;
    }

    pub fn override_url(&self) -> &str {
        &self.override_url
    }

    pub fn set_override_url(&mut self, url: &str) {
        self.override_url = url.to_string();
    }

    pub fn tags(&self) -> &str {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: &str) {
        self.tags = tags.to_string();
    }

    pub fn auto_type(&self) -> &AutoTypeSettings {
        &self.auto_type
    }

    pub fn auto_type_mut(&mut self) -> &mut AutoTypeSettings {
        &mut self.auto_type
    }

    pub fn times(&self) -> &TimeInfo {
        &self.times
    }

    pub fn times_mut(&mut self) -> &mut TimeInfo {
        &mut self.times
    }

    pub fn set_times(&mut self, times: TimeInfo) {
        self.times = times;
    }

    pub fn is_expired(&self) -> bool {
        self.times.is_expired()
    }

    pub fn attributes(&self) -> &EntryAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut EntryAttributes {
        &mut self.attributes
    }

    pub fn attachments(&self) -> &EntryAttachments {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut EntryAttachments {
        &mut self.attachments
    }

    fn attribute(&self, key: &str) -> &str {
        self.attributes.value(key).unwrap_or_default()
    }

    fn set_attribute_keep_protection(&mut self, key: &str, value: &str) {
        let protect = self.attributes.is_protected(key);
        self.attributes.set(key, value, protect);
    }

    pub fn title(&self) -> &str {
        self.attribute(attributes::TITLE)
    }

    pub fn username(&self) -> &str {
        self.attribute(attributes::USERNAME)
    }

    pub fn password(&self) -> &str {
        self.attribute(attributes::PASSWORD)
    }

    pub fn url(&self) -> &str {
        self.attribute(attributes::URL)
    }

    pub fn notes(&self) -> &str {
        self.attribute(attributes::NOTES)
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_attribute_keep_protection(attributes::TITLE, title);
    }

    pub fn set_username(&mut self, username: &str) {
        self.set_attribute_keep_protection(attributes::USERNAME, username);
    }

    pub fn set_password(&mut self, password: &str) {
        self.set_attribute_keep_protection(attributes::PASSWORD, password);
    }

    pub fn set_url(&mut self, url: &str) {
        self.set_attribute_keep_protection(attributes::URL, url);
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.set_attribute_keep_protection(attributes::NOTES, notes);
    }

    /// Owning group, `None` for detached entries and history items
    pub fn group(&self) -> Option<Identifier> {
        self.group
    }

    pub(crate) fn set_group(&mut self, group: Option<Identifier>) {
        self.group = group;
    }

    pub fn history(&self) -> &[Entry] {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.history
    }

    /// Append a snapshot; it is detached and forced to this entry's uuid
    pub fn add_history_item(&mut self, mut item: Entry) {
        item.group = None;
        item.history.clear();
        item.pending_snapshot = None;
        item.uuid = self.uuid;
        self.history.push(item);
    }

    pub fn remove_history_item(&mut self, index: usize) -> Option<Entry> {
        (index < self.history.len()).then(|| self.history.remove(index))
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Copy of the current state without history, group or pending update
    pub fn snapshot(&self) -> Entry {
        Entry {
            uuid: self.uuid,
            icon: self.icon,
            foreground_color: self.foreground_color,
            background_color: self.background_color,
            override_url: self.override_url.clone(),
            tags: self.tags.clone(),
            auto_type: self.auto_type.clone(),
            times: self.times.clone(),
            attributes: self.attributes.clone(),
            attachments: self.attachments.clone(),
            history: Vec::new(),
            group: None,
            pending_snapshot: None,
        }
    }

    /// Detached copy under a fresh uuid, optionally keeping history
    pub fn clone_with_new_uuid(&self, include_history: bool) -> Entry {
        let mut copy = self.snapshot();
        copy.uuid = Identifier::random();
        if include_history {
            for item in &self.history {
                copy.add_history_item(item.clone());
            }
        }
        copy
    }

    /// Field-by-field comparison ignoring uuid, times, history and ownership
    pub fn content_eq(&self, other: &Entry) -> bool {
        self.icon == other.icon
            && self.foreground_color == other.foreground_color
            && self.background_color == other.background_color
            && self.override_url == other.override_url
            && self.tags == other.tags
            && self.auto_type == other.auto_type
            && self.attributes == other.attributes
            && self.attachments == other.attachments
    }

    /// Start a batch of edits; the current state is kept for comparison
    pub fn begin_update(&mut self) {
        self.pending_snapshot = Some(Box::new(self.snapshot()));
    }

    /// Finish a batch of edits
    ///
    /// If anything changed since [`Entry::begin_update`], the pre-edit state
    /// becomes the newest history item, history is truncated per `policy`
    /// and the modification time is refreshed. Returns whether anything
    /// changed.
    pub fn end_update(&mut self, policy: HistoryPolicy) -> bool {
        let Some(snapshot) = self.pending_snapshot.take() else {
            return false;
        };
        if self.content_eq(&snapshot) {
            return false;
        }
        self.add_history_item(*snapshot);
        self.truncate_history(policy);
        self.times.touch_modified();
        true
    }

    /// Drop history items beyond the count and size limits, oldest first
    ///
    /// Size counts attribute text plus attachment payloads, each distinct
    /// payload once; payloads still used by the current entry are free.
    pub fn truncate_history(&mut self, policy: HistoryPolicy) {
        if policy.max_items > -1 {
            let max_items = policy.max_items as usize;
            if self.history.len() > max_items {
                let excess = self.history.len() - max_items;
                self.history.drain(..excess);
            }
        }

        if policy.max_size > -1 {
            let max_size = policy.max_size as u64;
            let mut size: u64 = 0;
            let mut seen: HashSet<&[u8]> = self.attachments.values().collect();
            let mut keep = vec![true; self.history.len()];

            for (index, item) in self.history.iter().enumerate().rev() {
                if size <= max_size {
                    size += item.attributes.attributes_size() as u64;
                    for payload in item.attachments.values() {
                        if seen.insert(payload) {
                            size += payload.len() as u64;
                        }
                    }
                }
                if size > max_size {
                    keep[index] = false;
                }
            }

            let mut flags = keep.into_iter();
            self.history.retain(|_| flags.next().unwrap_or(true));
        }
    }
}
