//! Groups: named folders of entries and subgroups
//!
//! A group stores its structure as id lists. The owning [`Database`] keeps
//! the actual objects and is the only place that rewires parents, children
//! and entries, so these lists are read-only from outside the crate.
//!
//! [`Database`]: super::Database

use std::fmt;
use std::str::FromStr;

use super::{Icon, Identifier, TimeInfo};

/// Per-group policy override that can fall back to the parent's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Inherit,
    Enable,
    Disable,
}

impl TriState {
    /// Document text: `null`, `true` or `false`
    pub fn as_str(&self) -> &'static str {
        match self {
            TriState::Inherit => "null",
            TriState::Enable => "true",
            TriState::Disable => "false",
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(TriState::Inherit),
            "true" => Ok(TriState::Enable),
            "false" => Ok(TriState::Disable),
            other => Err(format!("invalid tri-state value '{}'", other)),
        }
    }
}

/// A group of entries and subgroups
#[derive(Debug, Clone)]
pub struct Group {
    uuid: Identifier,
    name: String,
    notes: String,
    icon: Icon,
    times: TimeInfo,
    is_expanded: bool,
    default_auto_type_sequence: String,
    enable_auto_type: TriState,
    enable_searching: TriState,
    last_top_visible_entry: Option<Identifier>,
    parent: Option<Identifier>,
    children: Vec<Identifier>,
    entries: Vec<Identifier>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    pub fn new() -> Self {
        Self::with_uuid(Identifier::random())
    }

    pub fn with_uuid(uuid: Identifier) -> Self {
        Self {
            uuid,
            name: String::new(),
            notes: String::new(),
            icon: Icon::Builtin(crate::DEFAULT_GROUP_ICON),
            times: TimeInfo::default(),
            is_expanded: true,
            default_auto_type_sequence: String::new(),
            enable_auto_type: TriState::Inherit,
            enable_searching: TriState::Inherit,
            last_top_visible_entry: None,
            parent: None,
            children: Vec::new(),
            entries: Vec::new(),
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.notes = notes.to_string();
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

    pub fn set_custom_icon(&mut self, uuid: Identifier) {
        self.icon = if uuid.is_null() {
            Icon::default()
        } else {
            Icon::Custom(uuid)
        };
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

    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.is_expanded = expanded;
    }

    pub fn default_auto_type_sequence(&self) -> &str {
        &self.default_auto_type_sequence
    }

    pub fn set_default_auto_type_sequence(&mut self, sequence: &str) {
        self.default_auto_type_sequence = sequence.to_string();
    }

    pub fn auto_type_enabled(&self) -> TriState {
        self.enable_auto_type
    }

    pub fn set_auto_type_enabled(&mut self, state: TriState) {
        self.enable_auto_type = state;
    }

    pub fn searching_enabled(&self) -> TriState {
        self.enable_searching
    }

    pub fn set_searching_enabled(&mut self, state: TriState) {
        self.enable_searching = state;
    }

    pub fn last_top_visible_entry(&self) -> Option<Identifier> {
        self.last_top_visible_entry
    }

    pub fn set_last_top_visible_entry(&mut self, entry: Option<Identifier>) {
        self.last_top_visible_entry = entry.filter(|uuid| !uuid.is_null());
    }

    /// Parent group id, `None` for a root or detached group
    pub fn parent(&self) -> Option<Identifier> {
        self.parent
    }

    /// Child group ids in display order
    pub fn children(&self) -> &[Identifier] {
        &self.children
    }

    /// Entry ids in display order
    pub fn entries(&self) -> &[Identifier] {
        &self.entries
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Identifier>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Identifier> {
        &mut self.children
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Identifier> {
        &mut self.entries
    }

    /// Copy of the group's own data with no structure attached
    pub fn detached_copy(&self) -> Group {
        let mut copy = self.clone();
        copy.parent = None;
        copy.children.clear();
        copy.entries.clear();
        copy
    }
}
