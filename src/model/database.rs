//! The database: an arena of groups and entries plus metadata and key data
//!
//! Groups and entries live in id-keyed maps. Downward structure is stored in
//! each group's child/entry id lists and upward references are plain ids, so
//! nothing owns anything twice and a removed object can never be reached
//! through a stale reference: lookups simply return `None`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::entry::Entry;
use super::events::{DatabaseEvent, EventBus, EventHandler, SubscriptionId};
use super::group::{Group, TriState};
use super::metadata::Metadata;
use super::{Icon, Identifier};
use crate::crypto::random_bytes;
use crate::error::{KdbxError, Result};
use crate::keys::{CompositeKey, Key, transform::TRANSFORM_SEED_LENGTH};
use crate::utils::{now, truncate_to_seconds};

/// Name given to a lazily created recycle bin
pub const RECYCLE_BIN_NAME: &str = "Recycle Bin";
/// Builtin icon of the recycle bin
pub const RECYCLE_BIN_ICON: i32 = 43;

/// Body compression of the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    None = 0,
    #[default]
    Gzip = 1,
}

impl CompressionAlgorithm {
    /// Highest value accepted in the header
    pub const MAX: u32 = 1;

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(CompressionAlgorithm::None),
            1 => Some(CompressionAlgorithm::Gzip),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Tombstone for a permanently removed group or entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedObject {
    pub uuid: Identifier,
    pub deletion_time: DateTime<Utc>,
}

impl DeletedObject {
    pub fn new(uuid: Identifier) -> Self {
        Self {
            uuid,
            deletion_time: now(),
        }
    }
}

/// A group together with its whole subtree, detached from any database
#[derive(Debug, Clone)]
pub struct GroupTree {
    pub group: Group,
    pub entries: Vec<Entry>,
    pub children: Vec<GroupTree>,
}

impl GroupTree {
    pub fn new(group: Group) -> Self {
        Self {
            group,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    fn collect_uuids(&self, groups: &mut Vec<Identifier>, entries: &mut Vec<Identifier>) {
        groups.push(self.group.uuid());
        entries.extend(self.entries.iter().map(Entry::uuid));
        for child in &self.children {
            child.collect_uuids(groups, entries);
        }
    }
}

/// Encryption parameters and the key that unlocks the database
#[derive(Debug, Clone)]
pub struct KeyData {
    cipher: Identifier,
    compression: CompressionAlgorithm,
    transform_seed: Vec<u8>,
    transform_rounds: u64,
    transformed_master_key: Vec<u8>,
    key: CompositeKey,
    has_key: bool,
}

impl Default for KeyData {
    fn default() -> Self {
        Self {
            cipher: crate::format::CIPHER_AES,
            compression: CompressionAlgorithm::Gzip,
            transform_seed: Vec::new(),
            transform_rounds: crate::DEFAULT_TRANSFORM_ROUNDS,
            transformed_master_key: Vec::new(),
            key: CompositeKey::new(),
            has_key: false,
        }
    }
}

impl Drop for KeyData {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.transformed_master_key);
    }
}

/// An open password database
#[derive(Debug)]
pub struct Database {
    uuid: Identifier,
    metadata: Metadata,
    root: Identifier,
    groups: HashMap<Identifier, Group>,
    entries: HashMap<Identifier, Entry>,
    deleted_objects: Vec<DeletedObject>,
    key_data: KeyData,
    events: EventBus,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Empty database with a fresh root group
    pub fn new() -> Self {
        let mut root = Group::new();
        root.set_name(crate::DEFAULT_ROOT_NAME);
        let root_id = root.uuid();
        let mut groups = HashMap::new();
        groups.insert(root_id, root);

        Self {
            uuid: Identifier::random(),
            metadata: Metadata::default(),
            root: root_id,
            groups,
            entries: HashMap::new(),
            deleted_objects: Vec::new(),
            key_data: KeyData::default(),
            events: EventBus::default(),
        }
    }

    /// Process-unique id of this database object
    pub fn uuid(&self) -> Identifier {
        self.uuid
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Direct metadata access without change notification
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Edit metadata and notify subscribers
    pub fn update_metadata<F: FnOnce(&mut Metadata)>(&mut self, edit: F) {
        edit(&mut self.metadata);
        self.events.emit_modified(DatabaseEvent::MetadataChanged);
    }

    // ---- events ----

    pub fn subscribe(&mut self, handler: EventHandler) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ---- lookup ----

    pub fn root_group_id(&self) -> Identifier {
        self.root
    }

    pub fn root_group(&self) -> &Group {
        // the root is inserted on construction and never removed
        &self.groups[&self.root]
    }

    /// Group by id anywhere in the tree
    pub fn resolve_group(&self, uuid: &Identifier) -> Option<&Group> {
        self.groups.get(uuid)
    }

    /// Entry by id anywhere in the tree; history items are not indexed
    pub fn resolve_entry(&self, uuid: &Identifier) -> Option<&Entry> {
        self.entries.get(uuid)
    }

    pub(crate) fn group_mut(&mut self, uuid: &Identifier) -> Option<&mut Group> {
        self.groups.get_mut(uuid)
    }

    pub(crate) fn entry_mut(&mut self, uuid: &Identifier) -> Option<&mut Entry> {
        self.entries.get_mut(uuid)
    }

    fn require_group(&self, uuid: &Identifier) -> Result<&Group> {
        self.groups
            .get(uuid)
            .ok_or(KdbxError::GroupNotFound(*uuid))
    }

    fn require_entry(&self, uuid: &Identifier) -> Result<&Entry> {
        self.entries
            .get(uuid)
            .ok_or(KdbxError::EntryNotFound(*uuid))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Direct entries of a group, in order
    pub fn entries_of(&self, group: &Identifier) -> Vec<&Entry> {
        self.groups
            .get(group)
            .map(|g| g.entries().iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default()
    }

    /// Direct subgroups of a group, in order
    pub fn children_of(&self, group: &Identifier) -> Vec<&Group> {
        self.groups
            .get(group)
            .map(|g| g.children().iter().filter_map(|id| self.groups.get(id)).collect())
            .unwrap_or_default()
    }

    /// Group ids of a subtree in pre-order
    pub fn groups_recursive(&self, group: &Identifier, include_self: bool) -> Vec<Identifier> {
        let mut result = Vec::new();
        if let Some(start) = self.groups.get(group) {
            if include_self {
                result.push(*group);
            }
            let mut stack: Vec<Identifier> = start.children().iter().rev().copied().collect();
            while let Some(id) = stack.pop() {
                if let Some(g) = self.groups.get(&id) {
                    result.push(id);
                    stack.extend(g.children().iter().rev().copied());
                }
            }
        }
        result
    }

    /// Entry ids of a subtree: a group's own entries before its subgroups'
    pub fn entries_recursive(&self, group: &Identifier) -> Vec<Identifier> {
        self.groups_recursive(group, true)
            .iter()
            .filter_map(|id| self.groups.get(id))
            .flat_map(|g| g.entries().iter().copied())
            .collect()
    }

    /// Whether `group` is `ancestor` or lies below it
    pub fn is_descendant_of(&self, group: &Identifier, ancestor: &Identifier) -> bool {
        let mut current = Some(*group);
        while let Some(id) = current {
            if id == *ancestor {
                return true;
            }
            current = self.groups.get(&id).and_then(Group::parent);
        }
        false
    }

    /// Searching flag with `Inherit` resolved through the parents
    pub fn resolve_searching_enabled(&self, group: &Identifier) -> bool {
        self.resolve_tri_state(group, Group::searching_enabled)
    }

    /// Auto-type flag with `Inherit` resolved through the parents
    pub fn resolve_auto_type_enabled(&self, group: &Identifier) -> bool {
        self.resolve_tri_state(group, Group::auto_type_enabled)
    }

    fn resolve_tri_state(&self, group: &Identifier, flag: fn(&Group) -> TriState) -> bool {
        let mut current = self.groups.get(group);
        while let Some(g) = current {
            match flag(g) {
                TriState::Enable => return true,
                TriState::Disable => return false,
                TriState::Inherit => current = g.parent().and_then(|p| self.groups.get(&p)),
            }
        }
        true
    }

    /// First non-empty default auto-type sequence up the parent chain
    pub fn resolve_default_auto_type_sequence(&self, group: &Identifier) -> String {
        let mut current = self.groups.get(group);
        while let Some(g) = current {
            if !g.default_auto_type_sequence().is_empty() {
                return g.default_auto_type_sequence().to_string();
            }
            current = g.parent().and_then(|p| self.groups.get(&p));
        }
        String::new()
    }

    // ---- structure ----

    fn check_index(len: usize, index: Option<usize>) -> Result<usize> {
        match index {
            None => Ok(len),
            Some(i) if i <= len => Ok(i),
            Some(i) => Err(KdbxError::InvalidOperation(format!(
                "index {} out of range (0..={})",
                i, len
            ))),
        }
    }

    /// Add a single group at the end of `parent`'s children
    pub fn add_group(&mut self, group: Group, parent: &Identifier) -> Result<Identifier> {
        self.insert_group_tree(GroupTree::new(group.detached_copy()), parent, None)
    }

    /// Attach a detached subtree below `parent` at `index` (end when `None`)
    ///
    /// Every group and entry id in the subtree must be new to this database.
    pub fn insert_group_tree(
        &mut self,
        tree: GroupTree,
        parent: &Identifier,
        index: Option<usize>,
    ) -> Result<Identifier> {
        let position = Self::check_index(self.require_group(parent)?.children().len(), index)?;

        let mut group_ids = Vec::new();
        let mut entry_ids = Vec::new();
        tree.collect_uuids(&mut group_ids, &mut entry_ids);
        let mut seen = std::collections::HashSet::new();
        for id in &group_ids {
            if id.is_null() || self.groups.contains_key(id) || !seen.insert(*id) {
                return Err(KdbxError::InvalidOperation(format!(
                    "group {} already exists",
                    id
                )));
            }
        }
        for id in &entry_ids {
            if id.is_null() || self.entries.contains_key(id) || !seen.insert(*id) {
                return Err(KdbxError::InvalidOperation(format!(
                    "entry {} already exists",
                    id
                )));
            }
        }

        let top = tree.group.uuid();
        self.install_tree(tree, Some(*parent));
        if let Some(p) = self.groups.get_mut(parent) {
            p.children_mut().insert(position, top);
        }
        self.events.emit_modified(DatabaseEvent::GroupAdded {
            group: top,
            parent: *parent,
        });
        Ok(top)
    }

    fn install_tree(&mut self, tree: GroupTree, parent: Option<Identifier>) {
        let GroupTree {
            group,
            entries,
            children,
        } = tree;
        let mut group = group.detached_copy();
        let id = group.uuid();
        group.set_parent(parent);

        for mut entry in entries {
            entry.set_group(Some(id));
            group.entries_mut().push(entry.uuid());
            self.entries.insert(entry.uuid(), entry);
        }
        for child in children {
            group.children_mut().push(child.group.uuid());
            self.install_tree(child, Some(id));
        }
        self.groups.insert(id, group);
    }

    /// Replace the whole tree; used when a document is loaded
    pub(crate) fn replace_root(&mut self, tree: GroupTree) {
        self.groups.clear();
        self.entries.clear();
        self.root = tree.group.uuid();
        self.install_tree(tree, None);
    }

    /// Move a group below `new_parent` at `index` (end when `None`)
    ///
    /// The root group cannot be moved, and a group cannot be moved into its
    /// own subtree.
    pub fn move_group(
        &mut self,
        group: &Identifier,
        new_parent: &Identifier,
        index: Option<usize>,
    ) -> Result<()> {
        if *group == self.root {
            return Err(KdbxError::InvalidOperation(
                "the root group cannot be moved".to_string(),
            ));
        }
        let old_parent = self
            .require_group(group)?
            .parent()
            .ok_or(KdbxError::GroupNotFound(*group))?;
        self.require_group(new_parent)?;
        if self.is_descendant_of(new_parent, group) {
            return Err(KdbxError::InvalidOperation(
                "a group cannot be moved into its own subtree".to_string(),
            ));
        }

        let mut siblings = self.groups[new_parent].children().to_vec();
        if old_parent == *new_parent {
            siblings.retain(|id| id != group);
        }
        let position = Self::check_index(siblings.len(), index)?;

        if let Some(p) = self.groups.get_mut(&old_parent) {
            p.children_mut().retain(|id| id != group);
        }
        if let Some(p) = self.groups.get_mut(new_parent) {
            p.children_mut().insert(position, *group);
        }
        if let Some(g) = self.groups.get_mut(group) {
            g.set_parent(Some(*new_parent));
            g.times_mut().set_location_changed(now());
        }
        self.events.emit_modified(DatabaseEvent::GroupMoved {
            group: *group,
            parent: *new_parent,
        });
        Ok(())
    }

    /// Add a detached entry to `group`
    pub fn add_entry(&mut self, entry: Entry, group: &Identifier) -> Result<Identifier> {
        self.require_group(group)?;
        let id = entry.uuid();
        if id.is_null() || self.entries.contains_key(&id) {
            return Err(KdbxError::InvalidOperation(format!(
                "entry {} already exists",
                id
            )));
        }
        let mut entry = entry;
        entry.set_group(Some(*group));
        self.entries.insert(id, entry);
        if let Some(g) = self.groups.get_mut(group) {
            g.entries_mut().push(id);
        }
        self.events.emit_modified(DatabaseEvent::EntryAdded {
            entry: id,
            group: *group,
        });
        Ok(id)
    }

    /// Attach an entry taken from another database
    pub fn insert_entry(&mut self, entry: Entry, group: &Identifier) -> Result<Identifier> {
        self.add_entry(entry, group)
    }

    /// Move an entry to the end of another group
    pub fn move_entry(&mut self, entry: &Identifier, group: &Identifier) -> Result<()> {
        let old_group = self.require_entry(entry)?.group();
        self.require_group(group)?;
        if old_group == Some(*group) {
            return Ok(());
        }
        if let Some(old) = old_group.and_then(|g| self.groups.get_mut(&g)) {
            old.entries_mut().retain(|id| id != entry);
        }
        if let Some(g) = self.groups.get_mut(group) {
            g.entries_mut().push(*entry);
        }
        if let Some(e) = self.entries.get_mut(entry) {
            e.set_group(Some(*group));
            e.times_mut().set_location_changed(now());
        }
        self.events.emit_modified(DatabaseEvent::EntryMoved {
            entry: *entry,
            group: *group,
        });
        Ok(())
    }

    /// Edit an entry as one update: a changed entry gets a history item
    ///
    /// Returns whether anything changed.
    pub fn update_entry<F: FnOnce(&mut Entry)>(&mut self, uuid: &Identifier, edit: F) -> Result<bool> {
        let policy = self.metadata.history_policy();
        let entry = self
            .entries
            .get_mut(uuid)
            .ok_or(KdbxError::EntryNotFound(*uuid))?;

        entry.begin_update();
        edit(entry);
        if entry.uuid() != *uuid {
            warn!("entry uuid cannot change through an update, keeping {}", uuid);
            entry.set_uuid(*uuid);
        }
        let changed = entry.end_update(policy);
        if changed {
            self.events
                .emit_modified(DatabaseEvent::EntryDataChanged(*uuid));
        }
        Ok(changed)
    }

    /// Edit a group's own data
    pub fn update_group<F: FnOnce(&mut Group)>(&mut self, uuid: &Identifier, edit: F) -> Result<()> {
        let group = self
            .groups
            .get_mut(uuid)
            .ok_or(KdbxError::GroupNotFound(*uuid))?;
        edit(group);
        if group.uuid() != *uuid {
            warn!("group uuid cannot change through an update, keeping {}", uuid);
            group.set_uuid(*uuid);
        }
        group.times_mut().touch_modified();
        self.events
            .emit_modified(DatabaseEvent::GroupDataChanged(*uuid));
        Ok(())
    }

    /// Truncate every entry's history to the current metadata limits
    pub fn apply_history_policy(&mut self) {
        let policy = self.metadata.history_policy();
        for entry in self.entries.values_mut() {
            entry.truncate_history(policy);
        }
    }

    /// Detach an entry, recording it as deleted here
    pub fn take_entry(&mut self, uuid: &Identifier) -> Result<Entry> {
        let mut entry = self
            .entries
            .remove(uuid)
            .ok_or(KdbxError::EntryNotFound(*uuid))?;
        if let Some(g) = entry.group().and_then(|g| self.groups.get_mut(&g)) {
            g.entries_mut().retain(|id| id != uuid);
        }
        self.forget_visible_entry(uuid);
        entry.set_group(None);
        self.push_deleted(*uuid);
        self.events
            .emit_modified(DatabaseEvent::EntryRemoved { entry: *uuid });
        Ok(entry)
    }

    /// Delete an entry permanently
    pub fn delete_entry(&mut self, uuid: &Identifier) -> Result<()> {
        self.take_entry(uuid).map(|_| ())
    }

    /// Detach a group with its subtree, recording every object as deleted
    pub fn take_group(&mut self, uuid: &Identifier) -> Result<GroupTree> {
        if *uuid == self.root {
            return Err(KdbxError::InvalidOperation(
                "the root group cannot be removed".to_string(),
            ));
        }
        let parent = self.require_group(uuid)?.parent();
        let tree = self.extract_tree(uuid)?;
        if let Some(p) = parent.and_then(|p| self.groups.get_mut(&p)) {
            p.children_mut().retain(|id| id != uuid);
        }
        self.events
            .emit_modified(DatabaseEvent::GroupRemoved { group: *uuid });
        Ok(tree)
    }

    fn extract_tree(&mut self, uuid: &Identifier) -> Result<GroupTree> {
        let children = self.require_group(uuid)?.children().to_vec();
        let entry_ids = self.groups[uuid].entries().to_vec();

        // entries first, then subgroups, then the group itself
        let mut entries = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            if let Some(mut entry) = self.entries.remove(&id) {
                entry.set_group(None);
                self.forget_visible_entry(&id);
                self.push_deleted(id);
                entries.push(entry);
            }
        }
        let mut subtrees = Vec::with_capacity(children.len());
        for child in children {
            subtrees.push(self.extract_tree(&child)?);
        }

        let group = self
            .groups
            .remove(uuid)
            .ok_or(KdbxError::GroupNotFound(*uuid))?
            .detached_copy();
        self.metadata.clear_group_references(uuid);
        self.push_deleted(*uuid);
        Ok(GroupTree {
            group,
            entries,
            children: subtrees,
        })
    }

    fn forget_visible_entry(&mut self, entry: &Identifier) {
        for group in self.groups.values_mut() {
            if group.last_top_visible_entry() == Some(*entry) {
                group.set_last_top_visible_entry(None);
            }
        }
    }

    /// Delete a group and everything below it permanently
    pub fn delete_group(&mut self, uuid: &Identifier) -> Result<()> {
        self.take_group(uuid).map(|_| ())
    }

    // ---- recycle bin ----

    /// The recycle bin group, if one exists
    pub fn recycle_bin(&self) -> Option<Identifier> {
        self.metadata
            .recycle_bin()
            .filter(|id| self.groups.contains_key(id))
    }

    /// Existing recycle bin, or a new one created below the root
    pub fn ensure_recycle_bin(&mut self) -> Result<Identifier> {
        if let Some(bin) = self.recycle_bin() {
            return Ok(bin);
        }
        let mut bin = Group::new();
        bin.set_name(RECYCLE_BIN_NAME);
        bin.set_icon(Icon::Builtin(RECYCLE_BIN_ICON));
        bin.set_searching_enabled(TriState::Disable);
        bin.set_auto_type_enabled(TriState::Disable);
        let root = self.root;
        let id = self.add_group(bin, &root)?;
        self.metadata.set_recycle_bin(Some(id));
        debug!("created recycle bin {}", id);
        Ok(id)
    }

    pub fn is_group_in_recycle_bin(&self, group: &Identifier) -> bool {
        self.recycle_bin()
            .is_some_and(|bin| self.is_descendant_of(group, &bin))
    }

    pub fn is_entry_in_recycle_bin(&self, entry: &Identifier) -> bool {
        self.entries
            .get(entry)
            .and_then(Entry::group)
            .is_some_and(|g| self.is_group_in_recycle_bin(&g))
    }

    /// Move an entry to the recycle bin, or delete it when the bin is
    /// disabled or the entry is already inside it
    pub fn recycle_entry(&mut self, uuid: &Identifier) -> Result<()> {
        self.require_entry(uuid)?;
        if !self.metadata.recycle_bin_enabled() || self.is_entry_in_recycle_bin(uuid) {
            return self.delete_entry(uuid);
        }
        let bin = self.ensure_recycle_bin()?;
        self.move_entry(uuid, &bin)
    }

    /// Move a group to the recycle bin, or delete it when the bin is
    /// disabled or the group is the bin or inside it
    pub fn recycle_group(&mut self, uuid: &Identifier) -> Result<()> {
        self.require_group(uuid)?;
        if !self.metadata.recycle_bin_enabled() || self.is_group_in_recycle_bin(uuid) {
            return self.delete_group(uuid);
        }
        let bin = self.ensure_recycle_bin()?;
        self.move_group(uuid, &bin, None)
    }

    /// Permanently delete everything inside the recycle bin
    pub fn empty_recycle_bin(&mut self) -> Result<()> {
        let Some(bin) = self.recycle_bin() else {
            return Ok(());
        };
        for entry in self.groups[&bin].entries().to_vec() {
            self.delete_entry(&entry)?;
        }
        for group in self.groups[&bin].children().to_vec() {
            self.delete_group(&group)?;
        }
        Ok(())
    }

    // ---- deleted objects ----

    pub fn deleted_objects(&self) -> &[DeletedObject] {
        &self.deleted_objects
    }

    /// Record a tombstone; a null id is refused
    pub fn add_deleted_object(&mut self, object: DeletedObject) -> bool {
        if object.uuid.is_null() {
            return false;
        }
        self.deleted_objects.push(DeletedObject {
            uuid: object.uuid,
            deletion_time: truncate_to_seconds(object.deletion_time),
        });
        true
    }

    pub fn clear_deleted_objects(&mut self) {
        self.deleted_objects.clear();
    }

    fn push_deleted(&mut self, uuid: Identifier) {
        self.deleted_objects.push(DeletedObject::new(uuid));
    }

    // ---- key data ----

    pub fn cipher(&self) -> Identifier {
        self.key_data.cipher
    }

    pub fn set_cipher(&mut self, cipher: Identifier) {
        self.key_data.cipher = cipher;
    }

    pub fn compression(&self) -> CompressionAlgorithm {
        self.key_data.compression
    }

    pub fn set_compression(&mut self, compression: CompressionAlgorithm) {
        self.key_data.compression = compression;
    }

    pub fn transform_seed(&self) -> &[u8] {
        &self.key_data.transform_seed
    }

    pub fn transform_rounds(&self) -> u64 {
        self.key_data.transform_rounds
    }

    pub fn transformed_master_key(&self) -> &[u8] {
        &self.key_data.transformed_master_key
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key_data.key
    }

    pub fn has_key(&self) -> bool {
        self.key_data.has_key
    }

    /// Set a new key with a fresh random transform seed
    pub fn set_key(&mut self, key: &CompositeKey) -> Result<()> {
        let seed = random_bytes(TRANSFORM_SEED_LENGTH);
        if seed.len() != TRANSFORM_SEED_LENGTH {
            return Err(KdbxError::CryptoNotInitialized);
        }
        self.set_key_with_seed(key, &seed, true)
    }

    /// Set a key with an explicit transform seed
    ///
    /// The transformed master key is derived before anything is replaced, so
    /// a failure leaves the previous key data intact.
    pub fn set_key_with_seed(
        &mut self,
        key: &CompositeKey,
        seed: &[u8],
        update_changed_time: bool,
    ) -> Result<()> {
        let transformed = key.transform(seed, self.key_data.transform_rounds)?;
        self.key_data.key = key.clone();
        self.key_data.transform_seed = seed.to_vec();
        self.key_data.transformed_master_key = transformed;
        self.key_data.has_key = true;
        if update_changed_time {
            self.metadata.set_master_key_changed(now());
        }
        self.events.emit(&DatabaseEvent::Modified);
        Ok(())
    }

    /// Install key data that a reader has already derived
    pub(crate) fn install_key_data(
        &mut self,
        key: &CompositeKey,
        seed: Vec<u8>,
        rounds: u64,
        transformed: Vec<u8>,
    ) {
        self.key_data.key = key.clone();
        self.key_data.transform_seed = seed;
        self.key_data.transform_rounds = rounds;
        self.key_data.transformed_master_key = transformed;
        self.key_data.has_key = true;
    }

    /// Whether `key` is the key currently set
    pub fn verify_key(&self, key: &CompositeKey) -> bool {
        self.key_data.has_key && self.key_data.key.raw_key() == key.raw_key()
    }

    /// Change the round count, re-deriving the master key
    ///
    /// On failure the previous round count and master key are kept.
    pub fn set_transform_rounds(&mut self, rounds: u64) -> Result<()> {
        if rounds == 0 {
            return Err(KdbxError::KeyTransform(
                "Transform rounds must be greater than 0".to_string(),
            ));
        }
        if rounds == self.key_data.transform_rounds {
            return Ok(());
        }
        if self.key_data.has_key {
            let transformed = self
                .key_data
                .key
                .transform(&self.key_data.transform_seed, rounds)?;
            self.key_data.transformed_master_key = transformed;
        }
        self.key_data.transform_rounds = rounds;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PasswordKey;
    use std::sync::{Arc, Mutex};

    fn db_with_groups() -> (Database, Identifier, Identifier) {
        let mut db = Database::new();
        let root = db.root_group_id();
        let mut a = Group::new();
        a.set_name("A");
        let a = db.add_group(a, &root).unwrap();
        let mut b = Group::new();
        b.set_name("B");
        let b = db.add_group(b, &a).unwrap();
        (db, a, b)
    }

    fn entry(title: &str) -> Entry {
        let mut entry = Entry::new();
        entry.set_title(title);
        entry
    }

    #[test]
    fn test_new_database() {
        let db = Database::new();
        assert!(!db.uuid().is_null());
        assert_eq!(db.group_count(), 1);
        assert!(db.root_group().parent().is_none());
        assert_eq!(db.compression(), CompressionAlgorithm::Gzip);
        assert_eq!(db.transform_rounds(), crate::DEFAULT_TRANSFORM_ROUNDS);
        assert!(!db.has_key());
    }

    #[test]
    fn test_add_and_resolve() {
        let (mut db, a, b) = db_with_groups();
        let e = db.add_entry(entry("one"), &b).unwrap();

        assert_eq!(db.resolve_entry(&e).unwrap().group(), Some(b));
        assert_eq!(db.resolve_group(&b).unwrap().parent(), Some(a));
        assert_eq!(db.entries_recursive(&db.root_group_id()), vec![e]);
        assert_eq!(
            db.groups_recursive(&db.root_group_id(), false),
            vec![a, b]
        );
        assert!(db.resolve_entry(&Identifier::random()).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let (mut db, a, _) = db_with_groups();
        let e = entry("x");
        let copy = e.clone();
        db.add_entry(e, &a).unwrap();
        assert!(matches!(
            db.add_entry(copy, &a),
            Err(KdbxError::InvalidOperation(_))
        ));

        let group = db.resolve_group(&a).unwrap().clone();
        assert!(db.add_group(group, &a).is_err());
    }

    #[test]
    fn test_move_group_rules() {
        let (mut db, a, b) = db_with_groups();
        let root = db.root_group_id();

        assert!(db.move_group(&root, &a, None).is_err());
        assert!(db.move_group(&a, &b, None).is_err());
        assert!(db.move_group(&b, &root, Some(5)).is_err());

        db.move_group(&b, &root, Some(0)).unwrap();
        assert_eq!(db.root_group().children(), &[b, a]);
        assert!(db.resolve_group(&a).unwrap().children().is_empty());
        assert_eq!(db.resolve_group(&b).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_move_entry() {
        let (mut db, a, b) = db_with_groups();
        let e = db.add_entry(entry("e"), &a).unwrap();
        db.move_entry(&e, &b).unwrap();
        assert!(db.resolve_group(&a).unwrap().entries().is_empty());
        assert_eq!(db.resolve_group(&b).unwrap().entries(), &[e]);
        assert_eq!(db.resolve_entry(&e).unwrap().group(), Some(b));
    }

    #[test]
    fn test_delete_group_records_every_object() {
        let (mut db, a, b) = db_with_groups();
        let e1 = db.add_entry(entry("1"), &a).unwrap();
        let e2 = db.add_entry(entry("2"), &b).unwrap();

        db.delete_group(&a).unwrap();
        let deleted: Vec<Identifier> = db.deleted_objects().iter().map(|d| d.uuid).collect();
        assert_eq!(deleted, vec![e1, e2, b, a]);
        assert_eq!(db.group_count(), 1);
        assert_eq!(db.entry_count(), 0);
        assert!(db.delete_group(&db.root_group_id()).is_err());
    }

    #[test]
    fn test_take_group_clears_visible_entry_elsewhere() {
        let (mut db, a, b) = db_with_groups();
        let inner = db.add_entry(entry("inner"), &b).unwrap();
        let root = db.root_group_id();
        db.update_group(&root, |g| g.set_last_top_visible_entry(Some(inner)))
            .unwrap();

        let tree = db.take_group(&a).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(db.root_group().last_top_visible_entry(), None);
    }

    #[test]
    fn test_update_entry_creates_history() {
        let (mut db, a, _) = db_with_groups();
        db.metadata_mut().set_history_max_items(2);
        let e = db.add_entry(entry("v0"), &a).unwrap();

        for i in 1..=4 {
            assert!(db.update_entry(&e, |en| en.set_title(&format!("v{}", i))).unwrap());
        }
        assert!(!db.update_entry(&e, |en| en.set_title("v4")).unwrap());

        let titles: Vec<&str> = db.resolve_entry(&e).unwrap().history().iter().map(|h| h.title()).collect();
        assert_eq!(titles, vec!["v2", "v3"]);
    }

    #[test]
    fn test_update_entry_keeps_uuid() {
        let (mut db, a, _) = db_with_groups();
        let e = db.add_entry(entry("x"), &a).unwrap();
        db.update_entry(&e, |en| en.set_uuid(Identifier::random())).unwrap();
        assert!(db.resolve_entry(&e).is_some());
    }

    #[test]
    fn test_searching_resolution() {
        let (mut db, a, b) = db_with_groups();
        assert!(db.resolve_searching_enabled(&b));
        db.update_group(&a, |g| g.set_searching_enabled(TriState::Disable)).unwrap();
        assert!(!db.resolve_searching_enabled(&b));
        db.update_group(&b, |g| g.set_searching_enabled(TriState::Enable)).unwrap();
        assert!(db.resolve_searching_enabled(&b));
        assert!(db.resolve_auto_type_enabled(&b));
    }

    #[test]
    fn test_default_sequence_resolution() {
        let (mut db, a, b) = db_with_groups();
        db.update_group(&a, |g| g.set_default_auto_type_sequence("{USERNAME}{ENTER}"))
            .unwrap();
        assert_eq!(db.resolve_default_auto_type_sequence(&b), "{USERNAME}{ENTER}");
    }

    #[test]
    fn test_recycle_entry_twice_deletes() {
        let (mut db, a, _) = db_with_groups();
        let e = db.add_entry(entry("trash"), &a).unwrap();

        db.recycle_entry(&e).unwrap();
        let bin = db.recycle_bin().unwrap();
        let bin_group = db.resolve_group(&bin).unwrap();
        assert_eq!(bin_group.name(), RECYCLE_BIN_NAME);
        assert_eq!(bin_group.icon(), Icon::Builtin(RECYCLE_BIN_ICON));
        assert_eq!(bin_group.parent(), Some(db.root_group_id()));
        assert!(!db.resolve_searching_enabled(&bin));
        assert!(db.is_entry_in_recycle_bin(&e));
        assert!(db.deleted_objects().is_empty());

        db.recycle_entry(&e).unwrap();
        assert!(db.resolve_entry(&e).is_none());
        assert_eq!(db.deleted_objects().len(), 1);
    }

    #[test]
    fn test_recycle_disabled_deletes() {
        let (mut db, a, b) = db_with_groups();
        db.metadata_mut().set_recycle_bin_enabled(false);
        db.recycle_group(&b).unwrap();
        assert!(db.resolve_group(&b).is_none());
        assert!(db.recycle_bin().is_none());
        assert!(db.resolve_group(&a).is_some());
    }

    #[test]
    fn test_recycle_group_and_empty_bin() {
        let (mut db, a, _) = db_with_groups();
        db.recycle_group(&a).unwrap();
        let bin = db.recycle_bin().unwrap();
        assert!(db.is_group_in_recycle_bin(&a));

        db.empty_recycle_bin().unwrap();
        assert!(db.resolve_group(&a).is_none());
        assert!(db.resolve_group(&bin).is_some());

        // deleting the bin itself clears the metadata reference
        db.recycle_group(&bin).unwrap();
        assert!(db.metadata().recycle_bin().is_none());
    }

    #[test]
    fn test_cross_database_move() {
        let (mut source, a, _) = db_with_groups();
        let e = source.add_entry(entry("moving"), &a).unwrap();
        let mut target = Database::new();
        let target_root = target.root_group_id();

        let tree = source.take_group(&a).unwrap();
        assert_eq!(source.deleted_objects().len(), 3);
        target.insert_group_tree(tree, &target_root, None).unwrap();

        assert_eq!(target.resolve_entry(&e).unwrap().title(), "moving");
        assert_eq!(target.resolve_entry(&e).unwrap().group(), Some(a));
        assert!(target.deleted_objects().is_empty());

        let taken = target.take_entry(&e).unwrap();
        assert!(taken.group().is_none());
        source.insert_entry(taken, &source.root_group_id()).unwrap();
        assert!(source.resolve_entry(&e).is_some());
    }

    #[test]
    fn test_deleted_object_null_rejected() {
        let mut db = Database::new();
        assert!(!db.add_deleted_object(DeletedObject::new(Identifier::null())));
        assert!(db.add_deleted_object(DeletedObject::new(Identifier::random())));
        assert_eq!(db.deleted_objects().len(), 1);
    }

    #[test]
    fn test_set_and_verify_key() {
        assert!(crate::crypto::initialize());
        let mut db = Database::new();
        db.set_transform_rounds(10).unwrap();
        let key = CompositeKey::new().with_key(&PasswordKey::new("secret"));
        db.set_key(&key).unwrap();

        assert!(db.has_key());
        assert!(db.verify_key(&key));
        assert!(!db.verify_key(&CompositeKey::new().with_key(&PasswordKey::new("other"))));
        assert_eq!(
            db.transformed_master_key(),
            key.transform(db.transform_seed(), 10).unwrap().as_slice()
        );
    }

    #[test]
    fn test_set_transform_rounds_rederives_and_rolls_back() {
        assert!(crate::crypto::initialize());
        let mut db = Database::new();
        db.set_transform_rounds(10).unwrap();
        let key = CompositeKey::new().with_key(&PasswordKey::new("secret"));
        db.set_key(&key).unwrap();
        let before = db.transformed_master_key().to_vec();

        db.set_transform_rounds(20).unwrap();
        assert_ne!(db.transformed_master_key(), before.as_slice());

        let current = db.transformed_master_key().to_vec();
        assert!(db.set_transform_rounds(0).is_err());
        assert_eq!(db.transform_rounds(), 20);
        assert_eq!(db.transformed_master_key(), current.as_slice());
    }

    #[test]
    fn test_set_key_bad_seed_keeps_previous() {
        assert!(crate::crypto::initialize());
        let mut db = Database::new();
        db.set_transform_rounds(5).unwrap();
        let key = CompositeKey::new().with_key(&PasswordKey::new("a"));
        db.set_key(&key).unwrap();
        let other = CompositeKey::new().with_key(&PasswordKey::new("b"));
        assert!(db.set_key_with_seed(&other, &[0u8; 3], true).is_err());
        assert!(db.verify_key(&key));
    }

    #[test]
    fn test_events_emitted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut db = Database::new();
        let sink = Arc::clone(&seen);
        db.subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));

        let root = db.root_group_id();
        let e = db.add_entry(entry("x"), &root).unwrap();
        db.delete_entry(&e).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                DatabaseEvent::EntryAdded { entry: e, group: root },
                DatabaseEvent::Modified,
                DatabaseEvent::EntryRemoved { entry: e },
                DatabaseEvent::Modified,
            ]
        );
    }

    #[test]
    fn test_compression_values() {
        assert_eq!(CompressionAlgorithm::from_u32(0), Some(CompressionAlgorithm::None));
        assert_eq!(CompressionAlgorithm::from_u32(1), Some(CompressionAlgorithm::Gzip));
        assert_eq!(CompressionAlgorithm::from_u32(2), None);
        assert_eq!(CompressionAlgorithm::Gzip.as_u32(), 1);
    }
}
