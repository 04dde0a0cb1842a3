//! KeePass XML document to database
//!
//! A small pull parser over `xml-rs`. Protected values are decrypted as they
//! are met, so the inner random stream stays in step with the writer.
//! Attachment references are resolved once the whole document is read,
//! because the binary pool in `Meta` may follow the entries that use it.
//!
//! In strict mode every schema violation fails the read. In lenient mode
//! the reader repairs what it can (fresh uuids, default values, dropped
//! records) and reports each repair as a warning.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use tracing::{debug, warn};
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use super::sanitize::is_valid_xml_char;
use crate::error::{KdbxError, Result};
use crate::format::random_stream::ProtectedStream;
use crate::model::attributes::is_default_attribute;
use crate::model::{
    AutoTypeAssociation, AutoTypeSettings, Color, Database, DeletedObject, Entry, Group,
    GroupTree, Identifier, Metadata, TimeInfo, TriState,
};
use crate::utils::{now, parse_datetime};

/// Result of reading a document
#[derive(Debug)]
pub struct ParsedDocument {
    pub database: Database,
    /// `Meta/HeaderHash`, if the document carries one
    pub header_hash: Option<Vec<u8>>,
    /// Problems repaired in lenient mode
    pub warnings: Vec<String>,
}

/// Parses a KeePass XML document into a [`Database`]
#[derive(Debug, Clone, Default)]
pub struct XmlReader {
    strict: bool,
}

impl XmlReader {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Parse `data`
    ///
    /// `stream` decrypts values marked `Protected="True"`; it must be
    /// positioned at the start of its keystream.
    pub fn read_database(
        &self,
        data: &[u8],
        stream: Option<&mut ProtectedStream>,
    ) -> Result<ParsedDocument> {
        let events = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .cdata_to_characters(true)
            .ignore_comments(true)
            .coalesce_characters(true)
            .create_reader(data);

        let mut parser = Parser {
            events,
            strict: self.strict,
            stream,
            warnings: Vec::new(),
            metadata: Metadata::new(),
            header_hash: None,
            root: None,
            deleted: Vec::new(),
            binary_pool: HashMap::new(),
            pending_binaries: Vec::new(),
            seen_groups: HashSet::new(),
            seen_entries: HashSet::new(),
        };
        parser.parse_document()?;
        parser.finish()
    }
}

struct StartTag {
    name: String,
    attributes: Vec<OwnedAttribute>,
}

impl StartTag {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local_name == name)
            .map(|a| a.value.as_str())
    }

    fn flag(&self, name: &str) -> bool {
        self.attribute(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// An attachment reference waiting for the binary pool
struct PendingBinary {
    entry: Identifier,
    history: Option<usize>,
    key: String,
    reference: String,
}

/// An entry as read, before its uuid and history are settled
struct ParsedEntry {
    entry: Entry,
    uuid: Option<Identifier>,
    references: Vec<(String, String)>,
    history: Vec<ParsedEntry>,
}

struct Parser<'d, 's> {
    events: EventReader<&'d [u8]>,
    strict: bool,
    stream: Option<&'s mut ProtectedStream>,
    warnings: Vec<String>,
    metadata: Metadata,
    header_hash: Option<Vec<u8>>,
    root: Option<GroupTree>,
    deleted: Vec<DeletedObject>,
    binary_pool: HashMap<String, Vec<u8>>,
    pending_binaries: Vec<PendingBinary>,
    seen_groups: HashSet<Identifier>,
    seen_entries: HashSet<Identifier>,
}

impl Parser<'_, '_> {
    // ---- pull primitives ----

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Schema violation: an error in strict mode, a warning otherwise
    fn violation(&mut self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        if self.strict {
            Err(KdbxError::Document(message))
        } else {
            self.warn(message);
            Ok(())
        }
    }

    /// Next child element of the current element, or `None` at its end tag
    fn next_child(&mut self) -> Result<Option<StartTag>> {
        loop {
            match self.events.next()? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    return Ok(Some(StartTag {
                        name: name.local_name,
                        attributes,
                    }));
                }
                XmlEvent::EndElement { .. } => return Ok(None),
                XmlEvent::EndDocument => {
                    return Err(KdbxError::Xml("Unexpected end of document".to_string()));
                }
                XmlEvent::Characters(text) => check_text(&text)?,
                _ => {}
            }
        }
    }

    /// Text content of the current element, consuming its end tag
    fn read_text(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.events.next()? {
                XmlEvent::Characters(chunk) | XmlEvent::Whitespace(chunk) | XmlEvent::CData(chunk) => {
                    check_text(&chunk)?;
                    text.push_str(&chunk);
                }
                XmlEvent::StartElement { name, .. } => {
                    debug!("ignoring nested element <{}> in text", name.local_name);
                    self.skip()?;
                }
                XmlEvent::EndElement { .. } => return Ok(text),
                XmlEvent::EndDocument => {
                    return Err(KdbxError::Xml("Unexpected end of document".to_string()));
                }
                _ => {}
            }
        }
    }

    /// Skip the rest of the current element
    fn skip(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.events.next()? {
                XmlEvent::StartElement { .. } => depth += 1,
                XmlEvent::EndElement { .. } => depth -= 1,
                XmlEvent::Characters(text) => check_text(&text)?,
                XmlEvent::EndDocument => {
                    return Err(KdbxError::Xml("Unexpected end of document".to_string()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn skip_unknown(&mut self, tag: &StartTag, parent: &str) -> Result<()> {
        debug!("skipping unknown element <{}> in <{}>", tag.name, parent);
        self.skip()
    }

    // ---- typed values ----

    fn read_bool(&mut self) -> Result<bool> {
        let text = self.read_text()?;
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if text.eq_ignore_ascii_case("false") || text.is_empty() {
            Ok(false)
        } else {
            self.violation(format!("Invalid bool value: {}", text))?;
            Ok(false)
        }
    }

    fn read_number<N: std::str::FromStr + Default>(&mut self) -> Result<N> {
        let text = self.read_text()?;
        match text.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.violation(format!("Invalid number value: {}", text.trim()))?;
                Ok(N::default())
            }
        }
    }

    fn read_datetime(&mut self) -> Result<DateTime<Utc>> {
        let text = self.read_text()?;
        match parse_datetime(text.trim()) {
            Some(dt) => Ok(dt),
            None => {
                self.violation(format!("Invalid date time value: {}", text.trim()))?;
                Ok(now())
            }
        }
    }

    fn read_color(&mut self) -> Result<Option<Color>> {
        let text = self.read_text()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        match Color::parse(text) {
            Some(color) => Ok(Some(color)),
            None => {
                self.violation(format!("Invalid color value: {}", text))?;
                Ok(None)
            }
        }
    }

    fn read_tristate(&mut self) -> Result<TriState> {
        let text = self.read_text()?;
        match text.trim().parse() {
            Ok(state) => Ok(state),
            Err(_) => {
                self.violation(format!("Invalid EnableAutoType / EnableSearching value: {}", text.trim()))?;
                Ok(TriState::Inherit)
            }
        }
    }

    fn read_binary(&mut self) -> Result<Option<Vec<u8>>> {
        let text = self.read_text()?;
        match STANDARD.decode(text.trim()) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                self.violation(format!("Invalid base64 data: {}", e))?;
                Ok(None)
            }
        }
    }

    /// A uuid; empty text is the null uuid
    fn read_uuid(&mut self) -> Result<Identifier> {
        let text = self.read_text()?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Identifier::null());
        }
        match Identifier::from_base64(text) {
            Some(uuid) => Ok(uuid),
            None => {
                self.violation(format!("Invalid uuid value: {}", text))?;
                Ok(Identifier::null())
            }
        }
    }

    /// A uuid reference; null means no reference
    fn read_uuid_ref(&mut self) -> Result<Option<Identifier>> {
        let uuid = self.read_uuid()?;
        Ok((!uuid.is_null()).then_some(uuid))
    }

    // ---- document ----

    fn parse_document(&mut self) -> Result<()> {
        let root = loop {
            match self.events.next()? {
                XmlEvent::StartElement { name, .. } => break name.local_name,
                XmlEvent::EndDocument => {
                    return Err(KdbxError::Xml("Document has no root element".to_string()));
                }
                _ => {}
            }
        };
        if root != "KeePassFile" {
            return Err(KdbxError::Document(format!(
                "Not a KeePass document: root element is <{}>",
                root
            )));
        }

        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Meta" => self.parse_meta()?,
                "Root" => self.parse_root()?,
                _ => self.skip_unknown(&tag, "KeePassFile")?,
            }
        }
        Ok(())
    }

    fn parse_meta(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Generator" => {
                    let text = self.read_text()?;
                    self.metadata.set_generator(&text);
                }
                "HeaderHash" => self.header_hash = self.read_binary()?,
                "DatabaseName" => {
                    let text = self.read_text()?;
                    self.metadata.set_name(&text);
                }
                "DatabaseNameChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_name_changed(dt);
                }
                "DatabaseDescription" => {
                    let text = self.read_text()?;
                    self.metadata.set_description(&text);
                }
                "DatabaseDescriptionChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_description_changed(dt);
                }
                "DefaultUserName" => {
                    let text = self.read_text()?;
                    self.metadata.set_default_user_name(&text);
                }
                "DefaultUserNameChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_default_user_name_changed(dt);
                }
                "MaintenanceHistoryDays" => {
                    let days = self.read_number()?;
                    self.metadata.set_maintenance_history_days(days);
                }
                "Color" => {
                    let color = self.read_color()?;
                    self.metadata.set_color(color);
                }
                "MasterKeyChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_master_key_changed(dt);
                }
                "MasterKeyChangeRec" => {
                    let days = self.read_number()?;
                    self.metadata.set_master_key_change_rec(days);
                }
                "MasterKeyChangeForce" => {
                    let days = self.read_number()?;
                    self.metadata.set_master_key_change_force(days);
                }
                "MemoryProtection" => self.parse_memory_protection()?,
                "CustomIcons" => self.parse_custom_icons()?,
                "RecycleBinEnabled" => {
                    let enabled = self.read_bool()?;
                    self.metadata.set_recycle_bin_enabled(enabled);
                }
                "RecycleBinUUID" => {
                    let group = self.read_uuid_ref()?;
                    self.metadata.set_recycle_bin(group);
                }
                "RecycleBinChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_recycle_bin_changed(dt);
                }
                "EntryTemplatesGroup" => {
                    let group = self.read_uuid_ref()?;
                    self.metadata.set_entry_templates_group(group);
                }
                "EntryTemplatesGroupChanged" => {
                    let dt = self.read_datetime()?;
                    self.metadata.set_entry_templates_group_changed(dt);
                }
                "LastSelectedGroup" => {
                    let group = self.read_uuid_ref()?;
                    self.metadata.set_last_selected_group(group);
                }
                "LastTopVisibleGroup" => {
                    let group = self.read_uuid_ref()?;
                    self.metadata.set_last_top_visible_group(group);
                }
                "HistoryMaxItems" => {
                    let max_items: i32 = self.read_number()?;
                    if max_items < -1 {
                        self.violation("HistoryMaxItems invalid number")?;
                    } else {
                        self.metadata.set_history_max_items(max_items);
                    }
                }
                "HistoryMaxSize" => {
                    let max_size: i64 = self.read_number()?;
                    if max_size < -1 {
                        self.violation("HistoryMaxSize invalid number")?;
                    } else {
                        self.metadata.set_history_max_size(max_size);
                    }
                }
                "Binaries" => self.parse_binaries()?,
                "CustomData" => self.parse_custom_data()?,
                _ => self.skip_unknown(&tag, "Meta")?,
            }
        }
        Ok(())
    }

    fn parse_memory_protection(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            let flag = match tag.name.as_str() {
                "ProtectTitle" | "ProtectUserName" | "ProtectPassword" | "ProtectURL"
                | "ProtectNotes" => self.read_bool()?,
                _ => {
                    self.skip_unknown(&tag, "MemoryProtection")?;
                    continue;
                }
            };
            let protection = self.metadata.memory_protection_mut();
            match tag.name.as_str() {
                "ProtectTitle" => protection.title = flag,
                "ProtectUserName" => protection.username = flag,
                "ProtectPassword" => protection.password = flag,
                "ProtectURL" => protection.url = flag,
                _ => protection.notes = flag,
            }
        }
        Ok(())
    }

    fn parse_custom_icons(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            if tag.name != "Icon" {
                self.skip_unknown(&tag, "CustomIcons")?;
                continue;
            }

            let mut uuid = Identifier::null();
            let mut data = None;
            while let Some(field) = self.next_child()? {
                match field.name.as_str() {
                    "UUID" => uuid = self.read_uuid()?,
                    "Data" => data = self.read_binary()?,
                    _ => self.skip_unknown(&field, "Icon")?,
                }
            }

            match data {
                Some(data) if !uuid.is_null() => {
                    if !self.metadata.add_custom_icon(uuid, data) {
                        self.violation(format!("Duplicate custom icon {}", uuid))?;
                    }
                }
                _ => self.violation("Missing icon uuid or data")?,
            }
        }
        Ok(())
    }

    fn parse_binaries(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            if tag.name != "Binary" {
                self.skip_unknown(&tag, "Binaries")?;
                continue;
            }

            let id = tag.attribute("ID").map(str::to_string);
            let compressed = tag.flag("Compressed");
            let Some(mut data) = self.read_binary()? else {
                continue;
            };
            if compressed {
                let mut inflated = Vec::new();
                if let Err(e) = GzDecoder::new(data.as_slice()).read_to_end(&mut inflated) {
                    self.violation(format!("Unable to decompress binary: {}", e))?;
                    continue;
                }
                data = inflated;
            }

            match id {
                Some(id) if self.binary_pool.contains_key(&id) => {
                    self.violation(format!("Duplicate binary id {}", id))?;
                    self.binary_pool.insert(id, data);
                }
                Some(id) => {
                    self.binary_pool.insert(id, data);
                }
                None => self.violation("Binary without id")?,
            }
        }
        Ok(())
    }

    fn parse_custom_data(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            if tag.name != "Item" {
                self.skip_unknown(&tag, "CustomData")?;
                continue;
            }

            let mut key = None;
            let mut value = None;
            while let Some(field) = self.next_child()? {
                match field.name.as_str() {
                    "Key" => key = Some(self.read_text()?),
                    "Value" => value = Some(self.read_text()?),
                    _ => self.skip_unknown(&field, "Item")?,
                }
            }

            match (key, value) {
                (Some(key), Some(value)) => self.metadata.set_custom_data(&key, &value),
                _ => self.violation("Missing custom data key or value")?,
            }
        }
        Ok(())
    }

    fn parse_root(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Group" => {
                    if self.root.is_some() {
                        return Err(KdbxError::Document("Multiple group elements".to_string()));
                    }
                    let tree = self.parse_group()?;
                    self.root = Some(tree);
                }
                "DeletedObjects" => self.parse_deleted_objects()?,
                _ => self.skip_unknown(&tag, "Root")?,
            }
        }
        Ok(())
    }

    fn parse_deleted_objects(&mut self) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            if tag.name != "DeletedObject" {
                self.skip_unknown(&tag, "DeletedObjects")?;
                continue;
            }

            let mut object = DeletedObject::new(Identifier::null());
            while let Some(field) = self.next_child()? {
                match field.name.as_str() {
                    "UUID" => object.uuid = self.read_uuid()?,
                    "DeletionTime" => object.deletion_time = self.read_datetime()?,
                    _ => self.skip_unknown(&field, "DeletedObject")?,
                }
            }

            if object.uuid.is_null() {
                self.violation("Null DeleteObject uuid")?;
            } else {
                self.deleted.push(object);
            }
        }
        Ok(())
    }

    fn parse_group(&mut self) -> Result<GroupTree> {
        let mut group = Group::with_uuid(Identifier::null());
        let mut uuid = Identifier::null();
        let mut entries = Vec::new();
        let mut children = Vec::new();

        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "UUID" => uuid = self.read_uuid()?,
                "Name" => {
                    let text = self.read_text()?;
                    group.set_name(&text);
                }
                "Notes" => {
                    let text = self.read_text()?;
                    group.set_notes(&text);
                }
                "IconID" => {
                    let number: i32 = self.read_number()?;
                    if number < 0 {
                        self.violation("Invalid group icon number")?;
                    } else {
                        group.set_icon_number(number);
                    }
                }
                "CustomIconUUID" => {
                    if let Some(icon) = self.read_uuid_ref()? {
                        group.set_custom_icon(icon);
                    }
                }
                "Times" => self.parse_times(group.times_mut())?,
                "IsExpanded" => {
                    let expanded = self.read_bool()?;
                    group.set_expanded(expanded);
                }
                "DefaultAutoTypeSequence" => {
                    let text = self.read_text()?;
                    group.set_default_auto_type_sequence(&text);
                }
                "EnableAutoType" => {
                    let state = self.read_tristate()?;
                    group.set_auto_type_enabled(state);
                }
                "EnableSearching" => {
                    let state = self.read_tristate()?;
                    group.set_searching_enabled(state);
                }
                "LastTopVisibleEntry" => {
                    let entry = self.read_uuid_ref()?;
                    group.set_last_top_visible_entry(entry);
                }
                "Entry" => {
                    let parsed = self.parse_entry(false)?;
                    entries.push(self.settle_entry(parsed)?);
                }
                "Group" => children.push(self.parse_group()?),
                _ => self.skip_unknown(&tag, "Group")?,
            }
        }

        if uuid.is_null() {
            self.violation("Null group uuid")?;
            uuid = Identifier::random();
        } else if self.seen_groups.contains(&uuid) {
            self.violation(format!("Duplicate group uuid {}", uuid))?;
            uuid = Identifier::random();
        }
        self.seen_groups.insert(uuid);
        group.set_uuid(uuid);

        Ok(GroupTree {
            group,
            entries,
            children,
        })
    }

    fn parse_times(&mut self, times: &mut TimeInfo) -> Result<()> {
        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "LastModificationTime" => times.set_last_modification_time(self.read_datetime()?),
                "CreationTime" => times.set_creation_time(self.read_datetime()?),
                "LastAccessTime" => times.set_last_access_time(self.read_datetime()?),
                "ExpiryTime" => times.set_expiry_time(self.read_datetime()?),
                "Expires" => times.set_expires(self.read_bool()?),
                "UsageCount" => times.set_usage_count(self.read_number()?),
                "LocationChanged" => times.set_location_changed(self.read_datetime()?),
                _ => self.skip_unknown(&tag, "Times")?,
            }
        }
        Ok(())
    }

    fn parse_entry(&mut self, is_history: bool) -> Result<ParsedEntry> {
        let mut parsed = ParsedEntry {
            entry: Entry::with_uuid(Identifier::null()),
            uuid: None,
            references: Vec::new(),
            history: Vec::new(),
        };
        let mut attachment_keys: HashSet<String> = HashSet::new();

        while let Some(tag) = self.next_child()? {
            let entry = &mut parsed.entry;
            match tag.name.as_str() {
                "UUID" => parsed.uuid = Some(self.read_uuid()?),
                "IconID" => {
                    let number: i32 = self.read_number()?;
                    if number < 0 {
                        self.violation("Invalid entry icon number")?;
                    } else {
                        entry.set_icon_number(number);
                    }
                }
                "CustomIconUUID" => {
                    if let Some(icon) = self.read_uuid_ref()? {
                        entry.set_custom_icon(icon);
                    }
                }
                "ForegroundColor" => {
                    let color = self.read_color()?;
                    entry.set_foreground_color(color);
                }
                "BackgroundColor" => {
                    let color = self.read_color()?;
                    entry.set_background_color(color);
                }
                "OverrideURL" => {
                    let text = self.read_text()?;
                    entry.set_override_url(&text);
                }
                "Tags" => {
                    let text = self.read_text()?;
                    entry.set_tags(&text);
                }
                "Times" => self.parse_times(entry.times_mut())?,
                "String" => self.parse_entry_string(&mut parsed.entry)?,
                "Binary" => {
                    if let Some((key, value)) = self.parse_entry_binary()? {
                        if !attachment_keys.insert(key.clone()) {
                            self.violation(format!("Duplicate attachment found: {}", key))?;
                        }
                        match value {
                            BinaryValue::Inline(data) => {
                                parsed.entry.attachments_mut().set(&key, data);
                            }
                            BinaryValue::Reference(reference) => {
                                parsed.references.retain(|(k, _)| *k != key);
                                parsed.references.push((key, reference));
                            }
                        }
                    }
                }
                "AutoType" => {
                    let auto_type = self.parse_auto_type()?;
                    *parsed.entry.auto_type_mut() = auto_type;
                }
                "History" => {
                    if is_history {
                        self.violation("History element in history entry")?;
                        self.skip()?;
                    } else {
                        while let Some(item) = self.next_child()? {
                            if item.name == "Entry" {
                                let history_entry = self.parse_entry(true)?;
                                parsed.history.push(history_entry);
                            } else {
                                self.skip_unknown(&item, "History")?;
                            }
                        }
                    }
                }
                _ => self.skip_unknown(&tag, "Entry")?,
            }
        }

        Ok(parsed)
    }

    /// Settle the uuid of an entry and its history and queue its attachment
    /// references
    fn settle_entry(&mut self, parsed: ParsedEntry) -> Result<Entry> {
        let ParsedEntry {
            mut entry,
            uuid,
            references,
            history,
        } = parsed;

        let mut uuid = uuid.unwrap_or_default();
        if uuid.is_null() {
            self.violation("Null entry uuid")?;
            uuid = Identifier::random();
        } else if self.seen_entries.contains(&uuid) {
            self.violation(format!("Duplicate entry uuid {}", uuid))?;
            uuid = Identifier::random();
        }
        self.seen_entries.insert(uuid);
        entry.set_uuid(uuid);
        self.queue_references(uuid, None, references);

        for (index, item) in history.into_iter().enumerate() {
            let item_uuid = item.uuid.unwrap_or_default();
            if item_uuid != uuid {
                self.violation("History element with different uuid")?;
            }
            self.queue_references(uuid, Some(index), item.references);
            entry.add_history_item(item.entry);
        }

        Ok(entry)
    }

    fn queue_references(
        &mut self,
        entry: Identifier,
        history: Option<usize>,
        references: Vec<(String, String)>,
    ) {
        self.pending_binaries
            .extend(references.into_iter().map(|(key, reference)| PendingBinary {
                entry,
                history,
                key,
                reference,
            }));
    }

    fn parse_entry_string(&mut self, entry: &mut Entry) -> Result<()> {
        let mut key = None;
        let mut value = None;
        let mut protect = false;

        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Key" => key = Some(self.read_text()?),
                "Value" => {
                    let text = self.read_text()?;
                    if tag.flag("Protected") {
                        protect = true;
                        value = Some(self.unprotect(&text)?);
                    } else {
                        protect = tag.flag("ProtectInMemory");
                        value = Some(text);
                    }
                }
                _ => self.skip_unknown(&tag, "String")?,
            }
        }

        let (Some(key), Some(value)) = (key, value) else {
            return self.violation("Entry string key or value missing");
        };
        if key.is_empty() {
            return self.violation("Entry string key is empty");
        }

        let attributes = entry.attributes_mut();
        let duplicate = if is_default_attribute(&key) {
            attributes.value(&key).is_some_and(|v| !v.is_empty())
        } else {
            attributes.has_key(&key)
        };
        if duplicate {
            self.violation(format!("Duplicate custom attribute found: {}", key))?;
        }
        entry.attributes_mut().set(&key, &value, protect);
        Ok(())
    }

    /// Decrypt a `Protected="True"` value with the inner stream
    fn unprotect(&mut self, text: &str) -> Result<String> {
        // Every protected value consumes keystream, readable or not
        let hidden = match STANDARD.decode(text.trim()) {
            Ok(data) => data,
            Err(e) => {
                self.violation(format!("Invalid base64 data: {}", e))?;
                decode_base64_lenient(text)
            }
        };
        let Some(stream) = self.stream.as_deref_mut() else {
            self.violation("Protected value without inner random stream")?;
            return Ok(text.to_string());
        };
        let plain = stream.process(&hidden)?;
        match String::from_utf8(plain) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.violation("Protected value is not valid UTF-8")?;
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }

    fn read_base64(&mut self, text: &str) -> Result<Option<Vec<u8>>> {
        match STANDARD.decode(text.trim()) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                self.violation(format!("Invalid base64 data: {}", e))?;
                Ok(None)
            }
        }
    }

    fn parse_entry_binary(&mut self) -> Result<Option<(String, BinaryValue)>> {
        let mut key = None;
        let mut value = None;

        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Key" => key = Some(self.read_text()?),
                "Value" => {
                    if let Some(reference) = tag.attribute("Ref") {
                        let reference = reference.to_string();
                        self.skip()?;
                        value = Some(BinaryValue::Reference(reference));
                    } else {
                        let compressed = tag.flag("Compressed");
                        let text = self.read_text()?;
                        if let Some(mut data) = self.read_base64(&text)? {
                            if compressed {
                                let mut inflated = Vec::new();
                                GzDecoder::new(data.as_slice())
                                    .read_to_end(&mut inflated)
                                    .map_err(|e| KdbxError::Decompression(e.to_string()))?;
                                data = inflated;
                            }
                            value = Some(BinaryValue::Inline(data));
                        }
                    }
                }
                _ => self.skip_unknown(&tag, "Binary")?,
            }
        }

        match (key, value) {
            (Some(key), Some(value)) => Ok(Some((key, value))),
            _ => {
                self.violation("Entry binary key or value missing")?;
                Ok(None)
            }
        }
    }

    fn parse_auto_type(&mut self) -> Result<AutoTypeSettings> {
        let mut settings = AutoTypeSettings::default();
        while let Some(tag) = self.next_child()? {
            match tag.name.as_str() {
                "Enabled" => settings.enabled = self.read_bool()?,
                "DataTransferObfuscation" => settings.obfuscation = self.read_number()?,
                "DefaultSequence" => settings.default_sequence = self.read_text()?,
                "Association" => {
                    let mut association = AutoTypeAssociation::default();
                    while let Some(field) = self.next_child()? {
                        match field.name.as_str() {
                            "Window" => association.window = self.read_text()?,
                            "KeystrokeSequence" => association.sequence = self.read_text()?,
                            _ => self.skip_unknown(&field, "Association")?,
                        }
                    }
                    settings.associations.push(association);
                }
                _ => self.skip_unknown(&tag, "AutoType")?,
            }
        }
        Ok(settings)
    }

    // ---- finish ----

    fn finish(mut self) -> Result<ParsedDocument> {
        let Some(mut root) = self.root.take() else {
            return Err(KdbxError::Document("No root group".to_string()));
        };

        self.resolve_binaries(&mut root)?;
        self.drop_dangling_references(&mut root);

        let mut database = Database::new();
        *database.metadata_mut() = self.metadata;
        database.replace_root(root);
        for object in self.deleted {
            database.add_deleted_object(object);
        }

        Ok(ParsedDocument {
            database,
            header_hash: self.header_hash,
            warnings: self.warnings,
        })
    }

    fn resolve_binaries(&mut self, root: &mut GroupTree) -> Result<()> {
        let mut by_entry: HashMap<Identifier, Vec<PendingBinary>> = HashMap::new();
        for pending in std::mem::take(&mut self.pending_binaries) {
            by_entry.entry(pending.entry).or_default().push(pending);
        }

        let mut used = HashSet::new();
        let mut unmapped = Vec::new();
        for_each_entry_mut(root, &mut |entry| {
            let Some(pending) = by_entry.remove(&entry.uuid()) else {
                return;
            };
            for binary in pending {
                let Some(data) = self.binary_pool.get(&binary.reference) else {
                    unmapped.push(binary.reference);
                    continue;
                };
                used.insert(binary.reference.clone());
                let target = match binary.history {
                    None => Some(&mut *entry),
                    Some(index) => entry.history_mut().get_mut(index),
                };
                if let Some(target) = target {
                    target.attachments_mut().set(&binary.key, data.clone());
                }
            }
        });

        for reference in unmapped {
            self.violation(format!("Unmapped binary reference {}", reference))?;
        }
        let mut unused: Vec<&String> =
            self.binary_pool.keys().filter(|id| !used.contains(*id)).collect();
        unused.sort();
        for id in unused {
            debug!("binary {} in the pool is never referenced", id);
        }
        Ok(())
    }

    /// Clear references to groups and entries the document does not contain
    fn drop_dangling_references(&mut self, root: &mut GroupTree) {
        let groups = &self.seen_groups;
        let entries = &self.seen_entries;
        let mut messages = Vec::new();

        let metadata = &mut self.metadata;
        if let Some(id) = metadata.recycle_bin().filter(|id| !groups.contains(id)) {
            messages.push(format!("Recycle bin {} does not exist", id));
            metadata.set_recycle_bin(None);
        }
        if let Some(id) = metadata.entry_templates_group().filter(|id| !groups.contains(id)) {
            messages.push(format!("Entry templates group {} does not exist", id));
            metadata.set_entry_templates_group(None);
        }
        if let Some(id) = metadata.last_selected_group().filter(|id| !groups.contains(id)) {
            messages.push(format!("Last selected group {} does not exist", id));
            metadata.set_last_selected_group(None);
        }
        if let Some(id) = metadata.last_top_visible_group().filter(|id| !groups.contains(id)) {
            messages.push(format!("Last top visible group {} does not exist", id));
            metadata.set_last_top_visible_group(None);
        }

        for_each_group_mut(root, &mut |group| {
            if let Some(id) = group.last_top_visible_entry().filter(|id| !entries.contains(id)) {
                messages.push(format!("Last top visible entry {} does not exist", id));
                group.set_last_top_visible_entry(None);
            }
        });

        for message in messages {
            self.warn(message);
        }
    }
}

enum BinaryValue {
    Inline(Vec<u8>),
    Reference(String),
}

/// Text containing characters XML forbids makes the document malformed
fn check_text(text: &str) -> Result<()> {
    match text.chars().find(|c| !is_valid_xml_char(*c)) {
        Some(c) => Err(KdbxError::Xml(format!(
            "Invalid character U+{:04X} in document text",
            c as u32
        ))),
        None => Ok(()),
    }
}

fn for_each_entry_mut(tree: &mut GroupTree, f: &mut impl FnMut(&mut Entry)) {
    for entry in &mut tree.entries {
        f(entry);
    }
    for child in &mut tree.children {
        for_each_entry_mut(child, f);
    }
}

fn for_each_group_mut(tree: &mut GroupTree, f: &mut impl FnMut(&mut Group)) {
    f(&mut tree.group);
    for child in &mut tree.children {
        for_each_group_mut(child, f);
    }
}

/// Decoder for damaged protected values: padding optional, stray bits kept
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Decode `text` skipping every character outside the base64 alphabet
fn decode_base64_lenient(text: &str) -> Vec<u8> {
    let mut symbols: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();
    if symbols.len() % 4 == 1 {
        symbols.pop();
    }
    LENIENT_BASE64.decode(symbols).unwrap_or_default()
}
