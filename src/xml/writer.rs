//! Database to KeePass XML document
//!
//! Elements are written in a fixed order and protected values draw from the
//! inner random stream in exactly that order, which the reader mirrors.

use std::collections::HashMap;
use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use super::sanitize::strip_invalid_xml_chars;
use crate::error::Result;
use crate::format::random_stream::ProtectedStream;
use crate::model::{
    Color, CompressionAlgorithm, Database, Entry, Group, Icon, Identifier, TimeInfo,
};
use crate::utils::format_datetime;

/// Serializes a [`Database`] into its XML document
#[derive(Debug, Clone)]
pub struct XmlWriter {
    indent: bool,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self { indent: true }
    }
}

impl XmlWriter {
    pub fn new(indent: bool) -> Self {
        Self { indent }
    }

    /// Serialize `database`
    ///
    /// # Arguments
    /// * `header_hash` - SHA-256 of the container header, stored in `Meta`
    /// * `stream` - inner random stream; without one, protected values are
    ///   written in clear and flagged `ProtectInMemory`
    pub fn write_database(
        &self,
        database: &Database,
        header_hash: Option<&[u8]>,
        stream: Option<&mut ProtectedStream>,
    ) -> Result<Vec<u8>> {
        let xml = EmitterConfig::new()
            .perform_indent(self.indent)
            .indent_string("\t")
            .create_writer(Vec::new());

        let mut emitter = Emitter {
            xml,
            database,
            stream,
            binary_ids: HashMap::new(),
            binaries: Vec::new(),
        };
        emitter.collect_binaries();
        emitter.write_document(header_hash)?;
        Ok(emitter.xml.into_inner())
    }
}

struct Emitter<'a, 's> {
    xml: EventWriter<Vec<u8>>,
    database: &'a Database,
    stream: Option<&'s mut ProtectedStream>,
    binary_ids: HashMap<&'a [u8], usize>,
    binaries: Vec<&'a [u8]>,
}

fn bool_text(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

impl<'a> Emitter<'a, '_> {
    /// Number every distinct attachment payload in document order
    fn collect_binaries(&mut self) {
        let database = self.database;
        for group_id in database.groups_recursive(&database.root_group_id(), true) {
            for entry in database.entries_of(&group_id) {
                for item in std::iter::once(entry).chain(entry.history()) {
                    for payload in item.attachments().values() {
                        if !self.binary_ids.contains_key(payload) {
                            self.binary_ids.insert(payload, self.binaries.len());
                            self.binaries.push(payload);
                        }
                    }
                }
            }
        }
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.xml.write(XmlEvent::start_element(name))?;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.xml.write(XmlEvent::end_element())?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let clean = strip_invalid_xml_chars(text);
        if !clean.is_empty() {
            self.xml.write(XmlEvent::characters(&clean))?;
        }
        Ok(())
    }

    fn write_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.start(name)?;
        self.text(value)?;
        self.end()
    }

    fn write_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.write_string(name, bool_text(value))
    }

    fn write_number<N: ToString>(&mut self, name: &str, value: N) -> Result<()> {
        self.write_string(name, &value.to_string())
    }

    fn write_uuid(&mut self, name: &str, uuid: &Identifier) -> Result<()> {
        self.write_string(name, &uuid.to_base64())
    }

    fn write_uuid_ref(&mut self, name: &str, uuid: Option<Identifier>) -> Result<()> {
        self.write_uuid(name, &uuid.unwrap_or_default())
    }

    fn write_datetime(&mut self, name: &str, dt: &DateTime<Utc>) -> Result<()> {
        self.write_string(name, &format_datetime(dt))
    }

    fn write_color(&mut self, name: &str, color: Option<Color>) -> Result<()> {
        let text = color.map(|c| c.to_string()).unwrap_or_default();
        self.write_string(name, &text)
    }

    fn write_document(&mut self, header_hash: Option<&[u8]>) -> Result<()> {
        self.xml.write(XmlEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("UTF-8"),
            standalone: Some(true),
        })?;
        self.start("KeePassFile")?;
        self.write_metadata(header_hash)?;
        self.write_root()?;
        self.end()
    }

    fn write_metadata(&mut self, header_hash: Option<&[u8]>) -> Result<()> {
        let database = self.database;
        let meta = database.metadata();
        self.start("Meta")?;
        self.write_string("Generator", meta.generator())?;
        if let Some(hash) = header_hash {
            self.write_string("HeaderHash", &STANDARD.encode(hash))?;
        }
        self.write_string("DatabaseName", meta.name())?;
        self.write_datetime("DatabaseNameChanged", &meta.name_changed())?;
        self.write_string("DatabaseDescription", meta.description())?;
        self.write_datetime("DatabaseDescriptionChanged", &meta.description_changed())?;
        self.write_string("DefaultUserName", meta.default_user_name())?;
        self.write_datetime("DefaultUserNameChanged", &meta.default_user_name_changed())?;
        self.write_number("MaintenanceHistoryDays", meta.maintenance_history_days())?;
        self.write_color("Color", meta.color())?;
        self.write_datetime("MasterKeyChanged", &meta.master_key_changed())?;
        self.write_number("MasterKeyChangeRec", meta.master_key_change_rec())?;
        self.write_number("MasterKeyChangeForce", meta.master_key_change_force())?;

        let protection = *meta.memory_protection();
        self.start("MemoryProtection")?;
        self.write_bool("ProtectTitle", protection.title)?;
        self.write_bool("ProtectUserName", protection.username)?;
        self.write_bool("ProtectPassword", protection.password)?;
        self.write_bool("ProtectURL", protection.url)?;
        self.write_bool("ProtectNotes", protection.notes)?;
        self.end()?;

        self.start("CustomIcons")?;
        for (uuid, data) in meta.custom_icons() {
            self.start("Icon")?;
            self.write_uuid("UUID", &uuid)?;
            self.write_string("Data", &STANDARD.encode(data))?;
            self.end()?;
        }
        self.end()?;

        self.write_bool("RecycleBinEnabled", meta.recycle_bin_enabled())?;
        self.write_uuid_ref("RecycleBinUUID", meta.recycle_bin())?;
        self.write_datetime("RecycleBinChanged", &meta.recycle_bin_changed())?;
        self.write_uuid_ref("EntryTemplatesGroup", meta.entry_templates_group())?;
        self.write_datetime("EntryTemplatesGroupChanged", &meta.entry_templates_group_changed())?;
        self.write_uuid_ref("LastSelectedGroup", meta.last_selected_group())?;
        self.write_uuid_ref("LastTopVisibleGroup", meta.last_top_visible_group())?;
        self.write_number("HistoryMaxItems", meta.history_max_items())?;
        self.write_number("HistoryMaxSize", meta.history_max_size())?;

        self.write_binaries()?;

        self.start("CustomData")?;
        for (key, value) in meta.custom_data() {
            self.start("Item")?;
            self.write_string("Key", key)?;
            self.write_string("Value", value)?;
            self.end()?;
        }
        self.end()?;

        self.end()
    }

    fn write_binaries(&mut self) -> Result<()> {
        let compress = self.database.compression() == CompressionAlgorithm::Gzip;
        self.start("Binaries")?;
        for (id, payload) in self.binaries.clone().into_iter().enumerate() {
            let id_text = id.to_string();
            let mut element = XmlEvent::start_element("Binary").attr("ID", &id_text);
            let encoded = if compress {
                element = element.attr("Compressed", "True");
                STANDARD.encode(gzip(payload)?)
            } else {
                STANDARD.encode(payload)
            };
            self.xml.write(element)?;
            self.text(&encoded)?;
            self.end()?;
        }
        self.end()
    }

    fn write_root(&mut self) -> Result<()> {
        let database = self.database;
        self.start("Root")?;
        self.write_group(database.root_group())?;

        self.start("DeletedObjects")?;
        for object in database.deleted_objects() {
            self.start("DeletedObject")?;
            self.write_uuid("UUID", &object.uuid)?;
            self.write_datetime("DeletionTime", &object.deletion_time)?;
            self.end()?;
        }
        self.end()?;

        self.end()
    }

    fn write_icon(&mut self, icon: Icon) -> Result<()> {
        self.write_number("IconID", icon.number())?;
        if let Some(uuid) = icon.custom_uuid() {
            self.write_uuid("CustomIconUUID", &uuid)?;
        }
        Ok(())
    }

    fn write_group(&mut self, group: &'a Group) -> Result<()> {
        let database = self.database;
        self.start("Group")?;
        self.write_uuid("UUID", &group.uuid())?;
        self.write_string("Name", group.name())?;
        self.write_string("Notes", group.notes())?;
        self.write_icon(group.icon())?;
        self.write_times(group.times())?;
        self.write_bool("IsExpanded", group.is_expanded())?;
        self.write_string("DefaultAutoTypeSequence", group.default_auto_type_sequence())?;
        self.write_string("EnableAutoType", group.auto_type_enabled().as_str())?;
        self.write_string("EnableSearching", group.searching_enabled().as_str())?;
        self.write_uuid_ref("LastTopVisibleEntry", group.last_top_visible_entry())?;

        for entry in database.entries_of(&group.uuid()) {
            self.write_entry(entry, false)?;
        }
        for child in database.children_of(&group.uuid()) {
            self.write_group(child)?;
        }

        self.end()
    }

    fn write_times(&mut self, times: &TimeInfo) -> Result<()> {
        self.start("Times")?;
        self.write_datetime("LastModificationTime", &times.last_modification_time())?;
        self.write_datetime("CreationTime", &times.creation_time())?;
        self.write_datetime("LastAccessTime", &times.last_access_time())?;
        self.write_datetime("ExpiryTime", &times.expiry_time())?;
        self.write_bool("Expires", times.expires())?;
        self.write_number("UsageCount", times.usage_count())?;
        self.write_datetime("LocationChanged", &times.location_changed())?;
        self.end()
    }

    fn write_entry(&mut self, entry: &'a Entry, is_history: bool) -> Result<()> {
        self.start("Entry")?;
        self.write_uuid("UUID", &entry.uuid())?;
        self.write_icon(entry.icon())?;
        self.write_color("ForegroundColor", entry.foreground_color())?;
        self.write_color("BackgroundColor", entry.background_color())?;
        self.write_string("OverrideURL", entry.override_url())?;
        self.write_string("Tags", entry.tags())?;
        self.write_times(entry.times())?;

        let protection = *self.database.metadata().memory_protection();
        for (key, value) in entry.attributes().iter() {
            let protect = entry.attributes().is_protected(key) || protection.for_attribute(key);
            self.write_entry_string(key, value, protect)?;
        }

        for (key, payload) in entry.attachments().iter() {
            let id = self.binary_ids.get(payload).copied().unwrap_or_default();
            self.start("Binary")?;
            self.write_string("Key", key)?;
            self.xml
                .write(XmlEvent::start_element("Value").attr("Ref", &id.to_string()))?;
            self.end()?;
            self.end()?;
        }

        let auto_type = entry.auto_type();
        self.start("AutoType")?;
        self.write_bool("Enabled", auto_type.enabled)?;
        self.write_number("DataTransferObfuscation", auto_type.obfuscation)?;
        self.write_string("DefaultSequence", &auto_type.default_sequence)?;
        for association in &auto_type.associations {
            self.start("Association")?;
            self.write_string("Window", &association.window)?;
            self.write_string("KeystrokeSequence", &association.sequence)?;
            self.end()?;
        }
        self.end()?;

        if !is_history {
            self.start("History")?;
            for item in entry.history() {
                self.write_entry(item, true)?;
            }
            self.end()?;
        }

        self.end()
    }

    fn write_entry_string(&mut self, key: &str, value: &str, protect: bool) -> Result<()> {
        self.start("String")?;
        self.write_string("Key", key)?;

        let hidden = match (protect, self.stream.as_deref_mut()) {
            (true, Some(stream)) => Some(STANDARD.encode(stream.process(value.as_bytes())?)),
            _ => None,
        };

        match hidden {
            Some(hidden) => {
                self.xml
                    .write(XmlEvent::start_element("Value").attr("Protected", "True"))?;
                self.text(&hidden)?;
            }
            None if protect => {
                self.xml
                    .write(XmlEvent::start_element("Value").attr("ProtectInMemory", "True"))?;
                self.text(value)?;
            }
            None => {
                self.start("Value")?;
                self.text(value)?;
            }
        }
        self.end()?;

        self.end()
    }
}
