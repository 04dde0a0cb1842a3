//! Integration tests for kdbxcore
//!
//! Databases are built in memory, saved with low KDF round counts and read
//! back through the public surface.

use kdbxcore::format::FILE_VERSION;
use kdbxcore::model::{Entry, Group, Identifier, TriState};
use kdbxcore::xml::XmlWriter;
use kdbxcore::{
    CompositeKey, CompressionAlgorithm, Database, FileKey, KdbxError, KdbxReader, KdbxWriter, Key,
    PasswordKey, ReaderOptions, RepairOutcome, WriterOptions,
};
use tempfile::TempDir;

const TEST_ROUNDS: u64 = 50;

fn password_key(password: &str) -> CompositeKey {
    CompositeKey::new().with_key(&PasswordKey::new(password))
}

/// Empty database keyed with `key`
fn new_database(key: &CompositeKey) -> Database {
    assert!(kdbxcore::crypto::initialize(), "{}", kdbxcore::crypto::error_string());
    let mut db = Database::new();
    db.set_transform_rounds(TEST_ROUNDS).unwrap();
    db.set_key(key).unwrap();
    db
}

fn entry_with(title: &str, username: &str, password: &str) -> Entry {
    let mut entry = Entry::new();
    entry.set_title(title);
    entry.set_username(username);
    entry.attributes_mut().set("Password", password, true);
    entry
}

fn save_to_vec(db: &Database) -> Vec<u8> {
    let mut out = Vec::new();
    kdbxcore::save(&mut out, db).unwrap();
    out
}

/// Database with the minimal content used by several scenarios
fn sample_database(key: &CompositeKey, compression: CompressionAlgorithm) -> Database {
    let mut db = new_database(key);
    db.metadata_mut().set_name("Sample Database");
    db.set_compression(compression);

    let mut entry = Entry::new();
    entry.set_title("Sample Entry 1");
    entry.attributes_mut().set("UserName", "User Name", true);
    entry.attributes_mut().set("Password", "Password", true);
    let root = db.root_group_id();
    db.add_entry(entry, &root).unwrap();
    db
}

#[test]
fn test_minimal_round_trip() {
    let key = password_key("test");
    let db = sample_database(&key, CompressionAlgorithm::None);
    let bytes = save_to_vec(&db);

    let reopened = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap();
    assert_eq!(reopened.metadata().name(), "Sample Database");
    assert_eq!(reopened.compression(), CompressionAlgorithm::None);

    let entries = reopened.entries_of(&reopened.root_group_id());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title(), "Sample Entry 1");
    assert_eq!(entries[0].username(), "User Name");
    assert!(entries[0].attributes().is_protected("UserName"));
    assert!(reopened.verify_key(&key));
    assert_eq!(reopened.transform_rounds(), TEST_ROUNDS);
}

#[test]
fn test_full_round_trip() {
    let key = password_key("correct horse battery staple");
    let mut db = new_database(&key);
    db.metadata_mut().set_name("Full");
    db.metadata_mut().set_description("Everything the document can hold");
    db.metadata_mut().set_custom_data("plugin", "value");

    let icon = Identifier::random();
    assert!(db.metadata_mut().add_custom_icon(icon, vec![0x89, b'P', b'N', b'G', 1, 2, 3]));

    let root = db.root_group_id();
    let mut work = Group::new();
    work.set_name("Work");
    work.set_notes("work notes");
    work.set_searching_enabled(TriState::Disable);
    work.set_custom_icon(icon);
    let work = db.add_group(work, &root).unwrap();

    let mut nested = Group::new();
    nested.set_name("Nested");
    nested.set_auto_type_enabled(TriState::Enable);
    let nested = db.add_group(nested, &work).unwrap();

    let mut mail = entry_with("Mail", "alice", "p4ss");
    mail.set_url("https://mail.example.com");
    mail.set_notes("line one\nline two");
    mail.attributes_mut().set("Secret", "hidden value", true);
    mail.attributes_mut().set("Plain", "visible value", false);
    mail.attachments_mut().set("key.pem", b"-----BEGIN KEY-----".to_vec());
    mail.attachments_mut().set("copy.pem", b"-----BEGIN KEY-----".to_vec());
    mail.set_custom_icon(icon);
    mail.set_tags("mail;work");
    mail.times_mut().set_expires(true);
    let mail = db.add_entry(mail, &work).unwrap();

    db.update_entry(&mail, |e| e.set_password("n3w-p4ss")).unwrap();
    db.update_entry(&mail, |e| {
        e.attachments_mut().set("extra.bin", vec![0u8, 1, 2, 3, 255]);
    })
    .unwrap();

    let doomed = db.add_entry(entry_with("Old", "bob", "x"), &nested).unwrap();
    db.delete_entry(&doomed).unwrap();

    let bytes = save_to_vec(&db);
    let mut reader = KdbxReader::new(ReaderOptions::strict());
    let reopened = reader.read_database(&mut bytes.as_slice(), &key).unwrap();
    assert!(reader.warnings().is_empty(), "{:?}", reader.warnings());

    // metadata
    assert_eq!(reopened.metadata().name(), "Full");
    assert_eq!(reopened.metadata().description(), "Everything the document can hold");
    assert_eq!(reopened.metadata().name_changed(), db.metadata().name_changed());
    assert_eq!(reopened.metadata().custom_data(), db.metadata().custom_data());
    assert_eq!(reopened.metadata().custom_icon(&icon), db.metadata().custom_icon(&icon));

    // groups
    assert_eq!(reopened.root_group_id(), root);
    let work_group = reopened.resolve_group(&work).unwrap();
    assert_eq!(work_group.name(), "Work");
    assert_eq!(work_group.notes(), "work notes");
    assert_eq!(work_group.searching_enabled(), TriState::Disable);
    assert_eq!(work_group.icon().custom_uuid(), Some(icon));
    assert_eq!(work_group.times(), db.resolve_group(&work).unwrap().times());
    let nested_group = reopened.resolve_group(&nested).unwrap();
    assert_eq!(nested_group.parent(), Some(work));
    assert_eq!(nested_group.auto_type_enabled(), TriState::Enable);
    assert!(!reopened.resolve_searching_enabled(&nested));

    // entries
    let original = db.resolve_entry(&mail).unwrap();
    let entry = reopened.resolve_entry(&mail).unwrap();
    assert_eq!(entry.group(), Some(work));
    assert_eq!(entry.attributes(), original.attributes());
    assert_eq!(entry.attachments(), original.attachments());
    assert_eq!(entry.times(), original.times());
    assert_eq!(entry.icon().custom_uuid(), Some(icon));
    assert_eq!(entry.tags(), "mail;work");
    assert_eq!(entry.password(), "n3w-p4ss");
    assert!(entry.attributes().is_protected("Secret"));
    assert!(!entry.attributes().is_protected("Plain"));

    assert_eq!(entry.history().len(), 2);
    for (read, written) in entry.history().iter().zip(original.history()) {
        assert_eq!(read.uuid(), mail);
        assert!(read.content_eq(written));
    }
    assert_eq!(entry.history()[0].password(), "p4ss");
    assert!(!entry.history()[0].attachments().has_key("extra.bin"));

    // deletion log
    assert_eq!(reopened.deleted_objects(), db.deleted_objects());
    assert!(reopened.deleted_objects().iter().any(|d| d.uuid == doomed));
    assert!(reopened.resolve_entry(&doomed).is_none());
}

#[test]
fn test_wrong_key_rejected() {
    let db = sample_database(&password_key("right"), CompressionAlgorithm::Gzip);
    let bytes = save_to_vec(&db);

    let mut reader = KdbxReader::default();
    let err = reader
        .read_database(&mut bytes.as_slice(), &password_key("wrong"))
        .unwrap_err();
    assert!(matches!(err, KdbxError::WrongKey), "{:?}", err);
    assert_eq!(err.to_string(), "Wrong key or database file is corrupt.");
    assert_eq!(reader.state(), kdbxcore::ReadState::Error);
}

#[test]
fn test_version_written() {
    let db = sample_database(&password_key("v"), CompressionAlgorithm::Gzip);
    let bytes = save_to_vec(&db);
    assert_eq!(&bytes[8..12], &FILE_VERSION.to_le_bytes());
}

/// Offset of the last byte of the end-of-header field data
fn end_of_header_tail(bytes: &[u8]) -> usize {
    // 12 bytes signatures/version, nine fixed-size fields, then the end field
    let end_field = 12 + 19 + 7 + 35 + 35 + 11 + 19 + 35 + 35 + 7;
    assert_eq!(bytes[end_field], 0);
    assert_eq!(&bytes[end_field + 3..end_field + 7], &[0x0D, 0x0A, 0x0D, 0x0A]);
    end_field + 6
}

#[test]
fn test_header_tamper_detected() {
    let key = password_key("header");
    let db = sample_database(&key, CompressionAlgorithm::Gzip);
    let mut bytes = save_to_vec(&db);
    let tail = end_of_header_tail(&bytes);
    bytes[tail] ^= 0xFF;

    let mut lenient = KdbxReader::default();
    let reopened = lenient.read_database(&mut bytes.as_slice(), &key).unwrap();
    assert_eq!(reopened.metadata().name(), "Sample Database");
    assert!(
        lenient.warnings().iter().any(|w| w.contains("Header doesn't match hash")),
        "{:?}",
        lenient.warnings()
    );

    let mut strict = KdbxReader::new(ReaderOptions::strict());
    let err = strict.read_database(&mut bytes.as_slice(), &key).unwrap_err();
    assert!(matches!(err, KdbxError::HeaderHashMismatch), "{:?}", err);
}

#[test]
fn test_body_tamper_detected() {
    let key = password_key("body");
    let mut db = sample_database(&key, CompressionAlgorithm::None);
    let root = db.root_group_id();
    for i in 0..40 {
        db.add_entry(entry_with(&format!("Entry {}", i), "user", "pw"), &root)
            .unwrap();
    }
    let mut bytes = save_to_vec(&db);
    let header_len = end_of_header_tail(&bytes) + 1;
    let middle = header_len + (bytes.len() - header_len) / 2;
    bytes[middle] ^= 0x01;

    let err = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap_err();
    assert!(matches!(err, KdbxError::BlockVerification(_)), "{:?}", err);
}

#[test]
fn test_gzip_corruption_rejected() {
    let key = password_key("test");
    let db = sample_database(&key, CompressionAlgorithm::Gzip);
    let mut bytes = save_to_vec(&db);
    let middle = bytes.len() / 2;
    bytes[middle] = bytes[middle].wrapping_add(1);

    assert!(kdbxcore::open(&mut bytes.as_slice(), &key).is_err());
}

#[test]
fn test_protected_values_hidden_in_document() {
    let key = password_key("protect");
    let mut db = new_database(&key);
    let root = db.root_group_id();
    let secret = "a rather long and distinctive secret value";
    let mut entry = entry_with("Bank", "carol", secret);
    entry.attributes_mut().set("PIN", "918273645", true);
    let id = db.add_entry(entry, &root).unwrap();

    let bytes = save_to_vec(&db);
    assert!(!bytes.windows(secret.len()).any(|w| w == secret.as_bytes()));

    let mut reader = KdbxReader::new(ReaderOptions {
        save_xml: true,
        ..ReaderOptions::default()
    });
    let reopened = reader.read_database(&mut bytes.as_slice(), &key).unwrap();
    let document = String::from_utf8(reader.xml_data().unwrap().to_vec()).unwrap();
    assert!(!document.contains(secret));
    assert!(!document.contains("918273645"));
    assert!(document.contains("carol"));

    let entry = reopened.resolve_entry(&id).unwrap();
    assert_eq!(entry.password(), secret);
    assert_eq!(entry.attributes().value("PIN"), Some("918273645"));
}

#[test]
fn test_history_truncation_survives_save() {
    let key = password_key("history");
    let mut db = new_database(&key);
    db.metadata_mut().set_history_max_items(3);
    let root = db.root_group_id();
    let id = db.add_entry(entry_with("start", "u", "p"), &root).unwrap();

    for i in 0..8 {
        assert!(db.update_entry(&id, |e| e.set_title(&format!("v{}", i))).unwrap());
    }

    let titles: Vec<String> = db
        .resolve_entry(&id)
        .unwrap()
        .history()
        .iter()
        .map(|h| h.title().to_string())
        .collect();
    assert_eq!(titles, ["v4", "v5", "v6"]);

    let bytes = save_to_vec(&db);
    let reopened = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap();
    let entry = reopened.resolve_entry(&id).unwrap();
    assert_eq!(entry.title(), "v7");
    assert_eq!(entry.history().len(), 3);
    assert_eq!(entry.history()[0].title(), "v4");
    assert_eq!(reopened.metadata().history_max_items(), 3);
}

#[test]
fn test_recycle_bin_round_trip() {
    let key = password_key("bin");
    let mut db = new_database(&key);
    let root = db.root_group_id();
    let id = db.add_entry(entry_with("Trash me", "u", "p"), &root).unwrap();
    db.recycle_entry(&id).unwrap();
    let bin = db.recycle_bin().unwrap();

    let bytes = save_to_vec(&db);
    let reopened = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap();
    assert_eq!(reopened.recycle_bin(), Some(bin));
    assert_eq!(reopened.resolve_group(&bin).unwrap().name(), "Recycle Bin");
    assert!(reopened.is_entry_in_recycle_bin(&id));
}

/// Saved file framing the sample document after `edit` has changed its text
fn framed_file(key: &CompositeKey, edit: impl FnOnce(String) -> String) -> Vec<u8> {
    let db = sample_database(key, CompressionAlgorithm::Gzip);
    let document = XmlWriter::new(true).write_database(&db, None, None).unwrap();
    let edited = edit(String::from_utf8(document).unwrap());

    let mut out = Vec::new();
    KdbxWriter::new(WriterOptions::default())
        .write_raw_document(&mut out, &db, edited.as_bytes())
        .unwrap();
    out
}

/// Saved file whose username text carries a 0x10 byte inside the document
fn broken_file(key: &CompositeKey) -> Vec<u8> {
    framed_file(key, |text| {
        let needle = "<Value ProtectInMemory=\"True\">User Name</Value>";
        assert!(text.contains(needle));
        text.replace(needle, "<Value ProtectInMemory=\"True\">User\u{10} Name</Value>")
    })
}

#[test]
fn test_repair_strips_control_byte() {
    let key = password_key("repair");
    let bytes = broken_file(&key);

    let err = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap_err();
    assert!(matches!(err, KdbxError::Xml(_)), "{:?}", err);

    match kdbxcore::repair(&mut bytes.as_slice(), &key) {
        RepairOutcome::Success(db) => {
            let entries = db.entries_of(&db.root_group_id());
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].username(), "User Name");
            assert!(db.verify_key(&key));

            // the repaired database saves and reopens normally
            let resaved = save_to_vec(&db);
            let reopened = kdbxcore::open(&mut resaved.as_slice(), &key).unwrap();
            assert_eq!(reopened.metadata().name(), "Sample Database");
        }
        other => panic!("Expected Success, got {:?}", other),
    }
}

#[test]
fn test_repair_other_outcomes() {
    let key = password_key("repair");
    let good = save_to_vec(&sample_database(&key, CompressionAlgorithm::Gzip));
    assert!(matches!(
        kdbxcore::repair(&mut good.as_slice(), &key),
        RepairOutcome::NothingToDo
    ));
    assert!(matches!(
        kdbxcore::repair(&mut good.as_slice(), &password_key("other")),
        RepairOutcome::UnableToOpen(KdbxError::WrongKey)
    ));

    let broken = broken_file(&key);
    assert!(matches!(
        kdbxcore::repair(&mut broken.as_slice(), &password_key("other")),
        RepairOutcome::UnableToOpen(_)
    ));
}

#[test]
fn test_repair_refuses_foreign_encoding() {
    let key = password_key("repair");
    let bytes = framed_file(&key, |text| {
        let declared = "encoding=\"UTF-8\"";
        assert!(text.contains(declared));
        text.replace(declared, "encoding=\"ISO-8859-1\"")
            .replace("User Name", "User\u{10} Name")
    });
    assert!(kdbxcore::open(&mut bytes.as_slice(), &key).is_err());

    match kdbxcore::repair(&mut bytes.as_slice(), &key) {
        RepairOutcome::Failed(KdbxError::Document(message)) => {
            assert!(message.contains("ISO-8859-1"), "{}", message)
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[test]
fn test_repair_without_control_bytes_fails() {
    let key = password_key("repair");
    let bytes = framed_file(&key, |text| {
        assert!(text.contains("</KeePassFile>"));
        text.replace("</KeePassFile>", "")
    });
    let err = kdbxcore::open(&mut bytes.as_slice(), &key).unwrap_err();
    assert!(matches!(err, KdbxError::Xml(_)), "{:?}", err);

    match kdbxcore::repair(&mut bytes.as_slice(), &key) {
        RepairOutcome::Failed(KdbxError::Xml(_)) => {}
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[test]
fn test_key_file_and_paths() {
    assert!(kdbxcore::crypto::initialize());
    let temp_dir = TempDir::new().unwrap();
    let key_path = temp_dir.path().join("db.key");
    let db_path = temp_dir.path().join("db.kdbx");

    let created = FileKey::create_path(&key_path).unwrap();
    let loaded = FileKey::load_path(&key_path).unwrap();
    let key = CompositeKey::new()
        .with_key(&PasswordKey::new("pw"))
        .with_key(&loaded);
    assert_eq!(
        key.raw_key(),
        CompositeKey::new()
            .with_key(&PasswordKey::new("pw"))
            .with_key(&created)
            .raw_key()
    );

    let db = sample_database(&key, CompressionAlgorithm::Gzip);
    kdbxcore::save_path(&db_path, &db).unwrap();

    let reopened = kdbxcore::open_path(&db_path, &key).unwrap();
    assert_eq!(reopened.metadata().name(), "Sample Database");

    let err = kdbxcore::open_path(&db_path, &password_key("pw")).unwrap_err();
    assert!(matches!(err, KdbxError::WrongKey));

    assert!(matches!(
        kdbxcore::repair_path(&db_path, &key),
        RepairOutcome::NothingToDo
    ));
}

#[test]
fn test_options_from_json() {
    let key = password_key("json");
    let db = sample_database(&key, CompressionAlgorithm::Gzip);

    let options: WriterOptions =
        serde_json::from_str(r#"{"hashed_block_size": 128, "indent": false}"#).unwrap();
    let mut bytes = Vec::new();
    KdbxWriter::new(options).write_database(&mut bytes, &db).unwrap();

    let options: ReaderOptions = serde_json::from_str(r#"{"strict": true}"#).unwrap();
    let reopened = kdbxcore::open_with_options(&mut bytes.as_slice(), &key, options).unwrap();
    assert_eq!(reopened.entry_count(), 1);

    let json = serde_json::to_value(ReaderOptions::default()).unwrap();
    assert_eq!(json["save_xml"], false);
}
