//! Lookup table of open databases by id
//!
//! The registry is an ordinary object owned by whoever opens databases; it
//! holds weak handles only, so dropping the last `Arc` closes a database and
//! its slot is pruned on the next access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use super::{Database, Entry, Group, Identifier};

/// Shared handle to an open database
pub type SharedDatabase = Arc<RwLock<Database>>;

#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    databases: Mutex<HashMap<Identifier, Weak<RwLock<Database>>>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identifier, Weak<RwLock<Database>>>> {
        match self.databases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Take ownership of `database` and register it under its id
    pub fn register(&self, database: Database) -> SharedDatabase {
        let uuid = database.uuid();
        let shared = Arc::new(RwLock::new(database));
        let mut map = self.lock();
        map.retain(|_, weak| weak.strong_count() > 0);
        map.insert(uuid, Arc::downgrade(&shared));
        shared
    }

    /// Live database with this id
    pub fn get(&self, uuid: &Identifier) -> Option<SharedDatabase> {
        let mut map = self.lock();
        match map.get(uuid).map(Weak::upgrade) {
            Some(Some(database)) => Some(database),
            Some(None) => {
                map.remove(uuid);
                None
            }
            None => None,
        }
    }

    pub fn unregister(&self, uuid: &Identifier) -> bool {
        self.lock().remove(uuid).is_some()
    }

    /// Number of databases still alive
    pub fn len(&self) -> usize {
        let mut map = self.lock();
        map.retain(|_, weak| weak.strong_count() > 0);
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of an entry in a registered database
    pub fn resolve_entry(&self, database: &Identifier, entry: &Identifier) -> Option<Entry> {
        let shared = self.get(database)?;
        let guard = shared.read().ok()?;
        guard.resolve_entry(entry).cloned()
    }

    /// Copy of a group's own data in a registered database
    pub fn resolve_group(&self, database: &Identifier, group: &Identifier) -> Option<Group> {
        let shared = self.get(database)?;
        let guard = shared.read().ok()?;
        guard.resolve_group(group).map(Group::detached_copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = DatabaseRegistry::new();
        let db = Database::new();
        let uuid = db.uuid();
        let shared = registry.register(db);

        assert_eq!(registry.len(), 1);
        let found = registry.get(&uuid).unwrap();
        assert!(Arc::ptr_eq(&found, &shared));
    }

    #[test]
    fn test_dropped_database_disappears() {
        let registry = DatabaseRegistry::new();
        let db = Database::new();
        let uuid = db.uuid();
        let shared = registry.register(db);
        drop(shared);

        assert!(registry.get(&uuid).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_across_databases() {
        let registry = DatabaseRegistry::new();
        let mut db = Database::new();
        let root = db.root_group_id();
        let mut entry = Entry::new();
        entry.set_title("shared");
        let entry_id = db.add_entry(entry, &root).unwrap();
        let db_id = db.uuid();
        let _shared = registry.register(db);

        let found = registry.resolve_entry(&db_id, &entry_id).unwrap();
        assert_eq!(found.title(), "shared");
        assert!(registry.resolve_group(&db_id, &root).is_some());
        assert!(registry.resolve_entry(&Identifier::random(), &entry_id).is_none());
    }

    #[test]
    fn test_unregister() {
        let registry = DatabaseRegistry::new();
        let db = Database::new();
        let uuid = db.uuid();
        let _shared = registry.register(db);
        assert!(registry.unregister(&uuid));
        assert!(!registry.unregister(&uuid));
        assert!(registry.get(&uuid).is_none());
    }

    #[test]
    fn test_shared_across_threads() {
        let registry = Arc::new(DatabaseRegistry::new());
        let db = Database::new();
        let uuid = db.uuid();
        let _shared = registry.register(db);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get(&uuid).is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
