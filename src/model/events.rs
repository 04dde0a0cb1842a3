//! Change notifications emitted by a database
//!
//! Mutating [`Database`](super::Database) methods emit a structural or
//! data-changed event followed by [`DatabaseEvent::Modified`]. Subscribers
//! are plain closures; a headless host can simply not subscribe.

use std::fmt;

use super::Identifier;

/// Something changed in a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEvent {
    GroupAdded { group: Identifier, parent: Identifier },
    GroupRemoved { group: Identifier },
    GroupMoved { group: Identifier, parent: Identifier },
    GroupDataChanged(Identifier),
    EntryAdded { entry: Identifier, group: Identifier },
    EntryRemoved { entry: Identifier },
    EntryMoved { entry: Identifier, group: Identifier },
    EntryDataChanged(Identifier),
    MetadataChanged,
    /// Anything at all changed; emitted after every other event
    Modified,
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventHandler = Box<dyn Fn(&DatabaseEvent) + Send + Sync>;

/// Subscriber list
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, EventHandler)>,
    next_id: u64,
    muted: bool,
}

impl EventBus {
    pub fn subscribe(&mut self, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    /// Suppress delivery, e.g. while a document is being loaded
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn emit(&self, event: &DatabaseEvent) {
        if self.muted {
            return;
        }
        for (_, handler) in &self.handlers {
            handler(event);
        }
    }

    /// Emit `event` and then [`DatabaseEvent::Modified`]
    pub fn emit_modified(&self, event: DatabaseEvent) {
        self.emit(&event);
        self.emit(&DatabaseEvent::Modified);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .field("muted", &self.muted)
            .finish()
    }
}
