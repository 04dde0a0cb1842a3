//! In-memory database model
//!
//! [`Database`] owns every [`Group`] and [`Entry`] in id-keyed maps; all
//! cross references (parent, owning group, recycle bin, last selected
//! group) are [`Identifier`]s resolved through the database.

pub mod attributes;
pub mod database;
pub mod entry;
pub mod events;
pub mod group;
pub mod icon;
pub mod identifier;
pub mod metadata;
pub mod registry;
pub mod time_info;

pub use attributes::{EntryAttachments, EntryAttributes};
pub use database::{CompressionAlgorithm, Database, DeletedObject, GroupTree};
pub use entry::{AutoTypeAssociation, AutoTypeSettings, Entry, HistoryPolicy};
pub use events::{DatabaseEvent, SubscriptionId};
pub use group::{Group, TriState};
pub use icon::{Color, Icon};
pub use identifier::Identifier;
pub use metadata::{MemoryProtection, Metadata};
pub use registry::{DatabaseRegistry, SharedDatabase};
pub use time_info::TimeInfo;
