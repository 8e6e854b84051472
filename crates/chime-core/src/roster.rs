//! Roster of rooms and conversations
//!
//! The roster is an ordered sequence of entries split into two contiguous
//! groups: rooms first, conversations second, each in arrival order. Ids are
//! unique across both groups. Group headers are never stored; `rows()`
//! derives them by scanning the ordered entries for a change of kind.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::channel::TransportEvent;
use crate::errors::DuplicateEntityWarning;

// ----------------------------------------------------------------------------
// Entity Types
// ----------------------------------------------------------------------------

/// Kind of roster entity; also the group it is listed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Room,
    Conversation,
}

/// A room or conversation visible to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            topic: None,
        }
    }

    pub fn room(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, EntityKind::Room)
    }

    pub fn conversation(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, EntityKind::Conversation)
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// An entity together with its arrival sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub entity: Entity,
    pub sequence: u64,
}

/// A rendered row: either a group header or an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterRow {
    Header(EntityKind),
    Entry(RosterEntry),
}

// ----------------------------------------------------------------------------
// Roster
// ----------------------------------------------------------------------------

/// Ordered, grouped collection of roster entries
#[derive(Debug, Default)]
pub struct Roster {
    rooms: Vec<RosterEntry>,
    conversations: Vec<RosterEntry>,
    index: HashMap<String, EntityKind>,
    next_sequence: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, kind: EntityKind) -> &Vec<RosterEntry> {
        match kind {
            EntityKind::Room => &self.rooms,
            EntityKind::Conversation => &self.conversations,
        }
    }

    fn group_mut(&mut self, kind: EntityKind) -> &mut Vec<RosterEntry> {
        match kind {
            EntityKind::Room => &mut self.rooms,
            EntityKind::Conversation => &mut self.conversations,
        }
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut RosterEntry> {
        let kind = *self.index.get(id)?;
        self.group_mut(kind).iter_mut().find(|e| e.entity.id == id)
    }

    /// Append an entity to the end of its group
    ///
    /// A known id leaves the roster untouched and returns a warning.
    pub fn on_entity_added(&mut self, entity: Entity) -> Result<(), DuplicateEntityWarning> {
        if self.index.contains_key(&entity.id) {
            return Err(DuplicateEntityWarning { id: entity.id });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.index.insert(entity.id.clone(), entity.kind);
        self.group_mut(entity.kind)
            .push(RosterEntry { entity, sequence });
        Ok(())
    }

    /// Remove an entity by id
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let kind = self.index.remove(id)?;
        let group = self.group_mut(kind);
        let position = group.iter().position(|e| e.entity.id == id)?;
        Some(group.remove(position).entity)
    }

    /// Entries in render order: rooms, then conversations
    pub fn iter_ordered(&self) -> impl Iterator<Item = &RosterEntry> {
        self.rooms.iter().chain(self.conversations.iter())
    }

    /// Owned copy of the entries in render order
    pub fn list_ordered(&self) -> Vec<RosterEntry> {
        self.iter_ordered().cloned().collect()
    }

    /// Render rows with a header before each group
    pub fn rows(&self) -> Vec<RosterRow> {
        rows_from(self.iter_ordered())
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        let kind = *self.index.get(id)?;
        self.group(kind).iter().find(|e| e.entity.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Rename in place; position and group are unchanged
    pub fn update_display_name(&mut self, id: &str, display_name: impl Into<String>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.entity.display_name = display_name.into();
                true
            }
            None => false,
        }
    }

    pub fn update_topic(&mut self, id: &str, topic: Option<String>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.entity.topic = topic;
                true
            }
            None => false,
        }
    }

    /// Apply an entity-changed report; the stored kind always wins
    pub fn apply_change(&mut self, entity: Entity) -> bool {
        match self.entry_mut(&entity.id) {
            Some(entry) => {
                if entry.entity.kind != entity.kind {
                    debug!(id = %entity.id, "Ignoring kind change on existing entity");
                }
                entry.entity.display_name = entity.display_name;
                entry.entity.topic = entity.topic;
                true
            }
            None => false,
        }
    }

    /// Apply a roster event; events of other kinds are ignored
    pub fn apply_event(&mut self, event: &TransportEvent) -> Result<(), DuplicateEntityWarning> {
        match event {
            TransportEvent::NewRoom { entity } => self.on_entity_added(Entity {
                kind: EntityKind::Room,
                ..entity.clone()
            }),
            TransportEvent::NewConversation { entity } => self.on_entity_added(Entity {
                kind: EntityKind::Conversation,
                ..entity.clone()
            }),
            TransportEvent::EntityChanged { entity } => {
                if !self.apply_change(entity.clone()) {
                    debug!(id = %entity.id, "Change for unknown entity ignored");
                }
                Ok(())
            }
            TransportEvent::EntityRemoved { id } => {
                if self.remove(id).is_none() {
                    debug!(id = %id, "Removal of unknown entity ignored");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
        self.conversations.clear();
        self.index.clear();
    }
}

/// Insert a header wherever the kind differs from the previous entry
pub fn rows_from<'a>(entries: impl IntoIterator<Item = &'a RosterEntry>) -> Vec<RosterRow> {
    let mut rows = Vec::new();
    let mut previous: Option<EntityKind> = None;
    for entry in entries {
        if previous != Some(entry.entity.kind) {
            rows.push(RosterRow::Header(entry.entity.kind));
            previous = Some(entry.entity.kind);
        }
        rows.push(RosterRow::Entry(entry.clone()));
    }
    rows
}

// ----------------------------------------------------------------------------
// Shared Roster
// ----------------------------------------------------------------------------

/// Roster behind a read-write lock
///
/// Every mutation happens under the write lock, so readers see either the
/// roster before a change or after it.
#[derive(Debug, Clone, Default)]
pub struct SharedRoster {
    inner: Arc<RwLock<Roster>>,
}

impl SharedRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_entity_added(&self, entity: Entity) -> Result<(), DuplicateEntityWarning> {
        self.inner.write().on_entity_added(entity)
    }

    pub fn remove(&self, id: &str) -> Option<Entity> {
        self.inner.write().remove(id)
    }

    pub fn update_display_name(&self, id: &str, display_name: impl Into<String>) -> bool {
        self.inner.write().update_display_name(id, display_name)
    }

    pub fn update_topic(&self, id: &str, topic: Option<String>) -> bool {
        self.inner.write().update_topic(id, topic)
    }

    /// Apply a roster event, logging duplicates
    pub fn apply_event(&self, event: &TransportEvent) {
        if let Err(warning) = self.inner.write().apply_event(event) {
            warn!(id = %warning.id, kind = %event.kind(), "{}", warning);
        }
    }

    pub fn list_ordered(&self) -> Vec<RosterEntry> {
        self.inner.read().list_ordered()
    }

    pub fn rows(&self) -> Vec<RosterRow> {
        self.inner.read().rows()
    }

    pub fn get(&self, id: &str) -> Option<RosterEntry> {
        self.inner.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Run `op` under the write lock and empty the roster only if it succeeds
    ///
    /// Roster events cannot slip in between `op` and the clear.
    pub fn clear_on_success<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut roster = self.inner.write();
        let result = op();
        if result.is_ok() {
            roster.clear();
        }
        result
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(roster: &Roster) -> Vec<String> {
        roster.iter_ordered().map(|e| e.entity.id.clone()).collect()
    }

    #[test]
    fn test_rooms_listed_before_conversations() {
        let mut roster = Roster::new();
        roster.on_entity_added(Entity::room("general", "General")).unwrap();
        roster
            .on_entity_added(Entity::conversation("bob", "Bob"))
            .unwrap();
        roster.on_entity_added(Entity::room("random", "Random")).unwrap();

        assert_eq!(ids(&roster), vec!["general", "random", "bob"]);
        let sequences: Vec<u64> = roster.iter_ordered().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 2, 1]);
    }

    #[test]
    fn test_clear_on_success() {
        let roster = SharedRoster::new();
        roster.on_entity_added(Entity::room("general", "General")).unwrap();

        let failed: Result<(), &str> = roster.clear_on_success(|| Err("rejected"));
        assert_eq!(failed, Err("rejected"));
        assert_eq!(roster.len(), 1);

        let done: Result<u8, &str> = roster.clear_on_success(|| Ok(7));
        assert_eq!(done, Ok(7));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut roster = Roster::new();
        roster.on_entity_added(Entity::room("general", "General")).unwrap();
        roster
            .on_entity_added(Entity::conversation("bob", "Bob"))
            .unwrap();

        let before = roster.list_ordered();
        let result = roster.on_entity_added(Entity::room("general", "Renamed"));
        assert_eq!(
            result,
            Err(DuplicateEntityWarning {
                id: "general".into()
            })
        );
        // Same id under the other kind is still a duplicate
        assert!(roster
            .on_entity_added(Entity::conversation("general", "General"))
            .is_err());
        assert_eq!(roster.list_ordered(), before);
    }

    #[test]
    fn test_update_display_name_in_place() {
        let mut roster = Roster::new();
        roster.on_entity_added(Entity::room("a", "Alpha")).unwrap();
        roster.on_entity_added(Entity::room("b", "Beta")).unwrap();

        assert!(roster.update_display_name("a", "Alpha Prime"));
        assert!(!roster.update_display_name("missing", "x"));
        assert_eq!(ids(&roster), vec!["a", "b"]);
        assert_eq!(
            roster.get("a").map(|e| e.entity.display_name.as_str()),
            Some("Alpha Prime")
        );

        assert!(roster.update_topic("b", Some("release planning".into())));
        assert_eq!(
            roster.get("b").and_then(|e| e.entity.topic.as_deref()),
            Some("release planning")
        );
    }

    #[test]
    fn test_apply_change_keeps_group() {
        let mut roster = Roster::new();
        roster.on_entity_added(Entity::room("a", "Alpha")).unwrap();
        assert!(roster.apply_change(Entity::conversation("a", "Renamed").with_topic("t")));

        let entry = roster.get("a").unwrap();
        assert_eq!(entry.entity.kind, EntityKind::Room);
        assert_eq!(entry.entity.display_name, "Renamed");
        assert_eq!(entry.entity.topic.as_deref(), Some("t"));
    }

    #[test]
    fn test_remove() {
        let mut roster = Roster::new();
        roster.on_entity_added(Entity::room("a", "Alpha")).unwrap();
        roster
            .on_entity_added(Entity::conversation("b", "Bob"))
            .unwrap();

        assert_eq!(roster.remove("a").map(|e| e.id), Some("a".to_string()));
        assert_eq!(roster.remove("a"), None);
        assert_eq!(ids(&roster), vec!["b"]);

        // A removed id may arrive again and goes to the end of its group
        roster.on_entity_added(Entity::room("a", "Alpha")).unwrap();
        assert_eq!(ids(&roster), vec!["a", "b"]);
    }

    #[test]
    fn test_rows_insert_headers_at_kind_changes() {
        let mut roster = Roster::new();
        assert!(roster.rows().is_empty());

        roster
            .on_entity_added(Entity::conversation("bob", "Bob"))
            .unwrap();
        let rows = roster.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RosterRow::Header(EntityKind::Conversation));

        roster.on_entity_added(Entity::room("general", "General")).unwrap();
        roster.on_entity_added(Entity::room("random", "Random")).unwrap();
        let headers: Vec<usize> = roster
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| matches!(row, RosterRow::Header(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(headers, vec![0, 3]);
    }

    #[test]
    fn test_apply_event_normalizes_kind() {
        let mut roster = Roster::new();
        roster
            .apply_event(&TransportEvent::NewConversation {
                entity: Entity::room("bob", "Bob"),
            })
            .unwrap();
        assert_eq!(
            roster.get("bob").map(|e| e.entity.kind),
            Some(EntityKind::Conversation)
        );

        roster
            .apply_event(&TransportEvent::EntityRemoved { id: "bob".into() })
            .unwrap();
        assert!(roster.is_empty());

        // Non-roster events are ignored
        roster
            .apply_event(&TransportEvent::AuthenticateRequired)
            .unwrap();
    }

    #[test]
    fn test_shared_roster_clear() {
        let shared = SharedRoster::new();
        shared.on_entity_added(Entity::room("a", "Alpha")).unwrap();
        let other = shared.clone();
        assert_eq!(other.len(), 1);

        shared.apply_event(&TransportEvent::NewRoom {
            entity: Entity::room("a", "Alpha"),
        });
        assert_eq!(other.len(), 1);

        other.clear();
        assert!(shared.is_empty());
        assert!(shared.list_ordered().is_empty());
    }
}
