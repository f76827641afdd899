//! Snapshot diffing into explicit replication events
//!
//! The server sends full snapshots. Observers never see raw snapshots; they
//! receive a tagged event per entity whose tracked fields changed, plus
//! join/leave events derived from keys appearing or disappearing.

use crate::entity::{EntityId, EntityState};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplicationEvent {
    Added {
        id: EntityId,
        state: EntityState,
    },
    Changed {
        id: EntityId,
        old: EntityState,
        new: EntityState,
    },
    Removed {
        id: EntityId,
        last: EntityState,
    },
}

impl ReplicationEvent {
    pub fn id(&self) -> EntityId {
        match self {
            ReplicationEvent::Added { id, .. }
            | ReplicationEvent::Changed { id, .. }
            | ReplicationEvent::Removed { id, .. } => *id,
        }
    }

    /// The state an observer should now hold, if the entity still exists.
    pub fn current(&self) -> Option<&EntityState> {
        match self {
            ReplicationEvent::Added { state, .. } => Some(state),
            ReplicationEvent::Changed { new, .. } => Some(new),
            ReplicationEvent::Removed { .. } => None,
        }
    }
}

/// Receives replication events in the order they were derived.
pub trait ReplicationObserver {
    fn on_replication(&mut self, event: &ReplicationEvent);
}

/// The last replicated state of every entity, used to diff new snapshots.
#[derive(Debug, Clone, Default)]
pub struct ReplicaSet {
    entities: BTreeMap<EntityId, EntityState>,
    last_tick: Option<u32>,
}

impl ReplicaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the replica with `entities` and returns what changed.
    ///
    /// Snapshots older than the last applied one are ignored.
    pub fn apply_snapshot(
        &mut self,
        tick: u32,
        entities: &[(EntityId, EntityState)],
    ) -> Vec<ReplicationEvent> {
        if let Some(last) = self.last_tick {
            if tick < last {
                return Vec::new();
            }
        }
        self.last_tick = Some(tick);

        let mut events = Vec::new();
        let mut next = BTreeMap::new();

        for (id, state) in entities {
            match self.entities.get(id) {
                None => events.push(ReplicationEvent::Added {
                    id: *id,
                    state: *state,
                }),
                Some(old) if old != state => events.push(ReplicationEvent::Changed {
                    id: *id,
                    old: *old,
                    new: *state,
                }),
                Some(_) => {}
            }
            next.insert(*id, *state);
        }

        for (id, last) in &self.entities {
            if !next.contains_key(id) {
                events.push(ReplicationEvent::Removed {
                    id: *id,
                    last: *last,
                });
            }
        }

        self.entities = next;
        events
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.last_tick = None;
    }
}
