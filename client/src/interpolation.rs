//! Smoothing for entities this client does not own
//!
//! Remote entities only change when a snapshot arrives, which is much less
//! often than the render rate. Each frame the displayed position moves a
//! fixed fraction of the way toward the latest authoritative position. There
//! is no extrapolation past that point.

use shared::entity::lerp;
use shared::{EntityId, EntityState, ReplicationEvent, ReplicationObserver};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteEntity {
    /// Latest authoritative state
    pub target: EntityState,
    pub display_x: f32,
    pub display_y: f32,
}

#[derive(Debug, Clone)]
pub struct Interpolator {
    factor: f32,
    enabled: bool,
    local_id: Option<EntityId>,
    remotes: BTreeMap<EntityId, RemoteEntity>,
}

impl Interpolator {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            enabled: true,
            local_id: None,
            remotes: BTreeMap::new(),
        }
    }

    /// Events for this id are ignored; the local entity is predicted instead.
    pub fn set_local(&mut self, id: Option<EntityId>) {
        self.local_id = id;
        if let Some(id) = id {
            self.remotes.remove(&id);
        }
    }

    /// When disabled, remotes snap to their latest authoritative position.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advances every displayed position by one render frame.
    pub fn update_frame(&mut self) {
        let factor = if self.enabled { self.factor } else { 1.0 };
        for remote in self.remotes.values_mut() {
            remote.display_x = lerp(remote.display_x, remote.target.x, factor);
            remote.display_y = lerp(remote.display_y, remote.target.y, factor);
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&RemoteEntity> {
        self.remotes.get(&id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = (EntityId, &RemoteEntity)> {
        self.remotes.iter().map(|(id, remote)| (*id, remote))
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn clear(&mut self) {
        self.remotes.clear();
    }
}

impl ReplicationObserver for Interpolator {
    fn on_replication(&mut self, event: &ReplicationEvent) {
        if Some(event.id()) == self.local_id {
            return;
        }

        match *event {
            ReplicationEvent::Added { id, state } => {
                // First sighting: nothing to interpolate from, start at the target
                self.remotes.insert(
                    id,
                    RemoteEntity {
                        target: state,
                        display_x: state.x,
                        display_y: state.y,
                    },
                );
            }
            ReplicationEvent::Changed { id, new, .. } => {
                let remote = self.remotes.entry(id).or_insert(RemoteEntity {
                    target: new,
                    display_x: new.x,
                    display_y: new.y,
                });
                remote.target = new;
            }
            ReplicationEvent::Removed { id, .. } => {
                self.remotes.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn state(x: f32, y: f32, tick: u32) -> EntityState {
        EntityState::spawned(x, y, tick)
    }

    fn added(id: EntityId, x: f32) -> ReplicationEvent {
        ReplicationEvent::Added {
            id,
            state: state(x, 500.0, 1),
        }
    }

    fn changed(id: EntityId, from: f32, to: f32) -> ReplicationEvent {
        ReplicationEvent::Changed {
            id,
            old: state(from, 500.0, 1),
            new: state(to, 500.0, 2),
        }
    }

    #[test]
    fn test_unknown_entity_is_not_displayed() {
        let interpolator = Interpolator::new(0.2);
        assert!(interpolator.get(2).is_none());
        assert!(interpolator.is_empty());
    }

    #[test]
    fn test_added_entity_starts_at_target() {
        let mut interpolator = Interpolator::new(0.2);
        interpolator.on_replication(&added(2, 100.0));
        let remote = interpolator.get(2).unwrap();
        assert_eq!((remote.display_x, remote.display_y), (100.0, 500.0));
    }

    #[test]
    fn test_factor_applied_every_frame() {
        let mut interpolator = Interpolator::new(0.2);
        interpolator.on_replication(&added(2, 100.0));
        interpolator.on_replication(&changed(2, 100.0, 200.0));

        interpolator.update_frame();
        assert_approx_eq!(interpolator.get(2).unwrap().display_x, 120.0, 1e-4);
        interpolator.update_frame();
        assert_approx_eq!(interpolator.get(2).unwrap().display_x, 136.0, 1e-4);

        // Settles on the last known point
        for _ in 0..200 {
            interpolator.update_frame();
        }
        assert_approx_eq!(interpolator.get(2).unwrap().display_x, 200.0, 1e-3);
    }

    #[test]
    fn test_disabled_snaps() {
        let mut interpolator = Interpolator::new(0.2);
        interpolator.set_enabled(false);
        interpolator.on_replication(&added(2, 100.0));
        interpolator.on_replication(&changed(2, 100.0, 200.0));
        interpolator.update_frame();
        assert_eq!(interpolator.get(2).unwrap().display_x, 200.0);
    }

    #[test]
    fn test_local_entity_is_ignored() {
        let mut interpolator = Interpolator::new(0.2);
        interpolator.set_local(Some(1));
        interpolator.on_replication(&added(1, 100.0));
        interpolator.on_replication(&added(2, 100.0));
        assert!(interpolator.get(1).is_none());
        assert_eq!(interpolator.len(), 1);
    }

    #[test]
    fn test_removed_entity_stops_rendering() {
        let mut interpolator = Interpolator::new(0.2);
        interpolator.on_replication(&added(2, 100.0));
        interpolator.on_replication(&ReplicationEvent::Removed {
            id: 2,
            last: state(100.0, 500.0, 3),
        });
        assert!(interpolator.get(2).is_none());
    }
}
