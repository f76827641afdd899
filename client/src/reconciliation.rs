//! Correcting local prediction toward authoritative state
//!
//! Runs whenever a new authoritative state for the local entity arrives:
//!
//! - nothing happens unless the authority has consumed commands beyond the
//!   last reconciled watermark
//! - otherwise the predicted state is blended toward the authoritative one,
//!   aggressively for large divergence and gently for small drift
//! - commands the authority has consumed are dropped from the pending mirror
//!   and the rest are replayed through the step logic on the corrected state
//! - the watermark moves to the authority's `last_processed_tick`

use log::debug;
use shared::{EntityId, EntityState, InputCommand, InputQueue, ReconcileTuning, Simulation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// The authority has not consumed anything new.
    Stale,
    /// The local entity is not being simulated.
    Missing,
    Reconciled {
        distance: f32,
        factor: f32,
        discarded: usize,
        replayed: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    tuning: ReconcileTuning,
    watermark: u32,
}

impl Reconciler {
    pub fn new(tuning: ReconcileTuning) -> Self {
        Self {
            tuning,
            watermark: 0,
        }
    }

    /// Highest authoritative `last_processed_tick` reconciled so far.
    pub fn watermark(&self) -> u32 {
        self.watermark
    }

    pub fn tuning(&self) -> &ReconcileTuning {
        &self.tuning
    }

    pub fn reset(&mut self) {
        self.watermark = 0;
    }

    pub fn reconcile(
        &mut self,
        simulation: &mut Simulation,
        pending: &mut InputQueue,
        id: EntityId,
        authoritative: &EntityState,
    ) -> ReconcileOutcome {
        let acknowledged = authoritative.last_processed_tick;
        if acknowledged <= self.watermark {
            return ReconcileOutcome::Stale;
        }

        let Some(predicted) = simulation.entity(id).copied() else {
            return ReconcileOutcome::Missing;
        };

        let distance = predicted.distance_to(authoritative);
        let factor = self.tuning.blend_for(distance);
        simulation.set_entity_state(id, predicted.blend_toward(authoritative, factor));

        let discarded = pending.discard_through(acknowledged);
        let remaining: Vec<InputCommand> = pending.iter().copied().collect();
        // The authoritative state is already integrated through its own tick
        let replayed = simulation.replay(
            id,
            authoritative.tick.max(acknowledged),
            &remaining,
        ) as usize;

        self.watermark = acknowledged;

        debug!(
            "Reconciled at tick {}: distance {:.2}, factor {}, replayed {}",
            acknowledged,
            distance,
            factor,
            replayed
        );

        ReconcileOutcome::Reconciled {
            distance,
            factor,
            discarded,
            replayed,
        }
    }

    /// Prunes acknowledged commands without correcting the prediction.
    pub fn acknowledge(&mut self, pending: &mut InputQueue, authoritative: &EntityState) -> usize {
        let acknowledged = authoritative.last_processed_tick;
        if acknowledged <= self.watermark {
            return 0;
        }
        self.watermark = acknowledged;
        pending.discard_through(acknowledged)
    }
}
