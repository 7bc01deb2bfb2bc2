//! Per-entity last-applied-mutation tracking. Deliberately a single tick
//! per entity rather than a wider delivery-history bitmask, since nothing
//! downstream of this crate consumes an ack/resend history — only
//! whether a given mutation is newer than the last one applied.

use bevy::prelude::Component;

use crate::tick::Tick;

/// Attached to every client entity that has received at least one
/// Mutations record. Absence means "accept unconditionally".
#[derive(Component, Clone, Copy, Debug)]
pub struct MutationTick(pub Tick);

impl MutationTick {
    /// Whether a mutation stamped `incoming` should be applied given the
    /// entity's current tracker (or lack of one).
    pub fn accepts(existing: Option<&MutationTick>, incoming: Tick) -> bool {
        match existing {
            Some(tracker) => incoming >= tracker.0,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_tick_is_accepted() {
        let tracker = MutationTick(Tick::new(20));
        assert!(MutationTick::accepts(Some(&tracker), Tick::new(21)));
    }

    #[test]
    fn older_tick_is_rejected() {
        let tracker = MutationTick(Tick::new(20));
        assert!(!MutationTick::accepts(Some(&tracker), Tick::new(18)));
    }

    #[test]
    fn no_tracker_accepts_anything() {
        assert!(MutationTick::accepts(None, Tick::new(0)));
    }
}
