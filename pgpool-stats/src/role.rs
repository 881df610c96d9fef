use std::collections::BTreeMap;

/// Role of a backend as last observed by primary discovery (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DetectedRole {
    Primary,
    Standby,
    Unknown,
}

pub type DetectedRoles = BTreeMap<usize, DetectedRole>;

/// What changed between two consecutive primary-discovery sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChangeEvent {
    /// First sweep since startup; no prior snapshot to compare against.
    Initial,
    /// The set of roles is unchanged (comparison is insertion-order
    /// independent since both sides are `BTreeMap`s).
    NoChange,
    /// The primary moved from one index to another.
    Failover,
}

/// Tracks the last-seen role map and classifies the next sweep against it.
///
/// Grounded on the teacher's `RoleDetector`
/// (`backend/pool/shard/role_detector.rs`): same "keep last snapshot,
/// diff on next poll" shape, narrowed to a single primary index rather
/// than per-shard role maps.
#[derive(Debug, Default)]
pub struct RoleTracker {
    last: Option<DetectedRoles>,
}

impl RoleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changed(&mut self, roles: DetectedRoles) -> RoleChangeEvent {
        let event = match &self.last {
            None => RoleChangeEvent::Initial,
            Some(prev) => {
                let prev_primary = prev
                    .iter()
                    .find(|(_, role)| **role == DetectedRole::Primary)
                    .map(|(idx, _)| *idx);
                let new_primary = roles
                    .iter()
                    .find(|(_, role)| **role == DetectedRole::Primary)
                    .map(|(idx, _)| *idx);

                if prev_primary == new_primary {
                    RoleChangeEvent::NoChange
                } else {
                    RoleChangeEvent::Failover
                }
            }
        };

        self.last = Some(roles);
        event
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_initial_then_no_change() {
        let mut tracker = RoleTracker::new();
        let mut roles = DetectedRoles::new();
        roles.insert(0, DetectedRole::Primary);
        roles.insert(1, DetectedRole::Standby);

        assert_eq!(tracker.changed(roles.clone()), RoleChangeEvent::Initial);
        // Re-insert in a different order: BTreeMap equality by key is
        // order-independent, matching the teacher's own test intent.
        let mut reordered = DetectedRoles::new();
        reordered.insert(1, DetectedRole::Standby);
        reordered.insert(0, DetectedRole::Primary);
        assert_eq!(tracker.changed(reordered), RoleChangeEvent::NoChange);
    }

    #[test]
    fn test_failover_detected() {
        let mut tracker = RoleTracker::new();
        let mut roles = DetectedRoles::new();
        roles.insert(0, DetectedRole::Primary);
        roles.insert(1, DetectedRole::Standby);
        tracker.changed(roles);

        let mut after = DetectedRoles::new();
        after.insert(0, DetectedRole::Standby);
        after.insert(1, DetectedRole::Primary);
        assert_eq!(tracker.changed(after), RoleChangeEvent::Failover);
    }
}
