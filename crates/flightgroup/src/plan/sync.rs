//! Optimistic flight plan replication.
//!
//! Every `FlightPlanUpdate`, including the echo of our own edits, goes
//! through [`Synchronizer::apply_remote`]: snapshot, apply, hash, then commit
//! or roll back. A rollback means this replica has diverged and must be
//! replaced with the server's copy; the synchronizer reports it and the
//! client issues the resync.
//!
//! Local edits never touch the live plan. [`Synchronizer::propose`] predicts
//! the hash on a scratch copy and returns the operation to transmit.
//!
//! Revisions are only compared once the server has handed us one in a
//! snapshot. Until then the hash check is the sole arbiter.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{FlightPlan, PlanError, PlanHash, PlanSnapshot, Waypoint};

/// What a [`WaypointOperation`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    /// Placeholder; changes nothing.
    #[default]
    None,
    /// Insert `data` at `index`.
    New,
    /// Remove the waypoint at `index`.
    Delete,
    /// Move the waypoint at `index` to `new_index`.
    Sort,
    /// Replace the waypoint at `index` with `data`.
    Modify,
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::New => "new",
            Self::Delete => "delete",
            Self::Sort => "sort",
            Self::Modify => "modify",
        };
        f.write_str(name)
    }
}

/// One flight plan edit as sent in `FlightPlanUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointOperation {
    /// The edit.
    pub action: PlanAction,
    /// Position the edit applies to.
    #[serde(default)]
    pub index: usize,
    /// Destination of a `sort`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_index: Option<usize>,
    /// Waypoint for `new` and `modify`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Waypoint>,
    /// Hash of the plan after the edit, as computed by the sender.
    #[serde(rename = "hash")]
    pub expected_hash: PlanHash,
    /// Plan revision the sender computed the edit against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl FlightPlan {
    /// Apply an operation in place.
    ///
    /// The operation is validated before anything is touched, so on error
    /// the plan is unchanged. The selected waypoint follows the edit.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] if an index is out of range or required data
    /// is missing.
    pub fn apply(&mut self, op: &WaypointOperation) -> Result<(), PlanError> {
        let index = op.index;
        match op.action {
            PlanAction::None => {}
            PlanAction::Delete => {
                self.check_index(index)?;
                self.waypoints.remove(index);
                self.current = match self.current {
                    Some(current) if current == index => None,
                    Some(current) if current > index => Some(current - 1),
                    other => other,
                };
            }
            PlanAction::New => {
                let waypoint = op.data.clone().ok_or(PlanError::MissingData {
                    action: PlanAction::New,
                })?;
                if index > self.waypoints.len() {
                    return Err(PlanError::IndexOutOfRange {
                        index,
                        len: self.waypoints.len(),
                    });
                }
                self.waypoints.insert(index, waypoint);
                self.current = self
                    .current
                    .map(|current| if current >= index { current + 1 } else { current });
            }
            PlanAction::Sort => {
                let new_index = op.new_index.ok_or(PlanError::MissingNewIndex)?;
                self.check_index(index)?;
                self.check_index(new_index)?;
                let waypoint = self.waypoints.remove(index);
                self.waypoints.insert(new_index, waypoint);
                self.current = self.current.map(|current| {
                    if current == index {
                        return new_index;
                    }
                    let shifted = if current > index { current - 1 } else { current };
                    if shifted >= new_index {
                        shifted + 1
                    } else {
                        shifted
                    }
                });
            }
            PlanAction::Modify => {
                let waypoint = op.data.clone().ok_or(PlanError::MissingData {
                    action: PlanAction::Modify,
                })?;
                self.check_index(index)?;
                self.waypoints[index] = waypoint;
            }
        }
        Ok(())
    }
}

/// A local edit, before its hash is predicted.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEdit {
    /// Insert a waypoint at a position (`len` appends).
    Insert {
        /// Insertion position.
        index: usize,
        /// The new waypoint.
        waypoint: Waypoint,
    },
    /// Remove a waypoint.
    Delete {
        /// Position to remove.
        index: usize,
    },
    /// Move a waypoint.
    Move {
        /// Current position.
        from: usize,
        /// Destination position.
        to: usize,
    },
    /// Replace a waypoint in place.
    Modify {
        /// Position to replace.
        index: usize,
        /// The replacement.
        waypoint: Waypoint,
    },
}

impl PlanEdit {
    fn into_operation(self) -> WaypointOperation {
        let (action, index, new_index, data) = match self {
            Self::Insert { index, waypoint } => (PlanAction::New, index, None, Some(waypoint)),
            Self::Delete { index } => (PlanAction::Delete, index, None, None),
            Self::Move { from, to } => (PlanAction::Sort, from, Some(to), None),
            Self::Modify { index, waypoint } => (PlanAction::Modify, index, None, Some(waypoint)),
        };
        WaypointOperation {
            action,
            index,
            new_index,
            data,
            expected_hash: PlanHash::default(),
            revision: None,
        }
    }
}

/// Why an inbound operation was not committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// The sender edited a different revision than ours; nothing was applied.
    StaleRevision {
        /// Our revision.
        local: u64,
        /// The revision the sender edited.
        remote: u64,
    },
    /// The operation does not fit our plan.
    Invalid(PlanError),
    /// Applying the operation produced a different plan than the sender's.
    HashMismatch {
        /// Hash the sender predicted.
        expected: PlanHash,
        /// Hash we computed.
        actual: PlanHash,
    },
}

/// Result of [`Synchronizer::apply_remote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Verified and kept.
    Committed,
    /// Rejected; the live plan is exactly as it was before the operation.
    Diverged(Divergence),
}

impl ApplyOutcome {
    /// Whether the operation was committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Owner of the replica's live flight plan.
#[derive(Debug, Default)]
pub struct Synchronizer {
    plan: FlightPlan,
}

impl Synchronizer {
    /// A synchronizer holding an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live plan.
    #[must_use]
    pub fn plan(&self) -> &FlightPlan {
        &self.plan
    }

    /// Apply, verify and commit or roll back one inbound operation.
    pub fn apply_remote(&mut self, op: &WaypointOperation) -> ApplyOutcome {
        if let Some(remote) = op.revision.filter(|_| self.plan.tracked) {
            if remote != self.plan.revision {
                warn!(
                    local = self.plan.revision,
                    remote,
                    action = %op.action,
                    "Flight plan operation against another revision"
                );
                return ApplyOutcome::Diverged(Divergence::StaleRevision {
                    local: self.plan.revision,
                    remote,
                });
            }
        }

        let backup = self.plan.clone();

        if let Err(e) = self.plan.apply(op) {
            warn!(error = %e, action = %op.action, "Flight plan operation does not apply");
            self.plan = backup;
            return ApplyOutcome::Diverged(Divergence::Invalid(e));
        }

        let actual = self.plan.hash();
        if actual != op.expected_hash {
            warn!(
                expected = %op.expected_hash,
                actual = %actual,
                action = %op.action,
                "Flight plan hash mismatch, rolling back"
            );
            self.plan = backup;
            return ApplyOutcome::Diverged(Divergence::HashMismatch {
                expected: op.expected_hash.clone(),
                actual,
            });
        }

        self.plan.revision += 1;
        debug!(
            action = %op.action,
            index = op.index,
            revision = self.plan.revision,
            hash = %actual,
            "Flight plan operation committed"
        );
        ApplyOutcome::Committed
    }

    /// Replace the live plan with authoritative content.
    ///
    /// The selected waypoint is kept if a waypoint with the same id survives.
    pub fn replace(&mut self, snapshot: PlanSnapshot) {
        let selected = self.plan.current_waypoint().map(|waypoint| waypoint.id.clone());
        let mut plan = FlightPlan::from_snapshot(snapshot);
        plan.current = selected.and_then(|id| plan.position_of(&id));
        debug!(
            waypoints = plan.len(),
            revision = plan.revision,
            hash = %plan.hash(),
            "Flight plan replaced"
        );
        self.plan = plan;
    }

    /// Drop the plan (used when leaving a group).
    pub fn clear(&mut self) {
        self.plan = FlightPlan::new();
    }

    /// Select the waypoint the local pilot is flying to.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::IndexOutOfRange`] if `index` is past the end.
    pub fn select(&mut self, index: Option<usize>) -> Result<(), PlanError> {
        self.plan.set_current(index)
    }

    /// Turn a local edit into an operation ready to transmit.
    ///
    /// The live plan is not modified; the edit is committed when its echo
    /// comes back through [`apply_remote`](Self::apply_remote).
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] if the edit does not apply to the current plan.
    pub fn propose(&self, edit: PlanEdit) -> Result<WaypointOperation, PlanError> {
        let mut op = edit.into_operation();
        let mut scratch = self.plan.clone();
        scratch.apply(&op)?;
        op.expected_hash = scratch.hash();
        op.revision = self.plan.tracked.then_some(self.plan.revision);
        Ok(op)
    }
}
