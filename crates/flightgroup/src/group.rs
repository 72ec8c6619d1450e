//! Group membership.
//!
//! A pilot belongs to at most one group. The server assigns group ids;
//! joining names a *target*, which is either a group id or another pilot's
//! public id (an invite), and the server answers with the group actually
//! joined.

use tracing::{info, warn};

use crate::protocol::{
    GroupId, JoinGroupRequest, JoinGroupResponse, LeaveGroupRequest, LeaveGroupResponse, Message,
    StatusCode,
};

/// Result of a `JoinGroupResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// We are in `group` now. `changed` is false when it is the group we
    /// were already in.
    Joined {
        /// Group joined.
        group: GroupId,
        /// Whether the group differs from the previous one.
        changed: bool,
    },
    /// The server reports we already are a member; nothing to do.
    AlreadyMember,
    /// The target does not exist; we are ungrouped.
    Invalid,
    /// Join refused for another reason; membership is unchanged.
    Failed(StatusCode),
}

/// Result of a `LeaveGroupResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Left; `group` is where the server put us (null, or the split-off
    /// group).
    Left {
        /// Group we are in afterwards.
        group: GroupId,
    },
    /// We were not in a group; nothing to do.
    AlreadyUngrouped,
    /// Leave refused; membership is unchanged.
    Failed(StatusCode),
}

/// Which group we are in and which we were invited to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembership {
    group: GroupId,
    invite: Option<String>,
}

impl GroupMembership {
    /// Ungrouped, no invite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a membership persisted by a previous run.
    #[must_use]
    pub fn restore(group: GroupId) -> Self {
        Self {
            group,
            invite: None,
        }
    }

    /// Current group, [`GroupId::NULL`] when ungrouped.
    #[must_use]
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Whether we are in a group.
    #[must_use]
    pub fn is_grouped(&self) -> bool {
        !self.group.is_null()
    }

    /// Remember an invite to follow on the next (re)join.
    pub fn set_invite(&mut self, target: impl Into<String>) {
        let target = target.into();
        if target.is_empty() {
            self.invite = None;
        } else {
            self.invite = Some(target);
        }
    }

    /// Pending invite target.
    #[must_use]
    pub fn invite(&self) -> Option<&str> {
        self.invite.as_deref()
    }

    /// What to join after authenticating: an invite beats the previous
    /// group.
    #[must_use]
    pub fn rejoin_target(&self) -> Option<String> {
        match &self.invite {
            Some(invite) => Some(invite.clone()),
            None if self.is_grouped() => Some(self.group.as_str().to_string()),
            None => None,
        }
    }

    /// Build a join request for `target`.
    #[must_use]
    pub fn join_request(target: &str) -> Message {
        Message::JoinGroupRequest(JoinGroupRequest {
            target_id: target.to_string(),
        })
    }

    /// Build a leave request.
    #[must_use]
    pub fn leave_request(split: bool) -> Message {
        Message::LeaveGroupRequest(LeaveGroupRequest {
            split_requested: split,
        })
    }

    /// Apply a join response.
    pub fn on_join_response(&mut self, response: &JoinGroupResponse) -> JoinOutcome {
        match response.status {
            StatusCode::Ok => {
                let changed = response.group_id != self.group;
                self.group = response.group_id.clone();
                self.invite = None;
                info!(group = %self.group, changed, "Joined group");
                JoinOutcome::Joined {
                    group: self.group.clone(),
                    changed,
                }
            }
            StatusCode::NoOp => {
                self.invite = None;
                if !response.group_id.is_null() && response.group_id != self.group {
                    // The server knows better where we are.
                    self.group = response.group_id.clone();
                    return JoinOutcome::Joined {
                        group: self.group.clone(),
                        changed: true,
                    };
                }
                JoinOutcome::AlreadyMember
            }
            StatusCode::InvalidId => {
                warn!(group = %response.group_id, "Join target does not exist");
                self.group = GroupId::NULL;
                self.invite = None;
                JoinOutcome::Invalid
            }
            status => {
                warn!(%status, "Join failed");
                JoinOutcome::Failed(status)
            }
        }
    }

    /// Apply a leave response.
    pub fn on_leave_response(&mut self, response: &LeaveGroupResponse) -> LeaveOutcome {
        match response.status {
            StatusCode::Ok => {
                self.group = response.group_id.clone();
                info!(group = %self.group, "Left group");
                LeaveOutcome::Left {
                    group: self.group.clone(),
                }
            }
            StatusCode::NoOp if !self.is_grouped() => LeaveOutcome::AlreadyUngrouped,
            StatusCode::NoOp => {
                // Server says we were not in a group at all.
                self.group = GroupId::NULL;
                LeaveOutcome::Left {
                    group: GroupId::NULL,
                }
            }
            status => {
                warn!(%status, "Leave failed");
                LeaveOutcome::Failed(status)
            }
        }
    }

    /// Forget the group without telling the server (credentials reset).
    pub fn clear(&mut self) {
        self.group = GroupId::NULL;
    }
}
