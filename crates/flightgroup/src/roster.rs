//! Other pilots in the current group.
//!
//! The roster never contains the local pilot. Updates that name a pilot the
//! roster does not know are reported back as [`RosterUpdate::Unknown`] so the
//! caller can resync: an unknown id means the roster itself is stale.

use std::collections::BTreeMap;

use tracing::debug;

use crate::protocol::{PilotId, PilotMeta, Telemetry, WaypointId};

/// One remote pilot.
#[derive(Debug, Clone, PartialEq)]
pub struct Pilot {
    /// Public pilot id.
    pub id: PilotId,
    /// Display name.
    pub name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
    /// Last telemetry received, if any.
    pub telemetry: Option<Telemetry>,
    /// Time of the last telemetry, Unix milliseconds.
    pub telemetry_at: Option<i64>,
    /// Waypoint this pilot has selected.
    pub selected_waypoint: Option<WaypointId>,
    /// Whether the server reports the pilot as connected.
    pub online: bool,
}

impl Pilot {
    fn from_meta(meta: PilotMeta) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            avatar: meta.avatar,
            telemetry: None,
            telemetry_at: None,
            selected_waypoint: None,
            online: true,
        }
    }
}

/// Result of applying an update that names a pilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterUpdate {
    /// The pilot was known and has been updated.
    Applied,
    /// The pilot is not in the roster.
    Unknown,
}

/// Mapping of pilot id to [`Pilot`] for the current group.
#[derive(Debug, Default)]
pub struct Roster {
    pilots: BTreeMap<PilotId, Pilot>,
}

impl Roster {
    /// An empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pilot or refresh the profile of a known one.
    ///
    /// Returns `true` if the pilot was new.
    pub fn upsert(&mut self, meta: PilotMeta) -> bool {
        if let Some(pilot) = self.pilots.get_mut(&meta.id) {
            pilot.name = meta.name;
            pilot.avatar = meta.avatar;
            return false;
        }
        debug!(pilot = %meta.id, name = %meta.name, "Pilot added to roster");
        self.pilots.insert(meta.id.clone(), Pilot::from_meta(meta));
        true
    }

    /// Remove a pilot. Returns the removed entry.
    pub fn remove(&mut self, id: &PilotId) -> Option<Pilot> {
        let removed = self.pilots.remove(id);
        if removed.is_some() {
            debug!(pilot = %id, "Pilot removed from roster");
        }
        removed
    }

    /// Replace the whole roster with an authoritative list, skipping `me`.
    ///
    /// Telemetry and selections of pilots that remain are kept.
    pub fn replace(&mut self, pilots: Vec<PilotMeta>, me: &PilotId) {
        let mut previous = std::mem::take(&mut self.pilots);
        for meta in pilots {
            if &meta.id == me || meta.id.is_null() {
                continue;
            }
            let pilot = match previous.remove(&meta.id) {
                Some(mut known) => {
                    known.name = meta.name;
                    known.avatar = meta.avatar;
                    known
                }
                None => Pilot::from_meta(meta),
            };
            self.pilots.insert(pilot.id.clone(), pilot);
        }
    }

    /// Drop everyone.
    pub fn clear(&mut self) {
        self.pilots.clear();
    }

    /// Record telemetry for a pilot.
    pub fn update_telemetry(
        &mut self,
        id: &PilotId,
        timestamp: i64,
        telemetry: Telemetry,
    ) -> RosterUpdate {
        let Some(pilot) = self.pilots.get_mut(id) else {
            return RosterUpdate::Unknown;
        };
        // Late packets must not move a pilot backwards.
        if pilot.telemetry_at.is_some_and(|last| last > timestamp) {
            return RosterUpdate::Applied;
        }
        pilot.telemetry = Some(telemetry);
        pilot.telemetry_at = Some(timestamp);
        RosterUpdate::Applied
    }

    /// Record a pilot's waypoint selection. Last write wins.
    pub fn select_waypoint(&mut self, id: &PilotId, waypoint: WaypointId) -> RosterUpdate {
        match self.pilots.get_mut(id) {
            Some(pilot) => {
                pilot.selected_waypoint = Some(waypoint);
                RosterUpdate::Applied
            }
            None => RosterUpdate::Unknown,
        }
    }

    /// Record online flags from a status response. Unknown ids are ignored.
    pub fn set_online(&mut self, status: &BTreeMap<PilotId, bool>) {
        for (id, online) in status {
            if let Some(pilot) = self.pilots.get_mut(id) {
                pilot.online = *online;
            }
        }
    }

    /// Look up a pilot.
    #[must_use]
    pub fn get(&self, id: &PilotId) -> Option<&Pilot> {
        self.pilots.get(id)
    }

    /// Whether the pilot is in the roster.
    #[must_use]
    pub fn contains(&self, id: &PilotId) -> bool {
        self.pilots.contains_key(id)
    }

    /// Ids of every pilot, in id order.
    #[must_use]
    pub fn ids(&self) -> Vec<PilotId> {
        self.pilots.keys().cloned().collect()
    }

    /// Iterate over the pilots in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pilot> {
        self.pilots.values()
    }

    /// Number of pilots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pilots.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty()
    }
}
