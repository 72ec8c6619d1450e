//! The shared flight plan.
//!
//! A [`FlightPlan`] is the ordered waypoint list the whole group edits. Its
//! content hash is the only thing replicas compare, so [`PlanHash`] must be
//! computed identically everywhere: it covers every waypoint field in order
//! and nothing else (the locally selected waypoint and the revision counter
//! are excluded).

pub mod sync;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::WaypointId;

pub use sync::{ApplyOutcome, Divergence, PlanAction, PlanEdit, Synchronizer, WaypointOperation};

/// A single coordinate of a waypoint's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Altitude in metres, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

impl GeoPoint {
    /// A point without altitude.
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng, alt: None }
    }
}

/// Display metadata of a waypoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaypointMeta {
    /// Name shown to pilots.
    #[serde(default)]
    pub name: String,
    /// Icon reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Colour reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Optional waypoints may be skipped.
    #[serde(default)]
    pub optional: bool,
}

/// One waypoint: a point or a polyline plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Stable id of the waypoint.
    pub id: WaypointId,
    /// One point for a turnpoint, several for a route segment.
    pub geometry: Vec<GeoPoint>,
    /// Display metadata.
    #[serde(default)]
    pub metadata: WaypointMeta,
}

impl Waypoint {
    /// A single-point waypoint.
    #[must_use]
    pub fn point(id: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: WaypointId::new(id),
            geometry: vec![GeoPoint::new(lat, lng)],
            metadata: WaypointMeta {
                name: name.into(),
                ..WaypointMeta::default()
            },
        }
    }
}

/// Hex-encoded BLAKE3 digest of a plan's waypoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanHash(String);

impl PlanHash {
    /// Hash an ordered waypoint list.
    #[must_use]
    pub fn of(waypoints: &[Waypoint]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(waypoints.len() as u64).to_le_bytes());
        for waypoint in waypoints {
            put_str(&mut hasher, waypoint.id.as_str());
            hasher.update(&(waypoint.geometry.len() as u64).to_le_bytes());
            for point in &waypoint.geometry {
                hasher.update(&point.lat.to_le_bytes());
                hasher.update(&point.lng.to_le_bytes());
                match point.alt {
                    Some(alt) => {
                        hasher.update(&[1]);
                        hasher.update(&alt.to_le_bytes());
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
            let meta = &waypoint.metadata;
            put_str(&mut hasher, &meta.name);
            put_opt_str(&mut hasher, meta.icon.as_deref());
            put_opt_str(&mut hasher, meta.color.as_deref());
            hasher.update(&[u8::from(meta.optional)]);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Wrap a hash received from the wire.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough to tell hashes apart in logs.
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

fn put_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn put_opt_str(hasher: &mut blake3::Hasher, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update(&[1]);
            put_str(hasher, value);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// Errors applying an operation to a plan.
///
/// These are an expected outcome of concurrent editing, not failures: the
/// synchronizer answers them with a resync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The operation points past the end of the plan.
    #[error("index {index} out of range for plan of {len} waypoints")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Length of the plan at the time.
        len: usize,
    },

    /// `new` and `modify` need a waypoint.
    #[error("{action} operation carries no waypoint data")]
    MissingData {
        /// The action that was missing its data.
        action: PlanAction,
    },

    /// `sort` needs a destination.
    #[error("sort operation carries no new index")]
    MissingNewIndex,
}

/// Whole-plan payload used by `FlightPlanSync` and `GroupInfoResponse`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Waypoints in order.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    /// Plan revision; servers that do not track revisions omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// The group's flight plan as held by one replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightPlan {
    waypoints: Vec<Waypoint>,
    current: Option<usize>,
    revision: u64,
    tracked: bool,
}

impl FlightPlan {
    /// An empty plan at revision 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from a snapshot. No waypoint is selected.
    #[must_use]
    pub fn from_snapshot(snapshot: PlanSnapshot) -> Self {
        Self {
            waypoints: snapshot.waypoints,
            current: None,
            revision: snapshot.revision.unwrap_or_default(),
            tracked: snapshot.revision.is_some(),
        }
    }

    /// The wire form of this plan.
    #[must_use]
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            waypoints: self.waypoints.clone(),
            revision: self.tracked.then_some(self.revision),
        }
    }

    /// Content hash of the waypoints.
    #[must_use]
    pub fn hash(&self) -> PlanHash {
        PlanHash::of(&self.waypoints)
    }

    /// Waypoints in order.
    #[must_use]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the plan has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Index of the waypoint the local pilot is flying to.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// The waypoint the local pilot is flying to.
    #[must_use]
    pub fn current_waypoint(&self) -> Option<&Waypoint> {
        self.current.and_then(|index| self.waypoints.get(index))
    }

    /// Select the waypoint to fly to, or clear the selection.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::IndexOutOfRange`] if `index` is past the end.
    pub fn set_current(&mut self, index: Option<usize>) -> Result<(), PlanError> {
        if let Some(index) = index {
            self.check_index(index)?;
        }
        self.current = index;
        Ok(())
    }

    /// Number of operations committed since the last snapshot revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the revision was set by the server. An untracked plan is
    /// verified by hash alone.
    #[must_use]
    pub fn tracks_revision(&self) -> bool {
        self.tracked
    }

    /// Position of the waypoint with the given id.
    #[must_use]
    pub fn position_of(&self, id: &WaypointId) -> Option<usize> {
        self.waypoints.iter().position(|waypoint| &waypoint.id == id)
    }

    fn check_index(&self, index: usize) -> Result<(), PlanError> {
        if index < self.waypoints.len() {
            Ok(())
        } else {
            Err(PlanError::IndexOutOfRange {
                index,
                len: self.waypoints.len(),
            })
        }
    }
}
