//! Payload types for every event in the message catalogue.
//!
//! Response fields that only make sense on success are `#[serde(default)]`
//! so that a bare `{"status": 2}` still decodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{GroupId, PilotId, WaypointId};
use super::status::StatusCode;
use crate::plan::PlanSnapshot;

/// Public profile of a pilot as exchanged on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotMeta {
    /// Public pilot id.
    pub id: PilotId,
    /// Display name.
    pub name: String,
    /// Avatar reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Position fix as reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Altitude in metres.
    #[serde(default)]
    pub altitude: f64,
    /// Horizontal accuracy in metres.
    #[serde(default)]
    pub accuracy: f64,
    /// Heading in degrees.
    #[serde(default)]
    pub heading: f64,
    /// Ground speed.
    #[serde(default)]
    pub speed: f64,
}

/// Position plus fuel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Latest position fix.
    pub geo_pos: GeoPosition,
    /// Remaining fuel.
    #[serde(default)]
    pub fuel: f64,
}

/// First contact from a pilot without stored credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Profile to register.
    pub pilot: PilotMeta,
}

/// Credentials issued by the server on registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Private login secret. Empty on failure.
    #[serde(default)]
    pub secret_id: String,
    /// Public id assigned to the pilot.
    #[serde(default)]
    pub pilot_id: PilotId,
}

/// Login with previously issued credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Private login secret.
    pub secret_id: String,
    /// Public pilot id the secret belongs to.
    pub pilot_id: PilotId,
}

/// Login outcome, with the server's protocol version and profile hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Public id the server logged us in as.
    #[serde(default)]
    pub pilot_id: PilotId,
    /// Server protocol version.
    #[serde(default)]
    pub api_version: u32,
    /// Hash of the profile the server holds for us.
    #[serde(default)]
    pub pilot_meta_hash: String,
}

/// Replace the profile the server holds for us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    /// New profile.
    pub pilot: PilotMeta,
    /// Private login secret authorizing the change.
    pub secret_id: String,
}

/// Profile update outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfileResponse {
    /// Outcome.
    pub status: StatusCode,
}

/// Join request. The target is either a group id or, when following an
/// invite, the inviting pilot's public id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupRequest {
    /// Group id or inviting pilot id.
    pub target_id: String,
}

/// Join outcome and the group we ended up in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Group joined, or `NULL` when none.
    #[serde(default)]
    pub group_id: GroupId,
}

/// Leave the current group, optionally splitting into a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveGroupRequest {
    /// Start a fresh group instead of flying solo.
    pub split_requested: bool,
}

/// Leave outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveGroupResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Group after a split, `NULL` otherwise.
    #[serde(default)]
    pub group_id: GroupId,
}

/// Ask for a full snapshot of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfoRequest {
    /// Group to describe.
    pub group_id: GroupId,
}

/// Authoritative snapshot of a group: roster and flight plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfoResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Group described.
    #[serde(default)]
    pub group_id: GroupId,
    /// Map layers the group has enabled.
    #[serde(default)]
    pub map_layers: Vec<String>,
    /// Every member, possibly including us.
    #[serde(default)]
    pub pilots: Vec<PilotMeta>,
    /// Current flight plan.
    #[serde(default)]
    pub flight_plan: PlanSnapshot,
}

/// Whole flight plan pushed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightPlanSync {
    /// Replacement plan.
    pub flight_plan: PlanSnapshot,
}

/// Position report from one pilot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotTelemetry {
    /// Reporting pilot.
    pub pilot_id: PilotId,
    /// Fix time, Unix milliseconds.
    pub timestamp: i64,
    /// Position and motion.
    pub telemetry: Telemetry,
}

/// One chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    /// Send time, Unix milliseconds.
    pub timestamp: i64,
    /// Sender-local sequence number.
    #[serde(default)]
    pub index: u32,
    /// Group the message was sent to.
    pub group_id: GroupId,
    /// Sender.
    pub pilot_id: PilotId,
    /// Message body.
    pub text: String,
}

/// Inclusive time range in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First millisecond included.
    pub start: i64,
    /// Last millisecond included.
    pub end: i64,
}

/// Ask for the chat messages of a group within a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogRequest {
    /// Range to replay.
    pub time_window: TimeWindow,
    /// Group whose log we want.
    pub group_id: GroupId,
}

/// Replayed chat messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Group the log belongs to.
    #[serde(default)]
    pub group_id: GroupId,
    /// Messages in the requested window.
    #[serde(default)]
    pub msgs: Vec<TextMessage>,
}

/// A pilot joined our group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotJoinedGroup {
    /// Newcomer's profile.
    pub pilot: PilotMeta,
}

/// A pilot left our group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotLeftGroup {
    /// Departing pilot.
    pub pilot_id: PilotId,
    /// Group they moved to, `NULL` when they went solo.
    #[serde(default)]
    pub new_group_id: GroupId,
}

/// Which waypoint each pilot has selected, keyed by pilot id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PilotWaypointSelections(pub BTreeMap<PilotId, WaypointId>);

/// Ask which of the given pilots are connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotsStatusRequest {
    /// Pilots to check.
    pub pilot_ids: Vec<PilotId>,
}

/// Online flags for the pilots asked about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotsStatusResponse {
    /// Outcome.
    pub status: StatusCode,
    /// Connected flag per pilot.
    #[serde(default)]
    pub pilots_online: BTreeMap<PilotId, bool>,
}
