//! Wire protocol: the closed message catalogue and its framing.
//!
//! Every event on the channel is one [`Message`] variant. Frames are decoded
//! once, at the transport boundary, so the rest of the client only ever sees
//! typed messages and every handler is checked for exhaustiveness.
//!
//! On the wire a frame is a JSON object:
//!
//! ```json
//! {"event": "JoinGroupRequest", "id": 4, "payload": {"targetId": "g-17"}}
//! ```
//!
//! `id` is present on requests and echoed on their responses.

mod ids;
mod messages;
mod status;

use serde::{Deserialize, Serialize};

pub use ids::{GroupId, PilotId, RequestId, WaypointId};
pub use messages::{
    ChatLogRequest, ChatLogResponse, FlightPlanSync, GeoPosition, GroupInfoRequest,
    GroupInfoResponse, JoinGroupRequest, JoinGroupResponse, LeaveGroupRequest,
    LeaveGroupResponse, LoginRequest, LoginResponse, PilotJoinedGroup, PilotLeftGroup, PilotMeta,
    PilotTelemetry, PilotWaypointSelections, PilotsStatusRequest, PilotsStatusResponse,
    RegisterRequest, RegisterResponse, Telemetry, TextMessage, TimeWindow, UpdateProfileRequest,
    UpdateProfileResponse,
};
pub use status::StatusCode;

use crate::error::{Error, Result};
use crate::plan::WaypointOperation;

/// Protocol version spoken by this client.
pub const API_VERSION: u32 = 3;

/// Every event that can travel over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Message {
    /// Register a new pilot.
    RegisterRequest(RegisterRequest),
    /// Credentials for a newly registered pilot.
    RegisterResponse(RegisterResponse),
    /// Log in with stored credentials.
    LoginRequest(LoginRequest),
    /// Login outcome.
    LoginResponse(LoginResponse),
    /// Replace our profile on the server.
    UpdateProfileRequest(UpdateProfileRequest),
    /// Profile update outcome.
    UpdateProfileResponse(UpdateProfileResponse),
    /// Join a group or follow an invite.
    JoinGroupRequest(JoinGroupRequest),
    /// Join outcome.
    JoinGroupResponse(JoinGroupResponse),
    /// Leave or split from the current group.
    LeaveGroupRequest(LeaveGroupRequest),
    /// Leave outcome.
    LeaveGroupResponse(LeaveGroupResponse),
    /// Ask for a group snapshot.
    GroupInfoRequest(GroupInfoRequest),
    /// Group snapshot.
    GroupInfoResponse(GroupInfoResponse),
    /// One edit to the shared flight plan.
    FlightPlanUpdate(WaypointOperation),
    /// Whole flight plan pushed by the server.
    FlightPlanSync(FlightPlanSync),
    /// Position report.
    PilotTelemetry(PilotTelemetry),
    /// Chat line.
    TextMessage(TextMessage),
    /// Ask for chat replay.
    ChatLogRequest(ChatLogRequest),
    /// Chat replay.
    ChatLogResponse(ChatLogResponse),
    /// A pilot joined our group.
    PilotJoinedGroup(PilotJoinedGroup),
    /// A pilot left our group.
    PilotLeftGroup(PilotLeftGroup),
    /// Selected waypoint per pilot.
    PilotWaypointSelections(PilotWaypointSelections),
    /// Ask which pilots are online.
    PilotsStatusRequest(PilotsStatusRequest),
    /// Online flags.
    PilotsStatusResponse(PilotsStatusResponse),
}

/// The request/response pairs of the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `RegisterRequest` / `RegisterResponse`.
    Register,
    /// `LoginRequest` / `LoginResponse`.
    Login,
    /// `UpdateProfileRequest` / `UpdateProfileResponse`.
    UpdateProfile,
    /// `JoinGroupRequest` / `JoinGroupResponse`.
    JoinGroup,
    /// `LeaveGroupRequest` / `LeaveGroupResponse`.
    LeaveGroup,
    /// `GroupInfoRequest` / `GroupInfoResponse`.
    GroupInfo,
    /// `ChatLogRequest` / `ChatLogResponse`.
    ChatLog,
    /// `PilotsStatusRequest` / `PilotsStatusResponse`.
    PilotsStatus,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::UpdateProfile => "update_profile",
            Self::JoinGroup => "join_group",
            Self::LeaveGroup => "leave_group",
            Self::GroupInfo => "group_info",
            Self::ChatLog => "chat_log",
            Self::PilotsStatus => "pilots_status",
        };
        f.write_str(name)
    }
}

impl Message {
    /// The event name used on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterRequest(_) => "RegisterRequest",
            Self::RegisterResponse(_) => "RegisterResponse",
            Self::LoginRequest(_) => "LoginRequest",
            Self::LoginResponse(_) => "LoginResponse",
            Self::UpdateProfileRequest(_) => "UpdateProfileRequest",
            Self::UpdateProfileResponse(_) => "UpdateProfileResponse",
            Self::JoinGroupRequest(_) => "JoinGroupRequest",
            Self::JoinGroupResponse(_) => "JoinGroupResponse",
            Self::LeaveGroupRequest(_) => "LeaveGroupRequest",
            Self::LeaveGroupResponse(_) => "LeaveGroupResponse",
            Self::GroupInfoRequest(_) => "GroupInfoRequest",
            Self::GroupInfoResponse(_) => "GroupInfoResponse",
            Self::FlightPlanUpdate(_) => "FlightPlanUpdate",
            Self::FlightPlanSync(_) => "FlightPlanSync",
            Self::PilotTelemetry(_) => "PilotTelemetry",
            Self::TextMessage(_) => "TextMessage",
            Self::ChatLogRequest(_) => "ChatLogRequest",
            Self::ChatLogResponse(_) => "ChatLogResponse",
            Self::PilotJoinedGroup(_) => "PilotJoinedGroup",
            Self::PilotLeftGroup(_) => "PilotLeftGroup",
            Self::PilotWaypointSelections(_) => "PilotWaypointSelections",
            Self::PilotsStatusRequest(_) => "PilotsStatusRequest",
            Self::PilotsStatusResponse(_) => "PilotsStatusResponse",
        }
    }

    /// The request kind, if this message is a request.
    #[must_use]
    pub fn request_kind(&self) -> Option<RequestKind> {
        match self {
            Self::RegisterRequest(_) => Some(RequestKind::Register),
            Self::LoginRequest(_) => Some(RequestKind::Login),
            Self::UpdateProfileRequest(_) => Some(RequestKind::UpdateProfile),
            Self::JoinGroupRequest(_) => Some(RequestKind::JoinGroup),
            Self::LeaveGroupRequest(_) => Some(RequestKind::LeaveGroup),
            Self::GroupInfoRequest(_) => Some(RequestKind::GroupInfo),
            Self::ChatLogRequest(_) => Some(RequestKind::ChatLog),
            Self::PilotsStatusRequest(_) => Some(RequestKind::PilotsStatus),
            _ => None,
        }
    }

    /// The request kind this message answers, if it is a response.
    #[must_use]
    pub fn response_kind(&self) -> Option<RequestKind> {
        match self {
            Self::RegisterResponse(_) => Some(RequestKind::Register),
            Self::LoginResponse(_) => Some(RequestKind::Login),
            Self::UpdateProfileResponse(_) => Some(RequestKind::UpdateProfile),
            Self::JoinGroupResponse(_) => Some(RequestKind::JoinGroup),
            Self::LeaveGroupResponse(_) => Some(RequestKind::LeaveGroup),
            Self::GroupInfoResponse(_) => Some(RequestKind::GroupInfo),
            Self::ChatLogResponse(_) => Some(RequestKind::ChatLog),
            Self::PilotsStatusResponse(_) => Some(RequestKind::PilotsStatus),
            _ => None,
        }
    }

    /// Status code of a response.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RegisterResponse(r) => Some(r.status),
            Self::LoginResponse(r) => Some(r.status),
            Self::UpdateProfileResponse(r) => Some(r.status),
            Self::JoinGroupResponse(r) => Some(r.status),
            Self::LeaveGroupResponse(r) => Some(r.status),
            Self::GroupInfoResponse(r) => Some(r.status),
            Self::ChatLogResponse(r) => Some(r.status),
            Self::PilotsStatusResponse(r) => Some(r.status),
            _ => None,
        }
    }
}

/// A message plus its optional correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Correlation id; set on requests and echoed on responses.
    pub id: Option<RequestId>,
    /// The message itself.
    pub message: Message,
}

impl Frame {
    /// A frame without a correlation id (events, broadcasts).
    #[must_use]
    pub fn event(message: Message) -> Self {
        Self { id: None, message }
    }

    /// A frame carrying a correlation id.
    #[must_use]
    pub fn request(id: RequestId, message: Message) -> Self {
        Self {
            id: Some(id),
            message,
        }
    }

    /// Serialize to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let mut value = serde_json::to_value(&self.message)?;
        if let (Some(id), Some(object)) = (self.id, value.as_object_mut()) {
            object.insert("id".to_string(), serde_json::Value::from(id.0));
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// Parse one JSON frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, the `id` is not an
    /// unsigned integer, or the event is not part of the catalogue.
    pub fn decode(text: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::protocol("frame is not a JSON object"))?;

        let id = match object.remove("id") {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => Some(RequestId(raw.as_u64().ok_or_else(|| {
                Error::protocol(format!("invalid request id: {raw}"))
            })?)),
        };

        let message = serde_json::from_value(value)?;
        Ok(Self { id, message })
    }
}
