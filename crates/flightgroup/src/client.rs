//! The replica: session, membership, roster, flight plan and chat behind
//! one message handler.
//!
//! [`Client`] does no I/O. The runtime feeds it [`TransportEvent`]s and
//! commands, then drains the frames it queued for the server with
//! [`Client::drain_outbox`] and the consumer-facing notifications with
//! [`Client::drain_events`]. Every inbound message goes through the single
//! exhaustive match in `handle_message`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::chat::{replay_window, ChatLog};
use crate::group::{GroupMembership, JoinOutcome, LeaveOutcome};
use crate::identity::Identity;
use crate::pending::Resolution;
use crate::plan::{ApplyOutcome, Divergence, FlightPlan, PlanEdit, PlanError, Synchronizer};
use crate::protocol::{
    ChatLogRequest, ChatLogResponse, Frame, GroupId, GroupInfoRequest, GroupInfoResponse,
    JoinGroupResponse, LeaveGroupResponse, LoginResponse, Message, PilotId, PilotLeftGroup,
    PilotTelemetry, PilotWaypointSelections, PilotsStatusRequest, RegisterResponse, RequestId,
    RequestKind, StatusCode, Telemetry, TextMessage, WaypointId,
};
use crate::roster::{Roster, RosterUpdate};
use crate::session::{LoginOutcome, RegisterOutcome, Session, SessionState, VersionCheck};
use crate::transport::TransportEvent;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Tunables of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long a request may stay unanswered.
    pub request_timeout: Duration,
    /// How far back a chat replay may reach.
    pub chat_replay_window: chrono::Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            chat_replay_window: chrono::Duration::minutes(30),
        }
    }
}

/// How the flight plan changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChange {
    /// An operation was verified and committed.
    Committed,
    /// An operation was rejected and undone; a resync has been requested.
    RolledBack(Divergence),
    /// The plan was replaced by authoritative content.
    Replaced,
}

/// Notifications for whoever presents or persists the replica.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection state moved.
    SessionStateChanged(SessionState),
    /// Credentials or profile changed and should be persisted.
    IdentityChanged(Identity),
    /// The confirmed group changed ([`GroupId::NULL`] when ungrouped).
    GroupChanged(GroupId),
    /// Server and client speak different protocol versions.
    VersionMismatch(VersionCheck),
    /// The server refused a request.
    RequestFailed {
        /// What was asked.
        request: RequestKind,
        /// Why it was refused.
        status: StatusCode,
    },
    /// A request went unanswered.
    RequestTimedOut(RequestKind),
    /// Pilots joined, left or changed status.
    RosterChanged,
    /// New telemetry for a pilot.
    TelemetryUpdated(PilotId),
    /// A pilot left our group for another one.
    PilotMovedGroup {
        /// Who moved.
        pilot: PilotId,
        /// Where to.
        group: GroupId,
    },
    /// The flight plan changed or an edit was undone.
    FlightPlanChanged(PlanChange),
    /// A chat message not seen before.
    ChatMessage(TextMessage),
}

/// One pilot's replica of the group state.
pub struct Client {
    identity: Identity,
    membership: GroupMembership,
    session: Option<Session>,
    roster: Roster,
    plan: Synchronizer,
    chat: ChatLog,
    map_layers: Vec<String>,
    options: ClientOptions,
    clock: Clock,
    outbox: VecDeque<Frame>,
    events: VecDeque<ClientEvent>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pilot", &self.identity.public_id)
            .field("group", self.membership.group())
            .field("state", &self.session_state())
            .field("pilots", &self.roster.len())
            .field("waypoints", &self.plan.plan().len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A disconnected client for `identity`, remembering `membership` from a
    /// previous run.
    #[must_use]
    pub fn new(identity: Identity, membership: GroupMembership, options: ClientOptions) -> Self {
        Self {
            identity,
            membership,
            session: None,
            roster: Roster::new(),
            plan: Synchronizer::new(),
            chat: ChatLog::new(),
            map_layers: Vec::new(),
            options,
            clock: Arc::new(Utc::now),
            outbox: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // Accessors

    /// The local pilot.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Group membership.
    #[must_use]
    pub fn membership(&self) -> &GroupMembership {
        &self.membership
    }

    /// Connection state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Disconnected, Session::state)
    }

    /// Whether login has completed on the current connection.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_authenticated)
    }

    /// Other pilots of the group.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The group flight plan.
    #[must_use]
    pub fn plan(&self) -> &FlightPlan {
        self.plan.plan()
    }

    /// Chat of the group.
    #[must_use]
    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    /// Map layers announced for the group.
    #[must_use]
    pub fn map_layers(&self) -> &[String] {
        &self.map_layers
    }

    /// Frames waiting to be sent, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<Frame> {
        self.outbox.drain(..).collect()
    }

    /// Events produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        self.events.drain(..).collect()
    }

    /// Load chat history kept from a previous run. No events are emitted.
    pub fn seed_chat(&mut self, messages: impl IntoIterator<Item = TextMessage>) {
        let group = self.membership.group().clone();
        for message in messages {
            self.chat.insert(&group, message);
        }
    }

    /// Remember an invite to follow once authenticated.
    pub fn set_invite(&mut self, target: impl Into<String>) {
        self.membership.set_invite(target);
    }

    // Transport

    /// Feed one transport event.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        let before = self.session_state();
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Frame(frame) => self.handle_frame(frame),
        }
        let after = self.session_state();
        if before != after {
            self.events.push_back(ClientEvent::SessionStateChanged(after));
        }
    }

    fn on_connected(&mut self) {
        if self.session.is_some() {
            warn!("Connected twice without a disconnect, restarting session");
        }
        let mut session = Session::connect(self.options.request_timeout);
        let message = session.bootstrap(&self.identity);
        self.session = Some(session);
        self.send_request(message);
    }

    fn on_disconnected(&mut self) {
        if let Some(mut session) = self.session.take() {
            let cancelled = session.pending().len();
            session.pending().cancel_all();
            info!(cancelled, "Disconnected from relay");
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        let Some(session) = self.session.as_mut() else {
            warn!(event = frame.message.name(), "Frame received without a session");
            return;
        };

        if let Some(kind) = frame.message.response_kind() {
            match session.pending().resolve(kind, frame.id) {
                Resolution::Matched(request) => {
                    trace!(request = %kind, id = %request.id, "Response matched");
                }
                Resolution::Unsolicited => {
                    debug!(response = %kind, "Response without a pending request");
                }
                Resolution::Stale => return,
            }

            let auth = matches!(kind, RequestKind::Register | RequestKind::Login);
            if !auth && frame.message.status() == Some(StatusCode::InvalidSecretId) {
                let login = session.on_credentials_rejected(&self.identity);
                self.send_request(login);
            }
        }

        self.handle_message(frame.message);
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::RegisterResponse(response) => self.on_register(response),
            Message::LoginResponse(response) => self.on_login(&response),
            Message::UpdateProfileResponse(response) => {
                if response.status.is_ok() {
                    debug!("Profile updated");
                } else {
                    self.fail(RequestKind::UpdateProfile, response.status);
                }
            }
            Message::JoinGroupResponse(response) => self.on_join(&response),
            Message::LeaveGroupResponse(response) => self.on_leave(&response),
            Message::GroupInfoResponse(response) => self.on_group_info(response),
            Message::FlightPlanUpdate(op) => {
                if !self.membership.is_grouped() {
                    debug!("Flight plan operation outside a group, ignoring");
                    return;
                }
                match self.plan.apply_remote(&op) {
                    ApplyOutcome::Committed => {
                        self.emit(ClientEvent::FlightPlanChanged(PlanChange::Committed));
                    }
                    ApplyOutcome::Diverged(divergence) => {
                        self.emit(ClientEvent::FlightPlanChanged(PlanChange::RolledBack(
                            divergence,
                        )));
                        self.request_group_info();
                    }
                }
            }
            Message::FlightPlanSync(sync) => {
                self.plan.replace(sync.flight_plan);
                self.emit(ClientEvent::FlightPlanChanged(PlanChange::Replaced));
            }
            Message::PilotTelemetry(telemetry) => self.on_telemetry(telemetry),
            Message::TextMessage(message) => self.on_text(message),
            Message::ChatLogResponse(response) => self.on_chat_log(response),
            Message::PilotJoinedGroup(joined) => {
                if self.is_self(&joined.pilot.id) {
                    return;
                }
                self.roster.upsert(joined.pilot);
                self.emit(ClientEvent::RosterChanged);
            }
            Message::PilotLeftGroup(left) => self.on_pilot_left(left),
            Message::PilotWaypointSelections(selections) => self.on_selections(selections),
            Message::PilotsStatusResponse(response) => {
                if response.status.is_ok() {
                    self.roster.set_online(&response.pilots_online);
                    self.emit(ClientEvent::RosterChanged);
                } else {
                    self.fail(RequestKind::PilotsStatus, response.status);
                }
            }
            Message::RegisterRequest(_)
            | Message::LoginRequest(_)
            | Message::UpdateProfileRequest(_)
            | Message::JoinGroupRequest(_)
            | Message::LeaveGroupRequest(_)
            | Message::GroupInfoRequest(_)
            | Message::ChatLogRequest(_)
            | Message::PilotsStatusRequest(_) => {
                warn!(event = message.name(), "Ignoring server-bound request");
            }
        }
    }

    // Session

    fn on_register(&mut self, response: RegisterResponse) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.on_register_response(&mut self.identity, response) {
            RegisterOutcome::Registered => {
                let login = session.login(&self.identity);
                self.emit(ClientEvent::IdentityChanged(self.identity.clone()));
                self.send_request(login);
            }
            RegisterOutcome::Failed(status) => self.fail(RequestKind::Register, status),
        }
    }

    fn on_login(&mut self, response: &LoginResponse) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let previous_id = self.identity.public_id.clone();
        match session.on_login_response(&mut self.identity, response) {
            LoginOutcome::LoggedIn {
                version,
                profile_stale,
            } => {
                if self.identity.public_id != previous_id {
                    self.emit(ClientEvent::IdentityChanged(self.identity.clone()));
                }
                if version.is_mismatch() {
                    self.emit(ClientEvent::VersionMismatch(version));
                }
                if profile_stale {
                    debug!("Server profile is out of date, pushing ours");
                    self.send_request(Session::profile_update(&self.identity));
                }
                if let Some(target) = self.membership.rejoin_target() {
                    if self
                        .send_request(GroupMembership::join_request(&target))
                        .is_some()
                    {
                        if let Some(session) = self.session.as_mut() {
                            session.mark_rejoin();
                        }
                    }
                }
            }
            LoginOutcome::Reregister => {
                let register = session.register(&self.identity);
                self.emit(ClientEvent::IdentityChanged(self.identity.clone()));
                self.send_request(register);
            }
            LoginOutcome::Failed(status) => self.fail(RequestKind::Login, status),
        }
    }

    // Membership

    fn on_join(&mut self, response: &JoinGroupResponse) {
        let was_grouped = self.membership.is_grouped();
        let rejoin = self.session.as_mut().is_some_and(Session::take_rejoin);
        match self.membership.on_join_response(response) {
            JoinOutcome::Joined { group, changed } => {
                if changed {
                    self.reset_group_state();
                    self.emit(ClientEvent::GroupChanged(group));
                }
                self.request_group_info();
                self.request_chat_log();
            }
            // What we hold may predate the reconnect.
            JoinOutcome::AlreadyMember if rejoin => {
                debug!("Rejoined group after login, resynchronizing");
                self.request_group_info();
                self.request_chat_log();
            }
            JoinOutcome::AlreadyMember => debug!("Already a member of the group"),
            JoinOutcome::Invalid => {
                if was_grouped {
                    self.reset_group_state();
                    self.emit(ClientEvent::GroupChanged(GroupId::NULL));
                }
                self.fail(RequestKind::JoinGroup, StatusCode::InvalidId);
            }
            JoinOutcome::Failed(status) => self.fail(RequestKind::JoinGroup, status),
        }
    }

    fn on_leave(&mut self, response: &LeaveGroupResponse) {
        match self.membership.on_leave_response(response) {
            LeaveOutcome::Left { group } => {
                self.reset_group_state();
                let split = !group.is_null();
                self.emit(ClientEvent::GroupChanged(group));
                if split {
                    self.request_group_info();
                    self.request_chat_log();
                }
            }
            LeaveOutcome::AlreadyUngrouped => debug!("Not in a group, nothing to leave"),
            LeaveOutcome::Failed(status) => self.fail(RequestKind::LeaveGroup, status),
        }
    }

    fn reset_group_state(&mut self) {
        self.roster.clear();
        self.plan.clear();
        self.chat.clear();
        self.map_layers.clear();
    }

    fn on_group_info(&mut self, response: GroupInfoResponse) {
        if !response.status.is_ok() {
            self.fail(RequestKind::GroupInfo, response.status);
            return;
        }
        if &response.group_id != self.membership.group() {
            warn!(
                group = %self.membership.group(),
                received = %response.group_id,
                "Group info for another group, ignoring"
            );
            return;
        }
        self.roster
            .replace(response.pilots, &self.identity.public_id);
        self.plan.replace(response.flight_plan);
        self.map_layers = response.map_layers;
        debug!(
            pilots = self.roster.len(),
            waypoints = self.plan.plan().len(),
            "Group state resynchronized"
        );
        self.emit(ClientEvent::RosterChanged);
        self.emit(ClientEvent::FlightPlanChanged(PlanChange::Replaced));
    }

    // Roster

    fn on_telemetry(&mut self, telemetry: PilotTelemetry) {
        if self.is_self(&telemetry.pilot_id) {
            return;
        }
        match self.roster.update_telemetry(
            &telemetry.pilot_id,
            telemetry.timestamp,
            telemetry.telemetry,
        ) {
            RosterUpdate::Applied => {
                self.emit(ClientEvent::TelemetryUpdated(telemetry.pilot_id));
            }
            RosterUpdate::Unknown => {
                debug!(pilot = %telemetry.pilot_id, "Telemetry from unknown pilot");
                self.request_group_info();
            }
        }
    }

    fn on_selections(&mut self, selections: PilotWaypointSelections) {
        let mut unknown = false;
        let mut applied = false;
        for (pilot, waypoint) in selections.0 {
            if self.is_self(&pilot) {
                continue;
            }
            match self.roster.select_waypoint(&pilot, waypoint) {
                RosterUpdate::Applied => applied = true,
                RosterUpdate::Unknown => {
                    debug!(%pilot, "Waypoint selection from unknown pilot");
                    unknown = true;
                }
            }
        }
        if applied {
            self.emit(ClientEvent::RosterChanged);
        }
        if unknown {
            self.request_group_info();
        }
    }

    fn on_pilot_left(&mut self, left: PilotLeftGroup) {
        if self.is_self(&left.pilot_id) {
            return;
        }
        if self.roster.remove(&left.pilot_id).is_some() {
            self.emit(ClientEvent::RosterChanged);
        }
        if !left.new_group_id.is_null() && &left.new_group_id != self.membership.group() {
            info!(pilot = %left.pilot_id, group = %left.new_group_id, "Pilot moved to another group");
            self.emit(ClientEvent::PilotMovedGroup {
                pilot: left.pilot_id,
                group: left.new_group_id,
            });
        }
    }

    fn is_self(&self, id: &PilotId) -> bool {
        &self.identity.public_id == id
    }

    // Chat

    fn on_text(&mut self, message: TextMessage) {
        if !self.membership.is_grouped() {
            debug!("Chat message outside a group, ignoring");
            return;
        }
        let group = self.membership.group().clone();
        if self.chat.insert(&group, message.clone()) {
            self.emit(ClientEvent::ChatMessage(message));
        }
    }

    fn on_chat_log(&mut self, response: ChatLogResponse) {
        if !response.status.is_ok() {
            self.fail(RequestKind::ChatLog, response.status);
            return;
        }
        if &response.group_id != self.membership.group() {
            warn!(received = %response.group_id, "Chat log for another group, ignoring");
            return;
        }
        let group = response.group_id;
        let mut added = 0usize;
        for message in response.msgs {
            if self.chat.insert(&group, message.clone()) {
                added += 1;
                self.emit(ClientEvent::ChatMessage(message));
            }
        }
        debug!(added, "Chat log replayed");
    }

    // Outbound

    /// Join a group or follow a pilot's invite.
    ///
    /// Before authentication the target is kept as an invite and joined as
    /// soon as login completes.
    pub fn join_group(&mut self, target: &str) -> Option<RequestId> {
        if !self.is_authenticated() {
            debug!(target, "Not authenticated, joining after login");
            self.membership.set_invite(target);
            return None;
        }
        if let Some(session) = self.session.as_mut() {
            session.take_rejoin();
        }
        self.send_request(GroupMembership::join_request(target))
    }

    /// Leave the current group, optionally splitting off a new one.
    pub fn leave_group(&mut self, split: bool) -> Option<RequestId> {
        if !self.is_authenticated() {
            debug!("Not authenticated, leave not sent");
            return None;
        }
        self.send_request(GroupMembership::leave_request(split))
    }

    /// Send a chat message to the group. Returns `false` if it was not sent.
    pub fn send_chat(&mut self, text: impl Into<String>) -> bool {
        let now = self.now_millis();
        let group = self.membership.group().clone();
        let Some(session) = self.session.as_mut().filter(|s| s.is_authenticated()) else {
            debug!("Not authenticated, chat message dropped");
            return false;
        };
        if group.is_null() {
            debug!("Not in a group, chat message dropped");
            return false;
        }
        let message = TextMessage {
            timestamp: now,
            index: session.next_chat_index(),
            group_id: group.clone(),
            pilot_id: self.identity.public_id.clone(),
            text: text.into(),
        };
        // The echo is dropped as a duplicate of this entry.
        self.chat.insert(&group, message.clone());
        self.emit(ClientEvent::ChatMessage(message.clone()));
        self.send_event(Message::TextMessage(message));
        true
    }

    /// Share our position. Returns `false` if it was not sent.
    pub fn send_telemetry(&mut self, telemetry: Telemetry) -> bool {
        if !self.can_broadcast() {
            trace!("Telemetry dropped");
            return false;
        }
        let message = Message::PilotTelemetry(PilotTelemetry {
            pilot_id: self.identity.public_id.clone(),
            timestamp: self.now_millis(),
            telemetry,
        });
        self.send_event(message);
        true
    }

    /// Propose an edit of the group plan.
    ///
    /// The local plan is unchanged until the server echoes the operation.
    /// Returns `Ok(false)` when there is nobody to send it to.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] if the edit does not fit the current plan.
    pub fn edit_plan(&mut self, edit: PlanEdit) -> Result<bool, PlanError> {
        if !self.can_broadcast() {
            debug!("Not in a group, flight plan edit dropped");
            return Ok(false);
        }
        let op = self.plan.propose(edit)?;
        debug!(action = %op.action, index = op.index, hash = %op.expected_hash, "Proposing flight plan edit");
        self.send_event(Message::FlightPlanUpdate(op));
        Ok(true)
    }

    /// Select the waypoint we fly to and tell the group.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::IndexOutOfRange`] if `index` is past the end.
    pub fn select_waypoint(&mut self, index: Option<usize>) -> Result<(), PlanError> {
        self.plan.select(index)?;
        if !self.can_broadcast() {
            return Ok(());
        }
        let waypoint = self
            .plan
            .plan()
            .current_waypoint()
            .map_or(WaypointId::NULL, |waypoint| waypoint.id.clone());
        let mut selections = PilotWaypointSelections::default();
        selections
            .0
            .insert(self.identity.public_id.clone(), waypoint);
        self.send_event(Message::PilotWaypointSelections(selections));
        Ok(())
    }

    /// Change our profile and push it to the server when logged in.
    pub fn update_profile(
        &mut self,
        name: impl Into<String>,
        avatar: Option<String>,
    ) -> Option<RequestId> {
        self.identity.name = name.into();
        self.identity.avatar = avatar;
        self.emit(ClientEvent::IdentityChanged(self.identity.clone()));
        if !self.is_authenticated() {
            return None;
        }
        self.send_request(Session::profile_update(&self.identity))
    }

    /// Ask which pilots of the roster are online.
    pub fn request_pilot_status(&mut self) -> Option<RequestId> {
        if !self.is_authenticated() || self.roster.is_empty() {
            return None;
        }
        let request = PilotsStatusRequest {
            pilot_ids: self.roster.ids(),
        };
        self.send_request(Message::PilotsStatusRequest(request))
    }

    /// Expire requests that went unanswered.
    pub fn poll_timeouts(&mut self) {
        let now = self.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for request in session.pending().expire(now) {
            warn!(request = %request.kind, id = %request.id, "Request timed out");
            self.events
                .push_back(ClientEvent::RequestTimedOut(request.kind));
        }
    }

    fn request_group_info(&mut self) {
        if !self.membership.is_grouped() {
            return;
        }
        let request = GroupInfoRequest {
            group_id: self.membership.group().clone(),
        };
        self.send_request(Message::GroupInfoRequest(request));
    }

    fn request_chat_log(&mut self) {
        let request = ChatLogRequest {
            time_window: replay_window(
                self.chat.last_timestamp(),
                self.now(),
                self.options.chat_replay_window,
            ),
            group_id: self.membership.group().clone(),
        };
        self.send_request(Message::ChatLogRequest(request));
    }

    fn can_broadcast(&self) -> bool {
        self.is_authenticated() && self.membership.is_grouped()
    }

    /// Queue a request. Group info requests are coalesced while one is in
    /// flight.
    fn send_request(&mut self, message: Message) -> Option<RequestId> {
        let kind = message.request_kind()?;
        let now = self.now();
        let Some(session) = self.session.as_mut() else {
            debug!(request = %kind, "Not connected, request not sent");
            return None;
        };
        if kind == RequestKind::GroupInfo && session.pending().is_pending(kind) {
            debug!("Group info already requested");
            return None;
        }
        let id = session.pending().issue(kind, now);
        trace!(request = %kind, %id, "Queued request");
        self.outbox.push_back(Frame::request(id, message));
        Some(id)
    }

    fn send_event(&mut self, message: Message) {
        self.outbox.push_back(Frame::event(message));
    }

    fn fail(&mut self, request: RequestKind, status: StatusCode) {
        warn!(%request, %status, "Request failed");
        self.emit(ClientEvent::RequestFailed { request, status });
    }

    fn emit(&mut self, event: ClientEvent) {
        self.events.push_back(event);
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;
    use crate::plan::{PlanAction, PlanHash, PlanSnapshot, Waypoint, WaypointOperation};
    use crate::protocol::{
        GeoPosition, PilotJoinedGroup, PilotMeta, PilotsStatusResponse, API_VERSION,
    };

    const START_MS: i64 = 1_700_000_000_000;

    struct Harness {
        client: Client,
        now: Arc<AtomicI64>,
    }

    impl Harness {
        fn new(identity: Identity, membership: GroupMembership) -> Self {
            let now = Arc::new(AtomicI64::new(START_MS));
            let source = Arc::clone(&now);
            let clock: Clock = Arc::new(move || {
                DateTime::from_timestamp_millis(source.load(Ordering::SeqCst)).unwrap()
            });
            let client = Client::new(identity, membership, ClientOptions::default())
                .with_clock(clock);
            Self { client, now }
        }

        fn advance(&self, duration: Duration) {
            let millis = i64::try_from(duration.as_millis()).unwrap();
            self.now.fetch_add(millis, Ordering::SeqCst);
        }

        fn receive(&mut self, message: Message) {
            self.client
                .handle_transport(TransportEvent::Frame(Frame::event(message)));
        }

        fn receive_with_id(&mut self, id: RequestId, message: Message) {
            self.client
                .handle_transport(TransportEvent::Frame(Frame::request(id, message)));
        }

        fn sent(&mut self) -> Vec<Message> {
            self.client
                .drain_outbox()
                .into_iter()
                .map(|frame| frame.message)
                .collect()
        }

        fn events(&mut self) -> Vec<ClientEvent> {
            self.client.drain_events()
        }

        fn login_ok(&mut self) {
            let hash = self.client.identity().meta_hash();
            self.receive(Message::LoginResponse(LoginResponse {
                status: StatusCode::Ok,
                pilot_id: PilotId::new("me"),
                api_version: API_VERSION,
                pilot_meta_hash: hash,
            }));
        }
    }

    fn registered() -> Identity {
        Identity {
            public_id: PilotId::new("me"),
            secret_id: "secret".to_string(),
            name: "Me".to_string(),
            avatar: None,
        }
    }

    fn wp(id: &str) -> Waypoint {
        Waypoint::point(id, id.to_uppercase(), 46.0, 7.0)
    }

    fn meta(id: &str) -> PilotMeta {
        PilotMeta {
            id: PilotId::new(id),
            name: id.to_uppercase(),
            avatar: None,
        }
    }

    fn group_info(group: &str, pilots: &[&str], waypoints: &[&str]) -> Message {
        Message::GroupInfoResponse(GroupInfoResponse {
            status: StatusCode::Ok,
            group_id: GroupId::new(group),
            map_layers: vec!["thermals".to_string()],
            pilots: pilots.iter().map(|id| meta(id)).collect(),
            flight_plan: PlanSnapshot {
                waypoints: waypoints.iter().map(|id| wp(id)).collect(),
                revision: Some(0),
            },
        })
    }

    fn telemetry(pilot: &str) -> Message {
        Message::PilotTelemetry(PilotTelemetry {
            pilot_id: PilotId::new(pilot),
            timestamp: START_MS,
            telemetry: Telemetry {
                geo_pos: GeoPosition {
                    lat: 46.1,
                    lng: 7.2,
                    ..GeoPosition::default()
                },
                fuel: 2.5,
            },
        })
    }

    fn count_group_info(messages: &[Message]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, Message::GroupInfoRequest(_)))
            .count()
    }

    /// Connected, logged in and synced into `group` with `pilots` and a plan.
    fn in_group(group: &str, pilots: &[&str], waypoints: &[&str]) -> Harness {
        let mut h = Harness::new(registered(), GroupMembership::restore(GroupId::new(group)));
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::Ok,
            group_id: GroupId::new(group),
        }));
        h.receive(group_info(group, pilots, waypoints));
        h.sent();
        h.events();
        h
    }

    fn ids(client: &Client) -> Vec<String> {
        client
            .plan()
            .waypoints()
            .iter()
            .map(|w| w.id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_connect_without_credentials_registers() {
        let mut h = Harness::new(Identity::new("Ada"), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);

        assert!(matches!(h.sent().as_slice(), [Message::RegisterRequest(_)]));
        assert_eq!(h.client.session_state(), SessionState::AwaitingAuth);
        assert_eq!(
            h.events(),
            vec![ClientEvent::SessionStateChanged(SessionState::AwaitingAuth)]
        );
    }

    #[test]
    fn test_register_then_login() {
        let mut h = Harness::new(Identity::new("Ada"), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();
        h.events();

        h.receive(Message::RegisterResponse(RegisterResponse {
            status: StatusCode::Ok,
            secret_id: "fresh".to_string(),
            pilot_id: PilotId::new("p9"),
        }));
        let sent = h.sent();
        match sent.as_slice() {
            [Message::LoginRequest(request)] => {
                assert_eq!(request.secret_id, "fresh");
                assert_eq!(request.pilot_id, PilotId::new("p9"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h
            .events()
            .iter()
            .any(|e| matches!(e, ClientEvent::IdentityChanged(identity) if identity.secret_id == "fresh")));
    }

    #[test]
    fn test_rejected_login_falls_back_to_register() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();

        h.receive(Message::LoginResponse(LoginResponse {
            status: StatusCode::InvalidSecretId,
            ..LoginResponse::default()
        }));
        assert!(matches!(h.sent().as_slice(), [Message::RegisterRequest(_)]));
        assert!(!h.client.identity().is_registered());
    }

    #[test]
    fn test_login_completes_on_version_mismatch() {
        for server in [API_VERSION - 1, API_VERSION + 1] {
            let mut h = Harness::new(registered(), GroupMembership::new());
            h.client.handle_transport(TransportEvent::Connected);
            let hash = h.client.identity().meta_hash();
            h.receive(Message::LoginResponse(LoginResponse {
                status: StatusCode::Ok,
                pilot_id: PilotId::new("me"),
                api_version: server,
                pilot_meta_hash: hash,
            }));
            assert!(h.client.is_authenticated());
            assert!(h
                .events()
                .iter()
                .any(|e| matches!(e, ClientEvent::VersionMismatch(check) if check.is_mismatch())));
        }
    }

    #[test]
    fn test_matching_version_emits_no_warning() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        assert!(h.client.is_authenticated());
        assert!(!h
            .events()
            .iter()
            .any(|e| matches!(e, ClientEvent::VersionMismatch(_))));
    }

    #[test]
    fn test_stale_profile_is_pushed() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();
        h.receive(Message::LoginResponse(LoginResponse {
            status: StatusCode::Ok,
            pilot_id: PilotId::new("me"),
            api_version: API_VERSION,
            pilot_meta_hash: "outdated".to_string(),
        }));
        assert!(matches!(
            h.sent().as_slice(),
            [Message::UpdateProfileRequest(_)]
        ));
    }

    #[test]
    fn test_login_rejoins_previous_group() {
        let mut h = Harness::new(registered(), GroupMembership::restore(GroupId::new("g1")));
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();
        h.login_ok();
        match h.sent().as_slice() {
            [Message::JoinGroupRequest(request)] => assert_eq!(request.target_id, "g1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invite_takes_priority_over_previous_group() {
        let mut h = Harness::new(registered(), GroupMembership::restore(GroupId::new("g1")));
        h.client.set_invite("pilot-7");
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();
        h.login_ok();
        match h.sent().as_slice() {
            [Message::JoinGroupRequest(request)] => assert_eq!(request.target_id, "pilot-7"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_join_requests_group_info_and_chat_log() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        h.sent();

        assert!(h.client.join_group("g2").is_some());
        h.sent();
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::Ok,
            group_id: GroupId::new("g2"),
        }));

        let sent = h.sent();
        assert_eq!(count_group_info(&sent), 1);
        let window = sent.iter().find_map(|m| match m {
            Message::ChatLogRequest(request) => Some(request.time_window),
            _ => None,
        });
        let window = window.expect("chat log requested");
        assert_eq!(window.end, START_MS);
        assert_eq!(window.start, START_MS - 30 * 60 * 1000);
        assert!(h
            .events()
            .contains(&ClientEvent::GroupChanged(GroupId::new("g2"))));
    }

    #[test]
    fn test_join_same_group_is_idempotent() {
        let mut h = in_group("g1", &["p2"], &["a", "b"]);
        let plan_before = h.client.plan().clone();

        h.client.join_group("g1");
        h.sent();
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::NoOp,
            group_id: GroupId::new("g1"),
        }));

        assert!(h.sent().is_empty());
        assert!(h.events().is_empty());
        assert_eq!(h.client.plan(), &plan_before);
        assert!(h.client.roster().contains(&PilotId::new("p2")));
        assert_eq!(h.client.membership().group(), &GroupId::new("g1"));
    }

    /// Drop the connection and come back, stopping once the rejoin is sent.
    fn reconnect(h: &mut Harness) {
        h.client.handle_transport(TransportEvent::Disconnected);
        h.client.handle_transport(TransportEvent::Connected);
        assert!(matches!(h.sent().as_slice(), [Message::LoginRequest(_)]));
        h.login_ok();
        match h.sent().as_slice() {
            [Message::JoinGroupRequest(request)] => assert_eq!(request.target_id, "g1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reconnect_rejoin_with_no_op_resyncs() {
        let mut h = in_group("g1", &["p2", "p3"], &["a", "b"]);
        reconnect(&mut h);
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::NoOp,
            group_id: GroupId::new("g1"),
        }));

        let sent = h.sent();
        assert_eq!(count_group_info(&sent), 1);
        assert!(sent
            .iter()
            .any(|m| matches!(m, Message::ChatLogRequest(_))));

        h.receive(group_info("g1", &["p2"], &["a"]));
        assert!(!h.client.roster().contains(&PilotId::new("p3")));
        assert_eq!(ids(&h.client), vec!["a"]);
    }

    #[test]
    fn test_reconnect_bootstrap_restores_session() {
        let mut h = in_group("g1", &["p2"], &["a"]);
        reconnect(&mut h);
        assert_eq!(
            h.events(),
            vec![
                ClientEvent::SessionStateChanged(SessionState::Disconnected),
                ClientEvent::SessionStateChanged(SessionState::AwaitingAuth),
                ClientEvent::SessionStateChanged(SessionState::Authenticated),
            ]
        );

        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::Ok,
            group_id: GroupId::new("g1"),
        }));
        assert_eq!(count_group_info(&h.sent()), 1);
        assert!(h.events().is_empty());

        h.receive(group_info("g1", &["p2", "p4"], &["a", "b"]));
        assert!(h.client.roster().contains(&PilotId::new("p4")));
        assert_eq!(ids(&h.client), vec!["a", "b"]);
        assert!(h.client.send_chat("back online"));
    }

    #[test]
    fn test_user_join_after_rejoin_stays_quiet() {
        let mut h = in_group("g1", &[], &["a"]);
        reconnect(&mut h);
        h.client.join_group("g1");
        h.sent();
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::NoOp,
            group_id: GroupId::new("g1"),
        }));
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_join_invalid_target_leaves_group_unset() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        h.client.join_group("nowhere");
        h.receive(Message::JoinGroupResponse(JoinGroupResponse {
            status: StatusCode::InvalidId,
            group_id: GroupId::NULL,
        }));
        assert!(!h.client.membership().is_grouped());
        assert!(h.events().contains(&ClientEvent::RequestFailed {
            request: RequestKind::JoinGroup,
            status: StatusCode::InvalidId
        }));
    }

    #[test]
    fn test_leave_while_ungrouped() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        h.events();

        assert!(h.client.leave_group(false).is_some());
        h.receive(Message::LeaveGroupResponse(LeaveGroupResponse {
            status: StatusCode::NoOp,
            group_id: GroupId::NULL,
        }));
        assert_eq!(h.client.membership().group(), &GroupId::NULL);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_leave_clears_group_state() {
        let mut h = in_group("g1", &["p2"], &["a"]);
        h.client.leave_group(false);
        h.receive(Message::LeaveGroupResponse(LeaveGroupResponse {
            status: StatusCode::Ok,
            group_id: GroupId::NULL,
        }));
        assert!(h.client.roster().is_empty());
        assert!(h.client.plan().is_empty());
        assert!(h.events().contains(&ClientEvent::GroupChanged(GroupId::NULL)));
    }

    #[test]
    fn test_group_info_excludes_self() {
        let h = in_group("g1", &["p2", "me", "p3"], &[]);
        assert_eq!(
            h.client.roster().ids(),
            vec![PilotId::new("p2"), PilotId::new("p3")]
        );
        assert_eq!(h.client.map_layers(), ["thermals".to_string()]);
    }

    #[test]
    fn test_group_info_for_other_group_is_ignored() {
        let mut h = in_group("g1", &["p2"], &["a"]);
        h.receive(group_info("g9", &["x"], &["z"]));
        assert!(h.client.roster().contains(&PilotId::new("p2")));
        assert_eq!(ids(&h.client), vec!["a"]);
    }

    #[test]
    fn test_unknown_pilot_telemetry_requests_group_info_once() {
        let mut h = in_group("g1", &["p2"], &[]);
        h.receive(telemetry("ghost"));
        h.receive(telemetry("ghost"));
        h.receive(telemetry("other-ghost"));
        assert_eq!(count_group_info(&h.sent()), 1);
    }

    #[test]
    fn test_unknown_pilot_selection_requests_group_info() {
        let mut h = in_group("g1", &["p2"], &["a"]);
        let mut selections = PilotWaypointSelections::default();
        selections.0.insert(PilotId::new("p2"), WaypointId::new("a"));
        selections
            .0
            .insert(PilotId::new("ghost"), WaypointId::new("a"));
        h.receive(Message::PilotWaypointSelections(selections));

        assert_eq!(count_group_info(&h.sent()), 1);
        assert_eq!(
            h.client
                .roster()
                .get(&PilotId::new("p2"))
                .unwrap()
                .selected_waypoint,
            Some(WaypointId::new("a"))
        );
    }

    #[test]
    fn test_known_pilot_telemetry_is_recorded() {
        let mut h = in_group("g1", &["p2"], &[]);
        h.receive(telemetry("p2"));
        assert!(h.sent().is_empty());
        assert!(h
            .client
            .roster()
            .get(&PilotId::new("p2"))
            .unwrap()
            .telemetry
            .is_some());
        assert_eq!(
            h.events(),
            vec![ClientEvent::TelemetryUpdated(PilotId::new("p2"))]
        );
    }

    #[test]
    fn test_sort_with_correct_hash_commits() {
        let mut h = in_group("g1", &[], &["a", "b", "c"]);
        h.receive(Message::FlightPlanUpdate(WaypointOperation {
            action: PlanAction::Sort,
            index: 0,
            new_index: Some(2),
            data: None,
            expected_hash: PlanHash::of(&[wp("b"), wp("c"), wp("a")]),
            revision: None,
        }));
        assert_eq!(ids(&h.client), vec!["b", "c", "a"]);
        assert_eq!(count_group_info(&h.sent()), 0);
        assert_eq!(
            h.events(),
            vec![ClientEvent::FlightPlanChanged(PlanChange::Committed)]
        );
    }

    #[test]
    fn test_sort_with_wrong_hash_rolls_back_and_resyncs() {
        let mut h = in_group("g1", &[], &["a", "b", "c"]);
        h.receive(Message::FlightPlanUpdate(WaypointOperation {
            action: PlanAction::Sort,
            index: 0,
            new_index: Some(2),
            data: None,
            expected_hash: PlanHash::from_hex("0000"),
            revision: None,
        }));
        assert_eq!(ids(&h.client), vec!["a", "b", "c"]);
        let sent = h.sent();
        assert_eq!(count_group_info(&sent), 1);
        assert!(matches!(
            h.events().as_slice(),
            [ClientEvent::FlightPlanChanged(PlanChange::RolledBack(
                Divergence::HashMismatch { .. }
            ))]
        ));

        h.receive(group_info("g1", &[], &["c", "a", "b"]));
        assert_eq!(ids(&h.client), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_local_edit_waits_for_echo() {
        let mut h = in_group("g1", &[], &["a", "b", "c"]);
        assert!(h.client.edit_plan(PlanEdit::Delete { index: 1 }).unwrap());
        assert_eq!(ids(&h.client), vec!["a", "b", "c"]);

        let echo = match h.sent().pop() {
            Some(Message::FlightPlanUpdate(op)) => op,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(echo.revision, Some(0));
        h.receive(Message::FlightPlanUpdate(echo));
        assert_eq!(ids(&h.client), vec!["a", "c"]);
        assert_eq!(h.client.plan().revision(), 1);
    }

    #[test]
    fn test_edit_out_of_range_is_rejected() {
        let mut h = in_group("g1", &[], &["a"]);
        let err = h.client.edit_plan(PlanEdit::Delete { index: 4 }).unwrap_err();
        assert_eq!(err, PlanError::IndexOutOfRange { index: 4, len: 1 });
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_plan_sync_replaces_plan() {
        let mut h = in_group("g1", &[], &["a", "b"]);
        h.receive(Message::FlightPlanSync(crate::protocol::FlightPlanSync {
            flight_plan: PlanSnapshot {
                waypoints: vec![wp("x")],
                revision: Some(7),
            },
        }));
        assert_eq!(ids(&h.client), vec!["x"]);
        assert_eq!(h.client.plan().revision(), 7);
        assert_eq!(
            h.events(),
            vec![ClientEvent::FlightPlanChanged(PlanChange::Replaced)]
        );
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.login_ok();
        h.sent();
        h.events();

        let first = h.client.join_group("g1").unwrap();
        let second = h.client.join_group("g2").unwrap();
        assert_ne!(first, second);

        h.receive_with_id(
            first,
            Message::JoinGroupResponse(JoinGroupResponse {
                status: StatusCode::Ok,
                group_id: GroupId::new("g1"),
            }),
        );
        assert!(!h.client.membership().is_grouped());

        h.receive_with_id(
            second,
            Message::JoinGroupResponse(JoinGroupResponse {
                status: StatusCode::Ok,
                group_id: GroupId::new("g2"),
            }),
        );
        assert_eq!(h.client.membership().group(), &GroupId::new("g2"));
    }

    #[test]
    fn test_unanswered_request_times_out() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        h.client.handle_transport(TransportEvent::Connected);
        h.events();

        h.advance(Duration::from_secs(5));
        h.client.poll_timeouts();
        assert!(h.events().is_empty());

        h.advance(Duration::from_secs(10));
        h.client.poll_timeouts();
        assert_eq!(
            h.events(),
            vec![ClientEvent::RequestTimedOut(RequestKind::Login)]
        );
    }

    #[test]
    fn test_disconnect_drops_session() {
        let mut h = in_group("g1", &["p2"], &["a"]);
        h.client.handle_transport(TransportEvent::Disconnected);
        assert_eq!(h.client.session_state(), SessionState::Disconnected);
        assert_eq!(
            h.events(),
            vec![ClientEvent::SessionStateChanged(SessionState::Disconnected)]
        );
        assert!(!h.client.send_chat("anyone?"));
        assert_eq!(h.client.membership().group(), &GroupId::new("g1"));

        h.receive(telemetry("p2"));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_credentials_rejected_mid_session_logs_in_again() {
        let mut h = in_group("g1", &[], &[]);
        h.client.request_group_info();
        h.sent();
        h.receive(Message::GroupInfoResponse(GroupInfoResponse {
            status: StatusCode::InvalidSecretId,
            ..GroupInfoResponse::default()
        }));
        assert!(matches!(h.sent().as_slice(), [Message::LoginRequest(_)]));
        assert_eq!(h.client.session_state(), SessionState::AwaitingAuth);
    }

    #[test]
    fn test_other_failure_keeps_session_authenticated() {
        let mut h = in_group("g1", &[], &[]);
        h.client.request_group_info();
        h.sent();
        h.receive(Message::GroupInfoResponse(GroupInfoResponse {
            status: StatusCode::Error,
            ..GroupInfoResponse::default()
        }));
        assert!(h.sent().is_empty());
        assert_eq!(h.client.session_state(), SessionState::Authenticated);
        assert!(h.events().contains(&ClientEvent::RequestFailed {
            request: RequestKind::GroupInfo,
            status: StatusCode::Error,
        }));
    }

    #[test]
    fn test_chat_echo_is_not_duplicated() {
        let mut h = in_group("g1", &[], &[]);
        assert!(h.client.send_chat("hello"));
        let echo = match h.sent().pop() {
            Some(Message::TextMessage(message)) => message,
            other => panic!("unexpected {other:?}"),
        };
        h.events();

        h.receive(Message::TextMessage(echo));
        assert_eq!(h.client.chat().len(), 1);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_chat_log_merges_in_order() {
        let mut h = in_group("g1", &[], &[]);
        let message = |pilot: &str, timestamp: i64| TextMessage {
            timestamp,
            index: 0,
            group_id: GroupId::new("g1"),
            pilot_id: PilotId::new(pilot),
            text: format!("{pilot}@{timestamp}"),
        };
        h.receive(Message::TextMessage(message("p2", 30)));
        h.receive(Message::ChatLogResponse(ChatLogResponse {
            status: StatusCode::Ok,
            group_id: GroupId::new("g1"),
            msgs: vec![message("p3", 10), message("p2", 30), message("p2", 20)],
        }));
        let timestamps: Vec<i64> = h.client.chat().messages().iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }

    #[test]
    fn test_self_is_filtered_from_roster_events() {
        let mut h = in_group("g1", &["p2"], &[]);
        h.receive(Message::PilotJoinedGroup(PilotJoinedGroup { pilot: meta("me") }));
        h.receive(telemetry("me"));
        assert!(!h.client.roster().contains(&PilotId::new("me")));
        assert!(h.sent().is_empty());

        h.receive(Message::PilotJoinedGroup(PilotJoinedGroup { pilot: meta("p3") }));
        assert!(h.client.roster().contains(&PilotId::new("p3")));
    }

    #[test]
    fn test_pilot_moving_to_another_group() {
        let mut h = in_group("g1", &["p2"], &[]);
        h.receive(Message::PilotLeftGroup(PilotLeftGroup {
            pilot_id: PilotId::new("p2"),
            new_group_id: GroupId::new("g5"),
        }));
        assert!(h.client.roster().is_empty());
        assert_eq!(
            h.events(),
            vec![
                ClientEvent::RosterChanged,
                ClientEvent::PilotMovedGroup {
                    pilot: PilotId::new("p2"),
                    group: GroupId::new("g5")
                }
            ]
        );
    }

    #[test]
    fn test_pilot_status_poll() {
        let mut h = in_group("g1", &["p2"], &[]);
        assert!(h.client.request_pilot_status().is_some());
        match h.sent().as_slice() {
            [Message::PilotsStatusRequest(request)] => {
                assert_eq!(request.pilot_ids, vec![PilotId::new("p2")]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let mut online = std::collections::BTreeMap::new();
        online.insert(PilotId::new("p2"), false);
        h.receive(Message::PilotsStatusResponse(PilotsStatusResponse {
            status: StatusCode::Ok,
            pilots_online: online,
        }));
        assert!(!h.client.roster().get(&PilotId::new("p2")).unwrap().online);
    }

    #[test]
    fn test_select_waypoint_is_broadcast() {
        let mut h = in_group("g1", &[], &["a", "b"]);
        h.client.select_waypoint(Some(1)).unwrap();
        match h.sent().as_slice() {
            [Message::PilotWaypointSelections(selections)] => {
                assert_eq!(
                    selections.0.get(&PilotId::new("me")),
                    Some(&WaypointId::new("b"))
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.client.select_waypoint(Some(7)).is_err());
    }

    #[test]
    fn test_join_before_login_becomes_invite() {
        let mut h = Harness::new(registered(), GroupMembership::new());
        assert!(h.client.join_group("g4").is_none());
        h.client.handle_transport(TransportEvent::Connected);
        h.sent();
        h.login_ok();
        match h.sent().as_slice() {
            [Message::JoinGroupRequest(request)] => assert_eq!(request.target_id, "g4"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_update_profile_when_logged_in() {
        let mut h = in_group("g1", &[], &[]);
        assert!(h
            .client
            .update_profile("Ada", Some("glider.png".to_string()))
            .is_some());
        assert!(matches!(
            h.sent().as_slice(),
            [Message::UpdateProfileRequest(_)]
        ));
        assert_eq!(h.client.identity().name, "Ada");
    }
}
