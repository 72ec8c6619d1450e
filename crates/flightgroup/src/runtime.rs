//! Async driver: runs a [`Client`] over a [`Transport`].
//!
//! One task owns the client. It waits on the transport, the command channel
//! and a timer, lets the client react, then flushes the outbox and hands
//! the client's events to storage and to whoever listens. Handlers run to
//! completion one at a time, so the client needs no locking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Client, ClientEvent};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::group::GroupMembership;
use crate::identity::Identity;
use crate::plan::PlanEdit;
use crate::protocol::Telemetry;
use crate::storage::Storage;
use crate::transport::{Transport, TransportEvent};

/// Default interval of the housekeeping timer.
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Something the local user wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Join a group or follow an invite.
    JoinGroup(String),
    /// Leave the group.
    LeaveGroup {
        /// Split off into a new group instead of going solo.
        split: bool,
    },
    /// Send a chat message.
    Chat(String),
    /// Share our position.
    Telemetry(Telemetry),
    /// Propose a flight plan edit.
    EditPlan(PlanEdit),
    /// Select the waypoint we fly to.
    SelectWaypoint(Option<usize>),
    /// Change the profile.
    UpdateProfile {
        /// New display name.
        name: String,
        /// New avatar reference.
        avatar: Option<String>,
    },
    /// Ask which pilots are online now.
    PollStatus,
}

/// Cloneable handle to a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
    stop_signal: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the runtime has finished.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Disconnected)
    }

    /// Ask the runtime to stop at its next wake-up.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Event loop around one client and one transport.
#[derive(Debug)]
pub struct Runtime<T> {
    client: Client,
    transport: T,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: RuntimeHandle,
    storage: Option<Storage>,
    events: Option<mpsc::UnboundedSender<ClientEvent>>,
    tick: Duration,
    status_poll: Option<Duration>,
}

impl<T: Transport> Runtime<T> {
    /// A runtime that has not started yet.
    #[must_use]
    pub fn new(client: Client, transport: T) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            client,
            transport,
            commands,
            handle: RuntimeHandle {
                commands: commands_tx,
                stop_signal: Arc::new(AtomicBool::new(false)),
            },
            storage: None,
            events: None,
            tick: DEFAULT_TICK,
            status_poll: None,
        }
    }

    /// Persist identity, group and chat changes.
    #[must_use]
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Forward client events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Poll pilot online status every `interval`.
    #[must_use]
    pub fn with_status_poll(mut self, interval: Option<Duration>) -> Self {
        self.status_poll = interval;
        self
    }

    /// Change the housekeeping interval.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Handle for sending commands and stopping the loop.
    #[must_use]
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Run until stopped or until the transport finishes. Returns the
    /// client with its final state.
    pub async fn run(mut self) -> Client {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_poll = Instant::now();

        info!("Runtime started");
        loop {
            if self.handle.should_stop() {
                info!("Runtime stopping on request");
                break;
            }

            tokio::select! {
                event = self.transport.recv() => match event {
                    Some(event) => self.client.handle_transport(event),
                    None => {
                        info!("Transport finished");
                        self.settle().await;
                        break;
                    }
                },
                Some(command) = self.commands.recv() => {
                    debug!(?command, "Command");
                    self.apply(command);
                }
                _ = ticker.tick() => {
                    self.client.poll_timeouts();
                    if let Some(interval) = self.status_poll {
                        if last_poll.elapsed() >= interval {
                            last_poll = Instant::now();
                            self.client.request_pilot_status();
                        }
                    }
                }
            }

            self.settle().await;
        }
        self.client
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::JoinGroup(target) => {
                self.client.join_group(&target);
            }
            Command::LeaveGroup { split } => {
                self.client.leave_group(split);
            }
            Command::Chat(text) => {
                if !self.client.send_chat(text) {
                    warn!("Chat message not sent");
                }
            }
            Command::Telemetry(telemetry) => {
                self.client.send_telemetry(telemetry);
            }
            Command::EditPlan(edit) => {
                if let Err(e) = self.client.edit_plan(edit) {
                    warn!(error = %e, "Flight plan edit rejected");
                }
            }
            Command::SelectWaypoint(index) => {
                if let Err(e) = self.client.select_waypoint(index) {
                    warn!(error = %e, "Waypoint selection rejected");
                }
            }
            Command::UpdateProfile { name, avatar } => {
                self.client.update_profile(name, avatar);
            }
            Command::PollStatus => {
                self.client.request_pilot_status();
            }
        }
    }

    /// Publish events, then send queued frames. A failed send counts as a
    /// disconnect, whose events are published in turn.
    async fn settle(&mut self) {
        self.publish();
        for frame in self.client.drain_outbox() {
            let event = frame.message.name();
            if let Err(e) = self.transport.send(frame).await {
                if e.is_disconnected() {
                    warn!(event, "Connection gone while sending");
                    self.client.handle_transport(TransportEvent::Disconnected);
                    self.client.drain_outbox();
                    break;
                }
                warn!(event, error = %e, "Failed to send frame");
            }
        }
        self.publish();
    }

    fn publish(&mut self) {
        for event in self.client.drain_events() {
            self.persist(&event);
            if let Some(events) = &self.events {
                if events.send(event).is_err() {
                    debug!("Event listener gone");
                    self.events = None;
                }
            }
        }
    }

    fn persist(&self, event: &ClientEvent) {
        let Some(storage) = &self.storage else {
            return;
        };
        let result = match event {
            ClientEvent::IdentityChanged(identity) => storage.save_identity(identity),
            ClientEvent::GroupChanged(group) => storage.save_group(group),
            ClientEvent::ChatMessage(message) => storage.insert_message(message).map(|_| ()),
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist client state");
        }
    }
}

/// Build a client from what `storage` kept, registering as `fallback_name`
/// when nothing was kept.
///
/// Old chat is pruned first, then the newest history of the saved group is
/// loaded.
///
/// # Errors
///
/// Returns an error if the store cannot be read or pruned.
pub fn restore_client(storage: &Storage, config: &Config, fallback_name: &str) -> Result<Client> {
    if let Some(retention) = config.chat_retention() {
        storage.prune_messages_older_than(retention)?;
    }

    let (identity, membership) = match storage.load()? {
        Some(saved) => {
            debug!(pilot = %saved.identity.public_id, group = %saved.group, "Restored identity");
            (saved.identity, GroupMembership::restore(saved.group))
        }
        None => {
            let name = if config.pilot.name.is_empty() {
                fallback_name
            } else {
                config.pilot.name.as_str()
            };
            let mut identity = Identity::new(name);
            identity.avatar.clone_from(&config.pilot.avatar);
            storage.save_identity(&identity)?;
            (identity, GroupMembership::new())
        }
    };

    let history = if membership.is_grouped() {
        storage.messages_for_group(membership.group(), config.chat.history_limit)?
    } else {
        Vec::new()
    };

    let mut client = Client::new(identity, membership, config.client_options());
    client.seed_chat(history);
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientOptions;
    use crate::protocol::{
        Frame, GroupId, JoinGroupResponse, LoginResponse, Message, PilotId, RegisterResponse,
        StatusCode, TextMessage, API_VERSION,
    };
    use crate::session::SessionState;
    use crate::transport::{ChannelPeer, ChannelTransport};

    async fn expect_frame(peer: &mut ChannelPeer) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), peer.next_frame())
            .await
            .expect("frame in time")
            .expect("transport open")
    }

    async fn wait_for(
        events: &mut mpsc::UnboundedReceiver<ClientEvent>,
        wanted: impl Fn(&ClientEvent) -> bool,
    ) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event in time")
                .expect("runtime alive");
            if wanted(&event) {
                return;
            }
        }
    }

    async fn register_and_login(peer: &mut ChannelPeer, name: &str) {
        peer.connect().unwrap();
        let register = expect_frame(peer).await;
        assert!(matches!(register.message, Message::RegisterRequest(_)));
        peer.reply(
            &register,
            Message::RegisterResponse(RegisterResponse {
                status: StatusCode::Ok,
                secret_id: "secret".to_string(),
                pilot_id: PilotId::new("p1"),
            }),
        )
        .unwrap();

        let login = expect_frame(peer).await;
        assert!(matches!(login.message, Message::LoginRequest(_)));
        peer.reply(
            &login,
            Message::LoginResponse(LoginResponse {
                status: StatusCode::Ok,
                pilot_id: PilotId::new("p1"),
                api_version: API_VERSION,
                pilot_meta_hash: Identity::new(name).meta_hash(),
            }),
        )
        .unwrap();
    }

    fn new_client() -> Client {
        Client::new(
            Identity::new("Ada"),
            GroupMembership::new(),
            ClientOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_runtime_authenticates_and_joins() {
        let (transport, mut peer) = ChannelTransport::pair();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let runtime = Runtime::new(new_client(), transport)
            .with_events(events_tx)
            .with_tick(Duration::from_millis(10));
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());

        register_and_login(&mut peer, "Ada").await;
        wait_for(&mut events, |e| {
            *e == ClientEvent::SessionStateChanged(SessionState::Authenticated)
        })
        .await;

        handle.send(Command::JoinGroup("g1".to_string())).unwrap();
        let join = expect_frame(&mut peer).await;
        assert!(matches!(join.message, Message::JoinGroupRequest(_)));
        peer.reply(
            &join,
            Message::JoinGroupResponse(JoinGroupResponse {
                status: StatusCode::Ok,
                group_id: GroupId::new("g1"),
            }),
        )
        .unwrap();

        let info = expect_frame(&mut peer).await;
        assert!(matches!(info.message, Message::GroupInfoRequest(_)));
        let chat = expect_frame(&mut peer).await;
        assert!(matches!(chat.message, Message::ChatLogRequest(_)));

        handle.stop();
        let client = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.membership().group(), &GroupId::new("g1"));
        assert_eq!(client.identity().secret_id, "secret");
    }

    #[tokio::test]
    async fn test_runtime_ends_with_transport() {
        let (transport, peer) = ChannelTransport::pair();
        let runtime = Runtime::new(new_client(), transport).with_tick(Duration::from_millis(10));
        let task = tokio::spawn(runtime.run());

        peer.connect().unwrap();
        peer.disconnect().unwrap();
        drop(peer);

        let client = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.session_state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_runtime_persists_identity_group_and_chat() {
        let path = std::env::temp_dir().join(format!(
            "flightgroup-runtime-{}.db",
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();

        let (transport, mut peer) = ChannelTransport::pair();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let runtime = Runtime::new(new_client(), transport)
            .with_storage(Storage::open(&path).unwrap())
            .with_events(events_tx)
            .with_tick(Duration::from_millis(10));
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());

        register_and_login(&mut peer, "Ada").await;
        handle.send(Command::JoinGroup("g1".to_string())).unwrap();
        let join = expect_frame(&mut peer).await;
        peer.reply(
            &join,
            Message::JoinGroupResponse(JoinGroupResponse {
                status: StatusCode::Ok,
                group_id: GroupId::new("g1"),
            }),
        )
        .unwrap();
        expect_frame(&mut peer).await;
        expect_frame(&mut peer).await;

        peer.deliver(Frame::event(Message::TextMessage(TextMessage {
            timestamp: 42,
            index: 0,
            group_id: GroupId::new("g1"),
            pilot_id: PilotId::new("p2"),
            text: "thermal at the ridge".to_string(),
        })))
        .unwrap();
        wait_for(&mut events, |e| matches!(e, ClientEvent::ChatMessage(_))).await;

        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let storage = Storage::open(&path).unwrap();
        let saved = storage.load().unwrap().unwrap();
        assert_eq!(saved.identity.public_id, PilotId::new("p1"));
        assert_eq!(saved.identity.secret_id, "secret");
        assert_eq!(saved.group, GroupId::new("g1"));
        let history = storage.messages_for_group(&GroupId::new("g1"), 10).unwrap();
        assert_eq!(history.len(), 1);

        let client = restore_client(&storage, &Config::default(), "ignored").unwrap();
        assert_eq!(client.chat().len(), 1);
        assert_eq!(client.membership().group(), &GroupId::new("g1"));
        drop(storage);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_restore_client_creates_identity() {
        let storage = Storage::open_in_memory().unwrap();
        let mut config = Config::default();
        config.pilot.avatar = Some("glider.png".to_string());

        let client = restore_client(&storage, &config, "ada").unwrap();
        assert_eq!(client.identity().name, "ada");
        assert!(!client.identity().is_registered());
        assert!(!client.membership().is_grouped());

        let saved = storage.load_identity().unwrap().unwrap();
        assert_eq!(saved.avatar.as_deref(), Some("glider.png"));
    }

    #[test]
    fn test_handle_stop_is_shared() {
        let (transport, _peer) = ChannelTransport::pair();
        let runtime = Runtime::new(new_client(), transport);
        let first = runtime.handle();
        let second = first.clone();
        first.stop();
        assert!(second.should_stop());
    }
}
