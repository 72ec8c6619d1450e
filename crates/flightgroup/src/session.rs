//! Connection and authentication state.
//!
//! A [`Session`] exists only while the transport is connected. It is created
//! on connect, carries the register/login state machine and the requests in
//! flight, and is dropped on disconnect.
//!
//! ```text
//! Disconnected -> Connected -> AwaitingAuth -> Authenticated
//!                                   ^               |
//!                                   +--- rejected --+
//! ```

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::identity::Identity;
use crate::pending::PendingRequests;
use crate::protocol::{
    LoginRequest, LoginResponse, Message, PilotMeta, RegisterRequest, RegisterResponse,
    StatusCode, UpdateProfileRequest, API_VERSION,
};

/// Where the connection stands.
///
/// `Authenticated` falls back to `AwaitingAuth` only when the server rejects
/// our credentials; other error responses leave the session logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport connection.
    #[default]
    Disconnected,
    /// Transport up, nothing sent yet.
    Connected,
    /// Register or login sent, waiting for the server.
    AwaitingAuth,
    /// Logged in; group traffic may flow.
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// Outcome of comparing the server's protocol version with ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Same version.
    Match,
    /// The server is newer than this client.
    ClientOutOfDate {
        /// Server version.
        server: u32,
        /// Our version.
        client: u32,
    },
    /// This client is newer than the server.
    ServerOutOfDate {
        /// Server version.
        server: u32,
        /// Our version.
        client: u32,
    },
}

impl VersionCheck {
    /// Compare a server version with a local one.
    #[must_use]
    pub fn compare(server: u32, client: u32) -> Self {
        match server.cmp(&client) {
            std::cmp::Ordering::Equal => Self::Match,
            std::cmp::Ordering::Greater => Self::ClientOutOfDate { server, client },
            std::cmp::Ordering::Less => Self::ServerOutOfDate { server, client },
        }
    }

    /// Whether a warning should be shown.
    #[must_use]
    pub fn is_mismatch(self) -> bool {
        self != Self::Match
    }
}

/// What a `RegisterResponse` means for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// New credentials were stored in the identity; log in next.
    Registered,
    /// Registration was refused. Not retried automatically.
    Failed(StatusCode),
}

/// What a `LoginResponse` means for us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Logged in.
    LoggedIn {
        /// Protocol version comparison (never blocks login).
        version: VersionCheck,
        /// The server's copy of our profile differs from ours.
        profile_stale: bool,
    },
    /// The server does not know our credentials; register again.
    Reregister,
    /// Login failed for another reason. Logged only.
    Failed(StatusCode),
}

/// Per-connection context.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    api_version_seen: Option<u32>,
    pending: PendingRequests,
    chat_index: u32,
    rejoining: bool,
}

impl Session {
    /// Context for a freshly connected transport.
    #[must_use]
    pub fn connect(request_timeout: Duration) -> Self {
        info!("Connected to relay");
        Self {
            state: SessionState::Connected,
            api_version_seen: None,
            pending: PendingRequests::new(request_timeout),
            chat_index: 0,
            rejoining: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether login has completed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Protocol version reported by the server at login.
    #[must_use]
    pub fn api_version_seen(&self) -> Option<u32> {
        self.api_version_seen
    }

    /// Requests in flight on this connection.
    pub fn pending(&mut self) -> &mut PendingRequests {
        &mut self.pending
    }

    /// Next sequence number for an outbound chat message.
    pub fn next_chat_index(&mut self) -> u32 {
        let index = self.chat_index;
        self.chat_index = self.chat_index.wrapping_add(1);
        index
    }

    /// Record that the outstanding join was sent automatically after login.
    pub fn mark_rejoin(&mut self) {
        self.rejoining = true;
    }

    /// Whether the outstanding join was the post-login rejoin. Clears the
    /// mark.
    pub fn take_rejoin(&mut self) -> bool {
        std::mem::take(&mut self.rejoining)
    }

    /// First auth message after connecting: login if we hold credentials,
    /// register otherwise.
    pub fn bootstrap(&mut self, identity: &Identity) -> Message {
        if identity.is_registered() {
            self.login(identity)
        } else {
            self.register(identity)
        }
    }

    /// Build a `RegisterRequest` and wait for its answer.
    pub fn register(&mut self, identity: &Identity) -> Message {
        debug!(name = %identity.name, "Registering");
        self.state = SessionState::AwaitingAuth;
        Message::RegisterRequest(RegisterRequest {
            pilot: PilotMeta {
                id: identity.public_id.clone(),
                name: identity.name.clone(),
                avatar: None,
            },
        })
    }

    /// Build a `LoginRequest` and wait for its answer.
    pub fn login(&mut self, identity: &Identity) -> Message {
        debug!(pilot = %identity.public_id, "Logging in");
        self.state = SessionState::AwaitingAuth;
        Message::LoginRequest(LoginRequest {
            secret_id: identity.secret_id.clone(),
            pilot_id: identity.public_id.clone(),
        })
    }

    /// Handle a `RegisterResponse`, storing fresh credentials on success.
    pub fn on_register_response(
        &mut self,
        identity: &mut Identity,
        response: RegisterResponse,
    ) -> RegisterOutcome {
        if !response.status.is_ok() {
            error!(status = %response.status, "Registration failed");
            self.state = SessionState::AwaitingAuth;
            return RegisterOutcome::Failed(response.status);
        }
        info!(pilot = %response.pilot_id, "Registered");
        identity.secret_id = response.secret_id;
        identity.public_id = response.pilot_id;
        RegisterOutcome::Registered
    }

    /// Handle a `LoginResponse`.
    pub fn on_login_response(
        &mut self,
        identity: &mut Identity,
        response: &LoginResponse,
    ) -> LoginOutcome {
        if !response.status.is_ok() {
            self.state = SessionState::AwaitingAuth;
            if response.status.is_auth_failure() {
                warn!(status = %response.status, "Server rejected credentials, registering again");
                identity.clear_credentials();
                return LoginOutcome::Reregister;
            }
            error!(status = %response.status, "Login failed");
            return LoginOutcome::Failed(response.status);
        }

        self.state = SessionState::Authenticated;
        self.api_version_seen = Some(response.api_version);
        if !response.pilot_id.is_null() {
            identity.public_id = response.pilot_id.clone();
        }

        let version = VersionCheck::compare(response.api_version, API_VERSION);
        match version {
            VersionCheck::ClientOutOfDate { server, client } => {
                warn!(server, client, "Client is out of date");
            }
            VersionCheck::ServerOutOfDate { server, client } => {
                warn!(server, client, "Server is out of date");
            }
            VersionCheck::Match => {}
        }

        let profile_stale = response.pilot_meta_hash != identity.meta_hash();
        info!(pilot = %identity.public_id, "Logged in");
        LoginOutcome::LoggedIn {
            version,
            profile_stale,
        }
    }

    /// The server rejected our secret on a non-auth request: log in again.
    pub fn on_credentials_rejected(&mut self, identity: &Identity) -> Message {
        warn!("Credentials rejected mid-session, logging in again");
        self.login(identity)
    }

    /// Profile push used when the server's copy is out of date.
    #[must_use]
    pub fn profile_update(identity: &Identity) -> Message {
        Message::UpdateProfileRequest(UpdateProfileRequest {
            pilot: identity.meta(),
            secret_id: identity.secret_id.clone(),
        })
    }
}
