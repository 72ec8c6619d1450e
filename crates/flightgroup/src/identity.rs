//! The local pilot's credentials and profile.
//!
//! An [`Identity`] is a plain record. The local pilot is never a roster
//! entry; the client filters its own id out of roster traffic instead.

use serde::{Deserialize, Serialize};

use crate::protocol::{PilotId, PilotMeta};

/// Durable identity of the local pilot.
///
/// `secret_id` is issued by the server once, on registration, and is only
/// replaced when the server rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Public pilot id, shared with other pilots.
    pub public_id: PilotId,
    /// Secret credential; empty until registered.
    pub secret_id: String,
    /// Display name.
    pub name: String,
    /// Avatar reference.
    pub avatar: Option<String>,
}

impl Identity {
    /// A fresh, unregistered identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether we hold server-issued credentials.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.secret_id.is_empty()
    }

    /// Forget the credentials so the next connection registers again.
    pub fn clear_credentials(&mut self) {
        self.secret_id.clear();
        self.public_id = PilotId::NULL;
    }

    /// Profile as sent to the server.
    #[must_use]
    pub fn meta(&self) -> PilotMeta {
        PilotMeta {
            id: self.public_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Hash of the profile, compared against the server's copy on login.
    #[must_use]
    pub fn meta_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.name.len() as u64).to_le_bytes());
        hasher.update(self.name.as_bytes());
        let avatar = self.avatar.as_deref().unwrap_or_default();
        hasher.update(&(avatar.len() as u64).to_le_bytes());
        hasher.update(avatar.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Link other pilots can follow to join us.
    #[must_use]
    pub fn invite_link(&self, base: &str) -> String {
        format!("{}?invite={}", base.trim_end_matches('?'), self.public_id.as_str())
    }
}
