//! Response status codes.

use serde::{Deserialize, Serialize};

/// Status carried by every response; `0` means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum StatusCode {
    /// The request succeeded.
    #[default]
    Ok,
    /// Unspecified server-side failure.
    Error,
    /// The referenced pilot or group does not exist.
    InvalidId,
    /// The secret id is not known to the server.
    InvalidSecretId,
    /// The pilot may not access the requested group.
    DeniedGroupAccess,
    /// The request was missing a required field.
    MissingData,
    /// Nothing to do: the request repeats the current state.
    NoOp,
}

impl StatusCode {
    /// Whether the status is `Ok`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Whether the server rejected our credentials.
    #[must_use]
    pub fn is_auth_failure(self) -> bool {
        matches!(self, Self::InvalidId | Self::InvalidSecretId)
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            2 => Self::InvalidId,
            3 => Self::InvalidSecretId,
            4 => Self::DeniedGroupAccess,
            5 => Self::MissingData,
            6 => Self::NoOp,
            _ => Self::Error,
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::Ok => 0,
            StatusCode::Error => 1,
            StatusCode::InvalidId => 2,
            StatusCode::InvalidSecretId => 3,
            StatusCode::DeniedGroupAccess => 4,
            StatusCode::MissingData => 5,
            StatusCode::NoOp => 6,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::InvalidId => "invalid_id",
            Self::InvalidSecretId => "invalid_secret_id",
            Self::DeniedGroupAccess => "denied_group_access",
            Self::MissingData => "missing_data",
            Self::NoOp => "no_op",
        };
        f.write_str(name)
    }
}
