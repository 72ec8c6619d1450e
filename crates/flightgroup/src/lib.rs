//! `flightgroup` - a group flight client
//!
//! Pilots in a group share live telemetry, chat and one flight plan through a
//! relay server. This library holds the client-side replica of that state
//! ([`Client`]), the wire protocol, the async [`Runtime`] that drives a client
//! over a [`transport::Transport`], and local persistence.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod identity;
pub mod logging;
pub mod pending;
pub mod plan;
pub mod protocol;
pub mod roster;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod transport;

pub use client::{Client, ClientEvent, ClientOptions, PlanChange};
pub use config::Config;
pub use error::{Error, Result};
pub use identity::Identity;
pub use logging::init_logging;
pub use runtime::{restore_client, Command, Runtime, RuntimeHandle};
pub use storage::Storage;
