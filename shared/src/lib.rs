//! Warden Shared Types
//!
//! This crate provides the I/O-free building blocks of the Warden device:
//! the command lexicon, the job taxonomy, principal records and the master
//! handoff state machine.

pub mod command;
pub mod handoff;
pub mod job;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use command::{CommandKind, Lexicon, LexiconError};
pub use job::{JobName, JobType};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tunable defaults for the orchestration engine
pub mod defaults {
    /// Workers in the immediate job pool
    pub const IMMEDIATE_POOL_SIZE: usize = 4;

    /// Pause after an intruder capture before motion polling resumes
    pub const SECURE_COOLDOWN_SECS: u64 = 30;

    /// Delay before re-polling the motion sensor after a failed poll
    pub const SECURE_RETRY_MS: u64 = 1000;

    /// Interval between one-time PIN polls during provisioning
    pub const PIN_POLL_INTERVAL_SECS: u64 = 10;

    /// Marker printed by the motion script when it trips
    pub const MOTION_MARKER: &str = "MOTION_DETECTED";
}

/// A remote principal: messaging handle plus cloud storage identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Principal {
    pub messaging_handle: String,
    pub storage_identity: String,
}

impl Principal {
    pub fn new(messaging_handle: impl Into<String>, storage_identity: impl Into<String>) -> Self {
        Self {
            messaging_handle: messaging_handle.into(),
            storage_identity: storage_identity.into(),
        }
    }

    /// Case-insensitive messaging handle comparison
    pub fn has_handle(&self, handle: &str) -> bool {
        self.messaging_handle.eq_ignore_ascii_case(handle.trim())
    }

    /// Case-insensitive storage identity comparison
    pub fn has_storage_identity(&self, identity: &str) -> bool {
        self.storage_identity.eq_ignore_ascii_case(identity.trim())
    }
}

/// Role a principal holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterRole {
    Primary,
    Secondary,
}

impl fmt::Display for MasterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterRole::Primary => write!(f, "primary"),
            MasterRole::Secondary => write!(f, "secondary"),
        }
    }
}

/// Primary configuration record, fixed at setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrimaryConfig {
    /// The primary master
    pub master: Principal,
    /// The device's own identities
    pub device: Principal,
}

/// Secondary master record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecondaryConfig {
    pub active: bool,
    pub master: Principal,
}

impl SecondaryConfig {
    pub fn active(master: Principal) -> Self {
        Self {
            active: true,
            master,
        }
    }
}

/// Secure-mode resume marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecureLock {
    pub since_ms: u64,
}

impl SecureLock {
    pub fn now() -> Self {
        Self { since_ms: now_ms() }
    }
}
