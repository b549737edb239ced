//! Warden device engine
//!
//! Receives free-text commands from a remote master over a messaging
//! transport, runs device actions as jobs on a two-tier dispatcher and
//! handles conversational handoff of master authority.

pub mod communicator;
pub mod config;
pub mod console;
pub mod cues;
pub mod job;
pub mod ledger;
pub mod provisioning;
pub mod records;
pub mod scripts;
pub mod services;

#[cfg(test)]
mod testing;

pub use communicator::{Communicator, Services};
pub use config::{ConfigError, DeviceConfig};
pub use ledger::Ledger;
pub use records::RecordStore;
