//! Seams to external collaborators
//!
//! The messaging transport, the artifact store and the one-time PIN mail
//! channel live outside the engine and are reached through these traits.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Direct-message transport
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a message to a handle
    async fn send(&self, to: &str, text: &str) -> Result<()>;

    /// Whether a handle exists on the transport
    async fn handle_exists(&self, handle: &str) -> Result<bool>;

    /// Authorize the device account with a one-time PIN
    async fn authorize_with_pin(&self, pin: &str) -> Result<()>;
}

/// Cloud storage for captured artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload an image set as an album, returning a shareable link
    async fn upload_images(&self, files: &[PathBuf], album: &str) -> Result<String>;

    /// Upload a video, returning a shareable link
    async fn upload_video(&self, file: &Path) -> Result<String>;

    async fn shorten_url(&self, url: &str) -> Result<String>;

    /// Authorize the device account with a one-time PIN
    async fn authorize_with_pin(&self, pin: &str) -> Result<()>;
}

/// Which side of the device an authorization targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinTarget {
    Storage,
    Messaging,
    Both,
}

impl fmt::Display for PinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinTarget::Storage => write!(f, "storage"),
            PinTarget::Messaging => write!(f, "messaging"),
            PinTarget::Both => write!(f, "storage and messaging"),
        }
    }
}

/// PINs returned by the primary after a configuration email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PinPair {
    pub storage_pin: String,
    pub messaging_pin: String,
}

/// Mail channel used during first-boot provisioning
#[async_trait]
pub trait MailChannel: Send + Sync {
    /// Send the configuration email asking for PINs for `target`
    async fn send_config_email(&self, to: &str, target: PinTarget) -> Result<()>;

    /// Check whether the PINs have arrived
    async fn poll_for_pins(&self) -> Result<Option<PinPair>>;
}
