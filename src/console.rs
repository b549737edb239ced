//! Console host implementations
//!
//! Stand-ins for the real transport, cloud store and mail service so the
//! device can be driven from a terminal:
//! - inbound messages are stdin lines `handle: text`, replies go to stdout
//! - uploads are copied under `<data>/public` and linked with `file://` URLs
//! - configuration emails are spooled as JSON under `<data>/mail/outbox`,
//!   PINs are picked up from `<data>/mail/pins.json`

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use warden_shared::now_ms;

use crate::communicator::Communicator;
use crate::services::{ArtifactStore, MailChannel, Messenger, PinPair, PinTarget};

/// Prints outbound messages to stdout
#[derive(Debug, Default)]
pub struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send(&self, to: &str, text: &str) -> Result<()> {
        println!("-> {to}: {text}");
        Ok(())
    }

    async fn handle_exists(&self, handle: &str) -> Result<bool> {
        Ok(!handle.is_empty() && !handle.contains(char::is_whitespace))
    }

    async fn authorize_with_pin(&self, pin: &str) -> Result<()> {
        anyhow::ensure!(!pin.trim().is_empty(), "empty messaging PIN");
        Ok(())
    }
}

/// Split a console line into (handle, text)
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (handle, text) = line.split_once(':')?;
    let handle = handle.trim();
    if handle.is_empty() {
        return None;
    }
    Some((handle, text.trim()))
}

/// Feed stdin lines to the communicator until EOF
pub async fn read_lines(comm: Arc<Communicator>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some((handle, text)) => comm.handle_message(text, handle).await,
            None if line.trim().is_empty() => {}
            None => warn!("Expected `handle: text`, got {:?}", line),
        }
    }

    info!("Console input closed");
    Ok(())
}

/// Copies artifacts into a public directory
#[derive(Debug, Clone)]
pub struct LocalArtifacts {
    public_dir: PathBuf,
}

impl LocalArtifacts {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
        }
    }

    async fn copy_into(&self, dir: &Path, file: &Path) -> Result<()> {
        let name = file
            .file_name()
            .with_context(|| format!("{} has no file name", file.display()))?;
        tokio::fs::copy(file, dir.join(name))
            .await
            .with_context(|| format!("copy {}", file.display()))?;
        Ok(())
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[async_trait]
impl ArtifactStore for LocalArtifacts {
    async fn upload_images(&self, files: &[PathBuf], album: &str) -> Result<String> {
        let slug = album.to_ascii_lowercase().replace(' ', "-");
        let dir = self.public_dir.join(format!("{slug}-{}", now_ms()));
        tokio::fs::create_dir_all(&dir).await?;

        for file in files {
            self.copy_into(&dir, file).await?;
        }
        Ok(file_url(&dir))
    }

    async fn upload_video(&self, file: &Path) -> Result<String> {
        let dir = self.public_dir.join(format!("video-{}", now_ms()));
        tokio::fs::create_dir_all(&dir).await?;
        self.copy_into(&dir, file).await?;

        let name = file.file_name().unwrap_or_default();
        Ok(file_url(&dir.join(name)))
    }

    async fn shorten_url(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }

    async fn authorize_with_pin(&self, pin: &str) -> Result<()> {
        anyhow::ensure!(!pin.trim().is_empty(), "empty storage PIN");
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct SpooledEmail<'a> {
    to: &'a str,
    target: PinTarget,
    sent_ms: u64,
}

/// Spool-directory mail channel
#[derive(Debug, Clone)]
pub struct SpoolMail {
    dir: PathBuf,
}

impl SpoolMail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn pins_path(&self) -> PathBuf {
        self.dir.join("pins.json")
    }
}

#[async_trait]
impl MailChannel for SpoolMail {
    async fn send_config_email(&self, to: &str, target: PinTarget) -> Result<()> {
        let outbox = self.dir.join("outbox");
        tokio::fs::create_dir_all(&outbox).await?;

        let email = SpooledEmail {
            to,
            target,
            sent_ms: now_ms(),
        };
        let path = outbox.join(format!("{}-config.json", email.sent_ms));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&email)?).await?;

        info!(
            "[PIN] Configuration email spooled to {}, reply with {}",
            path.display(),
            self.pins_path().display()
        );
        Ok(())
    }

    async fn poll_for_pins(&self) -> Result<Option<PinPair>> {
        let path = self.pins_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Consume the reply so it is used once
        tokio::fs::remove_file(&path).await?;
        let pins = serde_json::from_slice(&bytes).context("pins.json")?;
        Ok(Some(pins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("alice: go secure"), Some(("alice", "go secure")));
        assert_eq!(parse_line(" bob :what is the time: now"), Some(("bob", "what is the time: now")));
        assert_eq!(parse_line("no separator"), None);
        assert_eq!(parse_line(": text"), None);
    }

    #[tokio::test]
    async fn test_spool_mail_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mail = SpoolMail::new(dir.path());

        mail.send_config_email("alice@example.com", PinTarget::Both)
            .await
            .unwrap();
        let outbox: Vec<_> = std::fs::read_dir(dir.path().join("outbox")).unwrap().collect();
        assert_eq!(outbox.len(), 1);

        assert_eq!(mail.poll_for_pins().await.unwrap(), None);

        std::fs::write(
            dir.path().join("pins.json"),
            r#"{"storage-pin": "1234", "messaging-pin": "5678"}"#,
        )
        .unwrap();
        let pins = mail.poll_for_pins().await.unwrap().unwrap();
        assert_eq!(pins.storage_pin, "1234");
        assert_eq!(pins.messaging_pin, "5678");
        assert_eq!(mail.poll_for_pins().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_artifacts_copy_files() {
        let src = tempfile::tempdir().unwrap();
        let public = tempfile::tempdir().unwrap();
        let image = src.path().join("left.jpg");
        std::fs::write(&image, b"jpg").unwrap();

        let store = LocalArtifacts::new(public.path());
        let url = store.upload_images(&[image], "Take Three").await.unwrap();

        let dir = PathBuf::from(url.trim_start_matches("file://"));
        assert!(dir.starts_with(public.path()));
        assert!(dir.join("left.jpg").exists());
    }
}
