//! First-boot provisioning
//!
//! Before a primary record exists the device mails its primary a
//! configuration request and waits for one-time PINs for the storage and
//! messaging accounts. A [`PinWatcher`] polls the mail channel on an interval
//! until both sides authorize.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_shared::{PrimaryConfig, Principal};

use crate::config::ConfigError;
use crate::cues::{BlinkPattern, CuePlayer};
use crate::records::{RecordStore, PRIMARY_CONFIG, SETUP};
use crate::services::{ArtifactStore, MailChannel, Messenger, PinPair, PinTarget};

/// Identities entered at setup, before any account is authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SetupRecord {
    pub primary: Principal,
    pub device: Principal,
}

/// Recurring PIN poll with explicit cancellation
pub struct PinWatcher {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl PinWatcher {
    /// Start polling; every PIN pair found is sent on the returned channel
    pub fn start(
        mail: Arc<dyn MailChannel>,
        every: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PinPair>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match mail.poll_for_pins().await {
                    Ok(Some(pins)) => {
                        info!("[PIN] PINs received");
                        if tx.send(pins).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("[PIN] Poll failed: {}", e),
                }
            }
            info!("[PIN] Watcher stopped");
        });

        (
            Self {
                cancel,
                _task: task,
            },
            rx,
        )
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PinWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Collaborators needed to provision
pub struct Provisioner {
    pub messenger: Arc<dyn Messenger>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub mail: Arc<dyn MailChannel>,
    pub cues: CuePlayer,
    pub poll_interval: Duration,
}

impl Provisioner {
    /// Return the primary record, provisioning it from the setup record if
    /// needed
    pub async fn ensure_primary(&self, records: &RecordStore) -> Result<PrimaryConfig> {
        if let Some(primary) = records.read::<PrimaryConfig>(PRIMARY_CONFIG)? {
            return Ok(primary);
        }

        let Some(setup) = records.read::<SetupRecord>(SETUP)? else {
            return Err(ConfigError::Unconfigured(records.dir().to_path_buf()).into());
        };

        let primary = self.provision(setup).await?;
        records.write(PRIMARY_CONFIG, &primary)?;
        info!("[PIN] Provisioning complete");
        Ok(primary)
    }

    /// Run the PIN exchange until both accounts authorize
    pub async fn provision(&self, setup: SetupRecord) -> Result<PrimaryConfig> {
        let _blink = self.cues.blink(BlinkPattern::WAITING);
        let to = setup.primary.storage_identity.clone();

        info!("[PIN] Requesting PINs from {}", to);
        self.mail.send_config_email(&to, PinTarget::Both).await?;

        let (watcher, mut pins) = PinWatcher::start(self.mail.clone(), self.poll_interval);
        let mut storage_ok = false;
        let mut messaging_ok = false;

        while let Some(pair) = pins.recv().await {
            if !storage_ok {
                storage_ok = match self.artifacts.authorize_with_pin(&pair.storage_pin).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("[PIN] Storage authorization failed: {}", e);
                        false
                    }
                };
            }
            if !messaging_ok {
                messaging_ok = match self.messenger.authorize_with_pin(&pair.messaging_pin).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("[PIN] Messaging authorization failed: {}", e);
                        false
                    }
                };
            }

            let retry = match (storage_ok, messaging_ok) {
                (true, true) => break,
                (false, true) => PinTarget::Storage,
                (true, false) => PinTarget::Messaging,
                (false, false) => PinTarget::Both,
            };
            info!("[PIN] Re-sending configuration email for {}", retry);
            if let Err(e) = self.mail.send_config_email(&to, retry).await {
                warn!("[PIN] Could not re-send configuration email: {}", e);
            }
        }
        watcher.stop();

        if !(storage_ok && messaging_ok) {
            bail!("PIN watcher stopped before both accounts were authorized");
        }

        Ok(PrimaryConfig {
            master: setup.primary,
            device: setup.device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeArtifacts, FakeMail, FakeMessenger, FakeScripts};

    struct Fixture {
        messenger: Arc<FakeMessenger>,
        artifacts: Arc<FakeArtifacts>,
        mail: Arc<FakeMail>,
        provisioner: Provisioner,
    }

    fn fixture() -> Fixture {
        let messenger = Arc::new(FakeMessenger::new());
        let artifacts = Arc::new(FakeArtifacts::new());
        let mail = Arc::new(FakeMail::new());
        let provisioner = Provisioner {
            messenger: messenger.clone(),
            artifacts: artifacts.clone(),
            mail: mail.clone(),
            cues: CuePlayer::new(Arc::new(FakeScripts::new()), "/media", false),
            poll_interval: Duration::from_millis(10),
        };
        Fixture {
            messenger,
            artifacts,
            mail,
            provisioner,
        }
    }

    fn setup() -> SetupRecord {
        SetupRecord {
            primary: Principal::new("alice", "alice@example.com"),
            device: Principal::new("warden_bot", "warden@example.com"),
        }
    }

    #[tokio::test]
    async fn test_existing_primary_skips_provisioning() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let records = RecordStore::new(dir.path());
        let primary = PrimaryConfig {
            master: setup().primary,
            device: setup().device,
        };
        records.write(PRIMARY_CONFIG, &primary).unwrap();

        assert_eq!(f.provisioner.ensure_primary(&records).await.unwrap(), primary);
        assert!(f.mail.emails().is_empty());
    }

    #[tokio::test]
    async fn test_no_records_is_unconfigured() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let err = f
            .provisioner
            .ensure_primary(&RecordStore::new(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Unconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_side_gets_email_resent() {
        let f = fixture();
        f.artifacts.accept_pin("s-2");
        f.messenger.accept_pin("m-1");
        f.mail.queue_pins("s-1", "m-1");

        let dir = tempfile::tempdir().unwrap();
        let records = RecordStore::new(dir.path());
        records.write(SETUP, &setup()).unwrap();

        let provisioner = Arc::new(f.provisioner);
        let provisioning = tokio::spawn({
            let records = records.clone();
            let provisioner = provisioner.clone();
            async move { provisioner.ensure_primary(&records).await }
        });

        for _ in 0..200 {
            if f.mail.emails().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        f.mail.queue_pins("s-2", "ignored");

        let primary = tokio::time::timeout(Duration::from_secs(2), provisioning)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(primary.master.messaging_handle, "alice");
        assert!(records.exists(PRIMARY_CONFIG));
        assert_eq!(
            f.mail.emails(),
            vec![
                ("alice@example.com".to_string(), PinTarget::Both),
                ("alice@example.com".to_string(), PinTarget::Storage),
            ]
        );
        assert_eq!(f.artifacts.pins(), vec!["s-1", "s-2"]);
        assert_eq!(f.messenger.pins(), vec!["m-1"]);
    }
}
