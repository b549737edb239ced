//! Communicator - entry point for inbound messages
//!
//! Resolves the sender against the ledger, feeds the handoff machine while a
//! lane is running for that sender, and otherwise turns recognized commands
//! into jobs. Inbound messages are handled one at a time: the handoff lock is
//! held for the whole of each message.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};
use warden_shared::handoff::{HandoffEffect, HandoffEvent, HandoffMachine};
use warden_shared::{CommandKind, JobName, Lexicon};

use crate::config::{ConfigError, DeviceConfig};
use crate::cues::CuePlayer;
use crate::job::{Dispatcher, Job, JobContext, JobHost, JobSpec, SecureWatch};
use crate::ledger::Ledger;
use crate::records::RecordStore;
use crate::scripts::ScriptRunner;
use crate::services::{ArtifactStore, Messenger};

/// External collaborators the communicator drives
#[derive(Clone)]
pub struct Services {
    pub messenger: Arc<dyn Messenger>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub scripts: Arc<dyn ScriptRunner>,
}

pub struct Communicator {
    lexicon: Lexicon,
    ledger: Ledger,
    records: RecordStore,
    messenger: Arc<dyn Messenger>,
    dispatcher: Dispatcher,
    handoff: AsyncMutex<HandoffMachine>,
    secure: Mutex<Option<Arc<SecureWatch>>>,
}

impl Communicator {
    /// Build the communicator and start the dispatcher
    pub fn new(
        config: &DeviceConfig,
        ledger: Ledger,
        services: Services,
    ) -> Result<Arc<Self>, ConfigError> {
        let lexicon = Lexicon::builtin()?;
        let records = ledger.records().clone();
        let handoff = HandoffMachine::new(ledger.primary().clone());
        let cues = CuePlayer::new(
            services.scripts.clone(),
            config.media_dir(),
            config.cues_enabled,
        );

        Ok(Arc::new_cyclic(|me: &Weak<Self>| {
            let ctx = Arc::new(JobContext {
                scripts: services.scripts.clone(),
                artifacts: services.artifacts.clone(),
                host: Arc::new(HostLink { comm: me.clone() }),
                cues,
                store_dir: config.store_dir(),
                secure_cooldown: config.secure_cooldown(),
                secure_retry: config.secure_retry(),
            });

            Self {
                lexicon,
                ledger,
                records,
                messenger: services.messenger.clone(),
                dispatcher: Dispatcher::start(ctx, config.immediate_pool_size),
                handoff: AsyncMutex::new(handoff),
                secure: Mutex::new(None),
            }
        }))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Resume secure mode if it was on before the last stop
    pub fn start_communication(&self) {
        if self.records.is_secure_lock() {
            info!("[SECURE] Secure lock found, resuming secure mode");
            self.start_secure();
        }
        info!("Communication started, master is {}", self.ledger.current_master().messaging_handle);
    }

    /// Stop secure mode, keeping its lock, and interrupt all jobs
    pub fn stop_communication(&self) {
        self.halt_secure();
        self.dispatcher.shutdown();
        info!("Communication stopped");
    }

    /// Handle one inbound message
    pub async fn handle_message(&self, text: &str, sender: &str) {
        let Some(role) = self.ledger.role_of(sender) else {
            warn!("Dropping message from unknown sender {}", sender);
            return;
        };
        debug!("Message from {} ({}): {}", sender, role, text);

        let mut handoff = self.handoff.lock().await;
        let command = self.lexicon.match_text(text);

        match command {
            Some(CommandKind::ChangeMaster) => {
                let effects = handoff.process_event(HandoffEvent::ChangeMaster {
                    from: role,
                    sender: sender.into(),
                    secondary: self.ledger.secondary_record(),
                });
                self.apply(sender, effects).await;
                return;
            }
            Some(CommandKind::CancelChangeMaster) => {
                let effects = handoff.process_event(HandoffEvent::Cancel {
                    from: role,
                    sender: sender.into(),
                });
                self.apply(sender, effects).await;
                return;
            }
            _ => {}
        }

        if handoff.is_running_for(role) {
            if command.is_some() {
                self.send(
                    sender,
                    "Sorry, cannot process the command, you need to complete or cancel the change master process first.",
                )
                .await;
                return;
            }

            let event = if handoff.awaits_messaging_handle() {
                let handle = text.trim();
                let known = match self.messenger.handle_exists(handle).await {
                    Ok(known) => known,
                    Err(e) => {
                        warn!("[HANDOFF] Handle lookup for {} failed: {}", handle, e);
                        false
                    }
                };
                HandoffEvent::MessagingHandle {
                    from: role,
                    sender: sender.into(),
                    handle: handle.into(),
                    known,
                }
            } else {
                HandoffEvent::Reply {
                    from: role,
                    sender: sender.into(),
                    text: text.into(),
                }
            };

            let effects = handoff.process_event(event);
            self.apply(sender, effects).await;
            return;
        }

        if command.is_some() && self.ledger.current_role() != role {
            let current = self.ledger.current_master();
            self.send(
                sender,
                &format!("Currently I am communicating with {}.", current.messaging_handle),
            )
            .await;
            return;
        }

        match command {
            Some(kind) => self.process_command(kind, sender).await,
            None => {
                self.send(sender, &format!("Unable to understand command: {}", text.trim()))
                    .await
            }
        }
    }

    async fn process_command(&self, kind: CommandKind, sender: &str) {
        info!("Command {:?} from {}", kind, sender);

        match kind {
            CommandKind::AreYouThere => self.dispatcher.submit(Job::new(JobSpec::AreYouThere {
                current: self.dispatcher.current_job(),
                secure: self.is_secure(),
            })),
            CommandKind::Temperature => self.dispatcher.submit(Job::new(JobSpec::Temperature)),
            CommandKind::Ip => self.dispatcher.submit(Job::new(JobSpec::Ip)),
            CommandKind::GoSecure => {
                if self.is_secure() {
                    self.send(sender, "Already secure.").await;
                } else {
                    self.start_secure();
                }
            }
            CommandKind::StopSecure => {
                if self.is_secure() {
                    self.stop_secure();
                } else {
                    self.send(sender, "Secure mode not started.").await;
                }
            }
            CommandKind::TakeThree | CommandKind::SweepRoom => {
                let name = if kind == CommandKind::TakeThree {
                    JobName::TakeThree
                } else {
                    JobName::SweepRoom
                };
                self.report_busy(name, sender).await;

                let secure = self.is_secure();
                if secure {
                    let what = if name == JobName::TakeThree {
                        "take pictures"
                    } else {
                        "record video"
                    };
                    self.send(sender, &format!("Pausing secure mode to {what}.")).await;
                    self.halt_secure();
                }

                let send_ack = !secure;
                let spec = if name == JobName::TakeThree {
                    JobSpec::TakeThree {
                        send_ack,
                        re_enable_secure: secure,
                    }
                } else {
                    JobSpec::SweepRoom {
                        send_ack,
                        re_enable_secure: secure,
                    }
                };
                self.dispatcher.submit(Job::new(spec));
            }
            CommandKind::GoToSleep | CommandKind::Reboot => {
                let (name, spec) = if kind == CommandKind::GoToSleep {
                    (JobName::GoToSleep, JobSpec::GoToSleep)
                } else {
                    (JobName::Reboot, JobSpec::Reboot)
                };
                self.report_busy(name, sender).await;

                if self.is_secure() {
                    if let Err(e) = self.records.add_secure_lock() {
                        error!("[SECURE] Failed to persist secure lock: {}", e);
                    }
                }
                self.dispatcher.submit(Job::new(spec));
            }
            CommandKind::ChangeMaster | CommandKind::CancelChangeMaster => {}
        }
    }

    /// Tell the sender a queued job is running ahead of `name`
    async fn report_busy(&self, name: JobName, sender: &str) {
        let Some(current) = self.dispatcher.current_job() else {
            return;
        };

        let text = match (current, name) {
            (JobName::TakeThree, JobName::TakeThree) => "Already taking 3.".to_string(),
            (JobName::SweepRoom, JobName::SweepRoom) => "Already sweeping room.".to_string(),
            _ => format!("Will process \"{name}\" after executing \"{current}\"."),
        };
        self.send(sender, &text).await;
    }

    pub fn is_secure(&self) -> bool {
        self.secure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| w.is_requested())
    }

    /// Watch handle of the live secure run, if any
    pub fn secure_watch(&self) -> Option<Arc<SecureWatch>> {
        self.secure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persist the secure lock and start a motion watch
    pub fn start_secure(&self) {
        let watch = Arc::new(SecureWatch::new());
        let previous = self
            .secure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(watch.clone());
        if let Some(previous) = previous {
            previous.set_running(false);
        }

        if let Err(e) = self.records.add_secure_lock() {
            error!("[SECURE] Failed to persist secure lock: {}", e);
        }

        self.dispatcher.submit(Job::new(JobSpec::GoSecure { watch }));
        info!("[SECURE] Secure mode started");
    }

    /// Stop secure mode for good and release the sensor
    pub fn stop_secure(&self) {
        self.halt_secure();
        if let Err(e) = self.records.delete_secure_lock() {
            error!("[SECURE] Failed to delete secure lock: {}", e);
        }
        self.dispatcher.submit(Job::new(JobSpec::StopSecure));
        info!("[SECURE] Secure mode stopped");
    }

    /// Stop the motion watch, leaving the lock in place
    fn halt_secure(&self) {
        let watch = self
            .secure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watch) = watch {
            watch.set_running(false);
            watch.kill_process();
        }
    }

    /// Carry out handoff effects in order. A failed record update ends there:
    /// the announcements after it are dropped and the sender is told.
    async fn apply(&self, sender: &str, effects: Vec<HandoffEffect>) {
        for effect in effects {
            let persisted = match effect {
                HandoffEffect::Send { to, text } => {
                    self.send(&to, &text).await;
                    continue;
                }
                HandoffEffect::ActivateSecondary(secondary) => {
                    self.ledger.activate_secondary(secondary)
                }
                HandoffEffect::EraseSecondary => self.ledger.erase_secondary(),
            };

            if let Err(e) = persisted {
                error!("[HANDOFF] Failed to update secondary record: {}", e);
                self.send(sender, "Unable to change master, please try again.")
                    .await;
                return;
            }
        }
    }

    async fn send(&self, to: &str, text: &str) {
        if let Err(e) = self.messenger.send(to, text).await {
            error!("Failed to message {}: {}", to, e);
        }
    }

    /// Message the current master
    pub async fn notify_master(&self, text: &str) {
        let master = self.ledger.current_master();
        self.send(&master.messaging_handle, text).await;
    }
}

/// Job callbacks routed back to the communicator
struct HostLink {
    comm: Weak<Communicator>,
}

#[async_trait::async_trait]
impl JobHost for HostLink {
    async fn notify(&self, text: &str) {
        if let Some(comm) = self.comm.upgrade() {
            comm.notify_master(text).await;
        }
    }

    async fn resume_secure(&self) {
        if let Some(comm) = self.comm.upgrade() {
            if !comm.is_secure() {
                comm.start_secure();
            }
        }
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("role", &self.ledger.current_role())
            .field("secure", &self.is_secure())
            .finish()
    }
}
