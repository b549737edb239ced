//! Jobs - one unit of device work per command invocation
//!
//! A [`Job`] carries a [`JobSpec`] built by the communicator. The dispatcher
//! routes it by [`JobType`] and calls [`Job::run`], which performs the device
//! action, sets the result message and notifies the current master once.

mod dispatcher;
pub mod handlers;

pub use dispatcher::Dispatcher;
pub use handlers::SecureWatch;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use warden_shared::{JobName, JobType};

use crate::cues::CuePlayer;
use crate::scripts::ScriptRunner;
use crate::services::ArtifactStore;

/// Result of a job body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Action succeeded
    Completed { message: String },
    /// Action failed, message explains
    Failed { message: String },
    /// Long-running job ended after reporting on its own
    Finished,
}

impl JobOutcome {
    pub fn message(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { message } | JobOutcome::Failed { message } => Some(message),
            JobOutcome::Finished => None,
        }
    }
}

/// Callbacks from running jobs into the device
#[async_trait]
pub trait JobHost: Send + Sync {
    /// Message the current master
    async fn notify(&self, text: &str);

    /// Re-arm secure mode after a paused capture
    async fn resume_secure(&self);
}

/// Everything a job body may touch
pub struct JobContext {
    pub scripts: Arc<dyn ScriptRunner>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub host: Arc<dyn JobHost>,
    pub cues: CuePlayer,
    /// Where captures land
    pub store_dir: PathBuf,
    pub secure_cooldown: Duration,
    pub secure_retry: Duration,
}

/// What to run, with per-invocation inputs
#[derive(Clone)]
pub enum JobSpec {
    AreYouThere {
        current: Option<JobName>,
        secure: bool,
    },
    Temperature,
    Ip,
    TakeThree {
        send_ack: bool,
        re_enable_secure: bool,
    },
    SweepRoom {
        send_ack: bool,
        re_enable_secure: bool,
    },
    GoToSleep,
    Reboot,
    GoSecure {
        watch: Arc<SecureWatch>,
    },
    StopSecure,
}

impl JobSpec {
    pub fn name(&self) -> JobName {
        match self {
            JobSpec::AreYouThere { .. } => JobName::AreYouThere,
            JobSpec::Temperature => JobName::Temperature,
            JobSpec::Ip => JobName::Ip,
            JobSpec::TakeThree { .. } => JobName::TakeThree,
            JobSpec::SweepRoom { .. } => JobName::SweepRoom,
            JobSpec::GoToSleep => JobName::GoToSleep,
            JobSpec::Reboot => JobName::Reboot,
            JobSpec::GoSecure { .. } => JobName::GoSecure,
            JobSpec::StopSecure => JobName::StopSecure,
        }
    }

    fn re_enable_secure(&self) -> bool {
        match self {
            JobSpec::TakeThree {
                re_enable_secure, ..
            }
            | JobSpec::SweepRoom {
                re_enable_secure, ..
            } => *re_enable_secure,
            _ => false,
        }
    }
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.name())
    }
}

/// A unit of work created per invocation
#[derive(Debug)]
pub struct Job {
    spec: JobSpec,
    message: String,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            spec,
            message: String::new(),
        }
    }

    pub fn name(&self) -> JobName {
        self.spec.name()
    }

    pub fn job_type(&self) -> JobType {
        self.name().job_type()
    }

    /// Result message, empty until the job ran
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Run the job body, notify the master with its message, then re-arm
    /// secure mode if requested
    pub async fn run(&mut self, ctx: &JobContext) -> JobOutcome {
        let name = self.name();
        debug!("[JOB] {} starting", name);

        let outcome = match &self.spec {
            JobSpec::AreYouThere { current, secure } => {
                handlers::are_you_there(ctx, *current, *secure).await
            }
            JobSpec::Temperature => handlers::temperature(ctx).await,
            JobSpec::Ip => handlers::ip(ctx).await,
            JobSpec::TakeThree { send_ack, .. } => handlers::take_three(ctx, *send_ack).await,
            JobSpec::SweepRoom { send_ack, .. } => handlers::sweep_room(ctx, *send_ack).await,
            JobSpec::GoToSleep => handlers::go_to_sleep(ctx).await,
            JobSpec::Reboot => handlers::reboot(ctx).await,
            JobSpec::GoSecure { watch } => handlers::go_secure(ctx, watch).await,
            JobSpec::StopSecure => handlers::stop_secure(ctx).await,
        };

        if let Some(message) = outcome.message() {
            self.message = message.to_string();
            ctx.host.notify(&self.message).await;
        }

        if self.spec.re_enable_secure() {
            ctx.host.resume_secure().await;
        }

        info!("[JOB] {} finished: {:?}", name, outcome);
        outcome
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::{FakeArtifacts, FakeScripts};
    use std::sync::Mutex;

    /// Host recording notifications and secure resumes
    #[derive(Default)]
    pub struct RecordingHost {
        pub notes: Mutex<Vec<String>>,
        pub resumes: Mutex<usize>,
    }

    impl RecordingHost {
        pub fn notes(&self) -> Vec<String> {
            self.notes.lock().unwrap().clone()
        }

        pub fn resumes(&self) -> usize {
            *self.resumes.lock().unwrap()
        }
    }

    #[async_trait]
    impl JobHost for RecordingHost {
        async fn notify(&self, text: &str) {
            self.notes.lock().unwrap().push(text.into());
        }

        async fn resume_secure(&self) {
            *self.resumes.lock().unwrap() += 1;
        }
    }

    pub struct Harness {
        pub scripts: Arc<FakeScripts>,
        pub artifacts: Arc<FakeArtifacts>,
        pub host: Arc<RecordingHost>,
        pub ctx: Arc<JobContext>,
    }

    pub fn harness() -> Harness {
        let scripts = Arc::new(FakeScripts::new());
        scripts.delay(crate::scripts::START_SECURE, Duration::from_millis(5));
        let artifacts = Arc::new(FakeArtifacts::new());
        let host = Arc::new(RecordingHost::default());
        let ctx = Arc::new(JobContext {
            scripts: scripts.clone(),
            artifacts: artifacts.clone(),
            host: host.clone(),
            cues: CuePlayer::new(scripts.clone(), "/media", false),
            store_dir: PathBuf::from("/store"),
            secure_cooldown: Duration::from_millis(50),
            secure_retry: Duration::from_millis(10),
        });

        Harness {
            scripts,
            artifacts,
            host,
            ctx,
        }
    }
}
