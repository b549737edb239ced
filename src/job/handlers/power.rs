//! Power handlers

use tracing::{error, warn};

use crate::cues::Cue;
use crate::job::{JobContext, JobOutcome};
use crate::scripts;

/// Handle GO_TO_SLEEP
pub async fn go_to_sleep(ctx: &JobContext) -> JobOutcome {
    ctx.cues.play(Cue::GoToSleep);
    power(ctx, "poweroff", "Going to sleep.", "Unable to go to sleep.").await
}

/// Handle REBOOT
pub async fn reboot(ctx: &JobContext) -> JobOutcome {
    power(ctx, "reboot", "Rebooting.", "Unable to reboot.").await
}

async fn power(ctx: &JobContext, action: &str, done: &str, failed: &str) -> JobOutcome {
    warn!("[JOB] Power action: {}", action);

    match ctx.scripts.run(scripts::POWER, &[action]).await {
        Ok(_) => JobOutcome::Completed {
            message: done.into(),
        },
        Err(e) => {
            error!("[JOB] Power action {} failed: {}", action, e);
            JobOutcome::Failed {
                message: failed.into(),
            }
        }
    }
}
