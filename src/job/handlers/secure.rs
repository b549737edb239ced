//! Secure mode: the motion watch loop and its stop handler
//!
//! The watch loop occupies one immediate worker for as long as secure mode is
//! on. It is stopped cooperatively through [`SecureWatch`]; stopping also
//! kills the in-flight motion poll and cuts short any cooldown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_shared::defaults::MOTION_MARKER;

use super::capture::capture_images;
use crate::cues::Cue;
use crate::job::{JobContext, JobOutcome};
use crate::scripts;

/// Shared control block for one secure-mode run
#[derive(Debug)]
pub struct SecureWatch {
    requested: AtomicBool,
    looping: AtomicBool,
    halt: CancellationToken,
    poll: Mutex<CancellationToken>,
}

impl SecureWatch {
    pub fn new() -> Self {
        let halt = CancellationToken::new();
        let poll = Mutex::new(halt.child_token());
        Self {
            requested: AtomicBool::new(true),
            looping: AtomicBool::new(false),
            halt,
            poll,
        }
    }

    /// Request the loop to keep going or to stop
    pub fn set_running(&self, running: bool) {
        self.requested.store(running, Ordering::SeqCst);
        if !running {
            self.halt.cancel();
        }
    }

    /// Whether the watch loop is currently polling
    pub fn is_running(&self) -> bool {
        self.looping.load(Ordering::SeqCst)
    }

    /// Whether secure mode is still wanted
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Kill the in-flight motion poll
    pub fn kill_process(&self) {
        let mut poll = self.poll.lock().unwrap_or_else(PoisonError::into_inner);
        poll.cancel();
        *poll = self.halt.child_token();
    }

    fn poll_token(&self) -> CancellationToken {
        self.poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sleep for `duration` unless the watch is stopped first
    async fn pause(&self, duration: std::time::Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.halt.cancelled() => {}
        }
    }
}

impl Default for SecureWatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle GO_SECURE
pub async fn go_secure(ctx: &JobContext, watch: &SecureWatch) -> JobOutcome {
    ctx.cues.play(Cue::GoSecure);
    ctx.host
        .notify("Room is secure, searching for intruders.")
        .await;

    watch.looping.store(true, Ordering::SeqCst);
    info!("[SECURE] Motion watch started");

    while watch.is_requested() {
        let kill = watch.poll_token();
        let polled = tokio::select! {
            result = ctx.scripts.run(scripts::START_SECURE, &[]) => Some(result),
            _ = kill.cancelled() => None,
        };

        match polled {
            Some(Ok(output)) if output.stdout.contains(MOTION_MARKER) => {
                warn!("[SECURE] Motion detected");
                ctx.cues.play(Cue::IntruderAlert);
                ctx.host.notify("Intruder alert, sending images soon.").await;

                match capture_images(ctx, "Go Secure").await {
                    Ok(link) => {
                        ctx.host
                            .notify(&format!(
                                "Please click the below link to view the images: {link}"
                            ))
                            .await
                    }
                    Err(e) => {
                        error!("[SECURE] Intruder capture failed: {:#}", e);
                        ctx.host.notify("Unable to take photos.").await;
                    }
                }

                watch.pause(ctx.secure_cooldown).await;
            }
            // No motion, poll again
            Some(Ok(_)) => tokio::task::yield_now().await,
            Some(Err(e)) => {
                warn!("[SECURE] Motion poll failed: {}", e);
                watch.pause(ctx.secure_retry).await;
            }
            None => {
                debug!("[SECURE] Motion poll killed");
                watch.pause(ctx.secure_retry).await;
            }
        }
    }

    watch.looping.store(false, Ordering::SeqCst);
    info!("[SECURE] Motion watch stopped");
    JobOutcome::Finished
}

/// Handle STOP_SECURE: release the motion sensor
pub async fn stop_secure(ctx: &JobContext) -> JobOutcome {
    ctx.cues.play(Cue::StopSecure);

    match ctx.scripts.run(scripts::STOP_SECURE, &[]).await {
        Ok(_) => JobOutcome::Completed {
            message: "Monitoring stopped.".into(),
        },
        Err(e) => {
            error!("[SECURE] Stop failed: {}", e);
            JobOutcome::Failed {
                message: "Unable to stop monitoring.".into(),
            }
        }
    }
}
