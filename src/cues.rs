//! Audible and LED cues
//!
//! Cues are fire-and-forget. A failing cue script is logged and otherwise
//! ignored.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::scripts::{self, ScriptRunner};

/// Sounds played when a job starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    AreYouThere,
    GoSecure,
    StopSecure,
    TakeThree,
    SweepRoom,
    Temperature,
    GoToSleep,
    IntruderAlert,
}

impl Cue {
    fn media_file(self) -> &'static str {
        match self {
            Cue::AreYouThere => "areYouThere.mp3",
            Cue::GoSecure => "goSecure.mp3",
            Cue::StopSecure => "stopSecure.mp3",
            Cue::TakeThree => "takeThree.mp3",
            Cue::SweepRoom => "sweepRoom.mp3",
            Cue::Temperature => "temperature.mp3",
            Cue::GoToSleep => "goToSleep.mp3",
            Cue::IntruderAlert => "intruderAlert.mp3",
        }
    }
}

/// LED blink pattern: on seconds, off seconds, repetitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkPattern {
    pub on: &'static str,
    pub off: &'static str,
    pub count: &'static str,
}

impl BlinkPattern {
    pub const READING: BlinkPattern = BlinkPattern {
        on: ".25",
        off: ".25",
        count: "6",
    };

    pub const WAITING: BlinkPattern = BlinkPattern {
        on: "2",
        off: "2",
        count: "4",
    };
}

#[derive(Clone)]
pub struct CuePlayer {
    scripts: Arc<dyn ScriptRunner>,
    media_dir: PathBuf,
    enabled: bool,
}

impl CuePlayer {
    pub fn new(scripts: Arc<dyn ScriptRunner>, media_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            scripts,
            media_dir: media_dir.into(),
            enabled,
        }
    }

    /// Play a cue in the background
    pub fn play(&self, cue: Cue) {
        if !self.enabled {
            return;
        }

        let scripts = self.scripts.clone();
        let media = self.media_dir.join(cue.media_file());
        tokio::spawn(async move {
            let media = media.to_string_lossy();
            if let Err(e) = scripts.run(scripts::PLAY_CUE, &[media.as_ref()]).await {
                warn!("Cue {:?} failed: {}", cue, e);
            }
        });
    }

    /// Blink the LED until the returned guard is dropped
    pub fn blink(&self, pattern: BlinkPattern) -> BlinkGuard {
        if !self.enabled {
            return BlinkGuard {
                task: None,
                scripts: None,
            };
        }

        let scripts = self.scripts.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = scripts
                .run(scripts::BLINK_LED, &[pattern.on, pattern.off, pattern.count])
                .await
            {
                warn!("LED blink failed: {}", e);
            }
        });

        BlinkGuard {
            task: Some(task),
            scripts: Some(self.scripts.clone()),
        }
    }
}

/// Stops the LED blink and resets the LED when dropped
pub struct BlinkGuard {
    task: Option<JoinHandle<()>>,
    scripts: Option<Arc<dyn ScriptRunner>>,
}

impl Drop for BlinkGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let Some(scripts) = self.scripts.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = scripts.run(scripts::BLINK_LED_RESET, &[]).await {
                    warn!("LED reset failed: {}", e);
                }
            });
        }
    }
}
