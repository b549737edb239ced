//! External device scripts
//!
//! Every hardware action (camera, motion sensor, probe, power) is a script in
//! the script directory. Runs block the calling task until the script exits;
//! dropping the future kills the child.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

pub const SHOW_TEMP: &str = "showTemp.sh";
pub const TAKE_THREE_PICS: &str = "take3Pics.sh";
pub const TAKE_SWEEP_VIDEO: &str = "takeSweepVid.sh";
pub const START_SECURE: &str = "startSecure.sh";
pub const STOP_SECURE: &str = "stopSecure.sh";
pub const SHOW_IP: &str = "showIp.sh";
pub const POWER: &str = "power.sh";
pub const BLINK_LED: &str = "blinkLED.sh";
pub const BLINK_LED_RESET: &str = "blinkLEDReset.sh";
pub const PLAY_CUE: &str = "playCue.sh";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to launch {script}: {source}")]
    Launch {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{script} exited with code {code}")]
    ExitCode { script: String, code: i32 },
}

/// Captured result of a script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub exit_code: i32,
}

/// Runs external scripts
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run a script and capture its output, non-zero exit is an error
    async fn run(&self, script: &str, args: &[&str]) -> Result<ScriptOutput, ScriptError>;
}

/// Runs scripts through a shell from a script directory
#[derive(Debug, Clone)]
pub struct ShellScriptRunner {
    shell: String,
    script_dir: PathBuf,
}

impl ShellScriptRunner {
    pub fn new(shell: impl Into<String>, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            script_dir: script_dir.into(),
        }
    }
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, script: &str, args: &[&str]) -> Result<ScriptOutput, ScriptError> {
        debug!("[SCRIPT] {} {:?}", script, args);

        let output = Command::new(&self.shell)
            .arg(self.script_dir.join(script))
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                error!("[SCRIPT] {} failed to launch: {}", script, source);
                ScriptError::Launch {
                    script: script.into(),
                    source,
                }
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("[SCRIPT] {} exited with {}", script, exit_code);

        if exit_code != 0 {
            return Err(ScriptError::ExitCode {
                script: script.into(),
                code: exit_code,
            });
        }

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code,
        })
    }
}
