//! Recording fakes for the external collaborators

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::scripts::{ScriptError, ScriptOutput, ScriptRunner};
use crate::services::{ArtifactStore, MailChannel, Messenger, PinPair, PinTarget};

#[derive(Debug, Clone)]
enum Scripted {
    Stdout(String),
    Exit(i32),
}

/// Script runner answering from a table, recording every call
#[derive(Default)]
pub struct FakeScripts {
    calls: Mutex<Vec<Vec<String>>>,
    defaults: Mutex<HashMap<String, Scripted>>,
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeScripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `script` with `stdout`
    pub fn respond(&self, script: &str, stdout: &str) -> &Self {
        self.defaults
            .lock()
            .unwrap()
            .insert(script.into(), Scripted::Stdout(stdout.into()));
        self
    }

    /// Always fail `script`
    pub fn fail(&self, script: &str) -> &Self {
        self.defaults
            .lock()
            .unwrap()
            .insert(script.into(), Scripted::Exit(1));
        self
    }

    /// Answer the next call of `script` with `stdout`, ahead of the default
    pub fn push(&self, script: &str, stdout: &str) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(script.into())
            .or_default()
            .push_back(Scripted::Stdout(stdout.into()));
        self
    }

    /// Make every call of `script` take `delay`
    pub fn delay(&self, script: &str, delay: Duration) -> &Self {
        self.delays.lock().unwrap().insert(script.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, script: &str) -> usize {
        self.calls().iter().filter(|c| c[0] == script).count()
    }
}

#[async_trait]
impl ScriptRunner for FakeScripts {
    async fn run(&self, script: &str, args: &[&str]) -> Result<ScriptOutput, ScriptError> {
        let mut call = vec![script.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call);

        let delay = self.delays.lock().unwrap().get(script).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .queued
            .lock()
            .unwrap()
            .get_mut(script)
            .and_then(VecDeque::pop_front);
        let answer = next.or_else(|| self.defaults.lock().unwrap().get(script).cloned());

        match answer {
            Some(Scripted::Exit(code)) => Err(ScriptError::ExitCode {
                script: script.into(),
                code,
            }),
            Some(Scripted::Stdout(stdout)) => Ok(ScriptOutput {
                stdout,
                exit_code: 0,
            }),
            None => Ok(ScriptOutput {
                stdout: String::new(),
                exit_code: 0,
            }),
        }
    }
}

/// Messenger recording outbound messages
#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<(String, String)>>,
    known: Mutex<HashSet<String>>,
    pins: Mutex<Vec<String>>,
    accept_pin: Mutex<Option<String>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known(handles: &[&str]) -> Self {
        let messenger = Self::new();
        messenger
            .known
            .lock()
            .unwrap()
            .extend(handles.iter().map(|h| h.to_string()));
        messenger
    }

    /// Only this PIN authorizes
    pub fn accept_pin(&self, pin: &str) {
        *self.accept_pin.lock().unwrap() = Some(pin.into());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, handle: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == handle)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn pins(&self) -> Vec<String> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send(&self, to: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((to.into(), text.into()));
        Ok(())
    }

    async fn handle_exists(&self, handle: &str) -> Result<bool> {
        Ok(self.known.lock().unwrap().contains(handle))
    }

    async fn authorize_with_pin(&self, pin: &str) -> Result<()> {
        self.pins.lock().unwrap().push(pin.into());
        match &*self.accept_pin.lock().unwrap() {
            Some(expected) if expected != pin => Err(anyhow!("bad messaging pin")),
            _ => Ok(()),
        }
    }
}

/// Artifact store returning predictable links
#[derive(Default)]
pub struct FakeArtifacts {
    uploads: Mutex<Vec<String>>,
    pins: Mutex<Vec<String>>,
    accept_pin: Mutex<Option<String>>,
    shortened: AtomicUsize,
}

impl FakeArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_pin(&self, pin: &str) {
        *self.accept_pin.lock().unwrap() = Some(pin.into());
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn pins(&self) -> Vec<String> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn upload_images(&self, files: &[PathBuf], album: &str) -> Result<String> {
        self.uploads
            .lock()
            .unwrap()
            .push(format!("{album}:{}", files.len()));
        Ok(format!("https://store.example/{}", album.replace(' ', "-")))
    }

    async fn upload_video(&self, file: &Path) -> Result<String> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.uploads.lock().unwrap().push(name.clone());
        Ok(format!("https://store.example/{name}"))
    }

    async fn shorten_url(&self, _url: &str) -> Result<String> {
        let n = self.shortened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://sho.rt/{n}"))
    }

    async fn authorize_with_pin(&self, pin: &str) -> Result<()> {
        self.pins.lock().unwrap().push(pin.into());
        match &*self.accept_pin.lock().unwrap() {
            Some(expected) if expected != pin => Err(anyhow!("bad storage pin")),
            _ => Ok(()),
        }
    }
}

/// Mail channel handing out queued PIN pairs
#[derive(Default)]
pub struct FakeMail {
    emails: Mutex<Vec<(String, PinTarget)>>,
    pins: Mutex<VecDeque<PinPair>>,
}

impl FakeMail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_pins(&self, storage_pin: &str, messaging_pin: &str) {
        self.pins.lock().unwrap().push_back(PinPair {
            storage_pin: storage_pin.into(),
            messaging_pin: messaging_pin.into(),
        });
    }

    pub fn emails(&self) -> Vec<(String, PinTarget)> {
        self.emails.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailChannel for FakeMail {
    async fn send_config_email(&self, to: &str, target: PinTarget) -> Result<()> {
        self.emails.lock().unwrap().push((to.into(), target));
        Ok(())
    }

    async fn poll_for_pins(&self) -> Result<Option<PinPair>> {
        Ok(self.pins.lock().unwrap().pop_front())
    }
}
