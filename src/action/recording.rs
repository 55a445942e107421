//! Executor double that records every entry-point call.

use super::{ActionExecutor, ActionFuture, ActionOutcome};
use crate::config::schema::{CommandStep, DictationPhase, MediaKey, VolumeOp};
use crate::error::PadError;
use futures::FutureExt;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: &'static str,
    pub detail: String,
    pub at: Instant,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.detail)
    }
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    failing: Vec<&'static str>,
    delay: Option<Duration>,
    queued: VecDeque<Duration>,
}

#[derive(Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `kind` fail.
    pub fn fail(&self, kind: &'static str) {
        self.inner.lock().unwrap().failing.push(kind);
    }

    /// Make every returned future sleep before resolving.
    pub fn delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    /// Delay the next calls by these durations, one per call, before
    /// falling back to the common delay.
    pub fn delay_next(&self, delays: impl IntoIterator<Item = Duration>) {
        self.inner.lock().unwrap().queued.extend(delays);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    fn record(&self, kind: &'static str, detail: String) -> ActionFuture {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call {
            kind,
            detail: detail.clone(),
            at: Instant::now(),
        });
        let fails = inner.failing.contains(&kind);
        let delay = inner.queued.pop_front().or(inner.delay);
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fails {
                Err(PadError::action(kind, format!("{detail} failed")))
            } else {
                Ok(ActionOutcome::done())
            }
        }
        .boxed()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn launch_path(&self, path: &str, _args: &[String]) -> ActionFuture {
        self.record("launch_path", path.to_string())
    }

    fn toggle_process(&self, path: &str, _args: &[String], on: bool) -> ActionFuture {
        let state = if on { "on" } else { "off" };
        self.record("toggle_process", format!("{path}, {state}"))
    }

    fn open_url(&self, url: &str) -> ActionFuture {
        self.record("open_url", url.to_string())
    }

    fn shell_command(&self, commands: &[CommandStep]) -> ActionFuture {
        let joined: Vec<&str> = commands.iter().map(|c| c.command.as_str()).collect();
        self.record("shell_command", joined.join("; "))
    }

    fn powershell_command(&self, commands: &[CommandStep]) -> ActionFuture {
        let joined: Vec<&str> = commands.iter().map(|c| c.command.as_str()).collect();
        self.record("power_shell_command", joined.join("; "))
    }

    fn keyboard_shortcut(&self, keys: &str) -> ActionFuture {
        self.record("keyboard_shortcut", keys.to_string())
    }

    fn media_control(&self, control: MediaKey) -> ActionFuture {
        self.record("media_control", control.as_str().to_string())
    }

    fn volume_adjust(&self, op: VolumeOp, amount: u8) -> ActionFuture {
        self.record("volume_adjust", format!("{} {amount}", op.as_str()))
    }

    fn audio_device_switch(&self, device: Option<&str>) -> ActionFuture {
        self.record("audio_device_switch", device.unwrap_or("next").to_string())
    }

    fn speech_to_text(&self, language: &str, phase: DictationPhase) -> ActionFuture {
        self.record("speech_to_text", format!("{language} {}", phase.as_str()))
    }

    fn text_to_speech(&self, text: &str, _language: Option<&str>) -> ActionFuture {
        self.record("text_to_speech", text.to_string())
    }

    fn wake_on_lan(&self, mac: &str, _broadcast: &str) -> ActionFuture {
        self.record("wake_on_lan", mac.to_string())
    }

    fn tv_control(&self, command: &str, _value: Option<&str>, _host: Option<&str>) -> ActionFuture {
        self.record("tv_control", command.to_string())
    }
}
