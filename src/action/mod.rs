pub mod shell;
pub mod system;
pub mod template;
pub mod wol;

#[cfg(test)]
pub(crate) mod recording;

use crate::config::schema::{ActionDescriptor, CommandStep, DictationPhase, MediaKey, VolumeOp};
use crate::error::PadError;
use futures::future::BoxFuture;

/// What an executor reports back for a successful action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Human-readable detail, shown in the notification when present.
    pub detail: Option<String>,
}

impl ActionOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

pub type ActionResult = Result<ActionOutcome, PadError>;

/// Future returned by every executor entry point. It must not borrow the
/// executor: the dispatcher runs it on its own task.
pub type ActionFuture = BoxFuture<'static, ActionResult>;

/// Capability boundary to the system: one entry point per action kind.
///
/// Methods are called on the dispatcher loop and must return quickly; the
/// real work happens when the returned future is polled.
pub trait ActionExecutor: Send + Sync {
    fn launch_path(&self, path: &str, args: &[String]) -> ActionFuture;

    /// Start (`on`) or stop the process described by `path`/`args`.
    fn toggle_process(&self, path: &str, args: &[String], on: bool) -> ActionFuture;

    fn open_url(&self, url: &str) -> ActionFuture;

    fn shell_command(&self, commands: &[CommandStep]) -> ActionFuture;

    fn powershell_command(&self, commands: &[CommandStep]) -> ActionFuture;

    fn keyboard_shortcut(&self, keys: &str) -> ActionFuture;

    fn media_control(&self, control: MediaKey) -> ActionFuture;

    fn volume_adjust(&self, op: VolumeOp, amount: u8) -> ActionFuture;

    fn audio_device_switch(&self, device: Option<&str>) -> ActionFuture;

    /// Start or stop recording for dictation. Stopping transcribes what was
    /// recorded.
    fn speech_to_text(&self, language: &str, phase: DictationPhase) -> ActionFuture;

    fn text_to_speech(&self, text: &str, language: Option<&str>) -> ActionFuture;

    fn wake_on_lan(&self, mac: &str, broadcast: &str) -> ActionFuture;

    fn tv_control(&self, command: &str, value: Option<&str>, host: Option<&str>) -> ActionFuture;
}

/// Route `action` to its executor entry point.
///
/// `toggle_on` is the desired state for `toggle_process` and the dictation
/// phase for `speech_to_text` (on starts recording), decided by the
/// dispatcher; it is ignored for every other kind.
pub fn invoke(
    executor: &dyn ActionExecutor,
    action: &ActionDescriptor,
    toggle_on: bool,
) -> ActionFuture {
    match action {
        ActionDescriptor::LaunchPath { path, args } => executor.launch_path(path, args),
        ActionDescriptor::ToggleProcess { path, args } => {
            executor.toggle_process(path, args, toggle_on)
        }
        ActionDescriptor::OpenUrl { url } => executor.open_url(url),
        ActionDescriptor::ShellCommand { commands } => executor.shell_command(commands),
        ActionDescriptor::PowerShellCommand { commands } => executor.powershell_command(commands),
        ActionDescriptor::KeyboardShortcut { keys } => executor.keyboard_shortcut(keys),
        ActionDescriptor::MediaControl { control } => executor.media_control(*control),
        ActionDescriptor::VolumeAdjust { op, amount } => executor.volume_adjust(*op, *amount),
        ActionDescriptor::AudioDeviceSwitch { device } => {
            executor.audio_device_switch(device.as_deref())
        }
        ActionDescriptor::SpeechToText { language } => {
            let phase = if toggle_on {
                DictationPhase::Start
            } else {
                DictationPhase::Stop
            };
            executor.speech_to_text(language, phase)
        }
        ActionDescriptor::TextToSpeech { text, language } => {
            executor.text_to_speech(text, language.as_deref())
        }
        ActionDescriptor::WakeOnLan { mac, broadcast } => executor.wake_on_lan(mac, broadcast),
        ActionDescriptor::TvControl {
            command,
            value,
            host,
        } => executor.tv_control(command, value.as_deref(), host.as_deref()),
    }
}
