use crate::event::ButtonId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Schema version written by this build.
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub dispatch: DispatchOptions,

    #[serde(default)]
    pub slider: SliderBehavior,

    /// Command templates for action kinds the host executor cannot perform
    /// natively, keyed by action kind name.
    #[serde(default)]
    pub backends: BTreeMap<String, String>,

    #[serde(default)]
    pub buttons: Vec<ButtonMapping>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            device: DeviceConfig::default(),
            dispatch: DispatchOptions::default(),
            slider: SliderBehavior::default(),
            backends: BTreeMap::new(),
            buttons: Vec::new(),
        }
    }
}

impl Configuration {
    /// The mapping entry that binds `trigger` on `pad`, enabled or not.
    pub fn mapping_for(&self, pad: ButtonId, trigger: TriggerMode) -> Option<&ButtonMapping> {
        self.buttons
            .iter()
            .find(|b| b.pad == pad && b.action(trigger).is_some())
    }
}

/// Device discovery and pad layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Explicit port selector: index or case-insensitive name fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// Name fragments tried during auto-connect.
    #[serde(default = "default_known_devices")]
    pub known_devices: Vec<String>,

    /// Delay before the single auto-connect retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// How often the session checks that its port is still present.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Where per-device lock files live. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,

    #[serde(default)]
    pub layout: PadLayout,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            known_devices: default_known_devices(),
            retry_backoff_ms: default_retry_backoff(),
            poll_interval_ms: default_poll_interval(),
            lock_dir: None,
            layout: PadLayout::default(),
        }
    }
}

/// How pads and the slider appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadLayout {
    /// Only accept messages on this channel (0-15). Any channel if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,

    /// Note numbers of pads 1-12, in pad order.
    #[serde(default = "default_pad_notes")]
    pub pad_notes: Vec<u8>,

    /// Controller numbers of pads 1-12 for devices in CC mode. Empty if unused.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pad_controls: Vec<u8>,

    /// Controller number of the slider.
    #[serde(default = "default_slider_control")]
    pub slider_control: u8,
}

impl Default for PadLayout {
    fn default() -> Self {
        Self {
            channel: None,
            pad_notes: default_pad_notes(),
            pad_controls: Vec::new(),
            slider_control: default_slider_control(),
        }
    }
}

/// Timing knobs for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    #[serde(default = "default_hold_threshold")]
    pub hold_threshold_ms: u64,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    #[serde(default = "default_slider_interval")]
    pub slider_interval_ms: u64,

    #[serde(default = "default_action_timeout")]
    pub action_timeout_ms: u64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            hold_threshold_ms: default_hold_threshold(),
            debounce_ms: default_debounce(),
            slider_interval_ms: default_slider_interval(),
            action_timeout_ms: default_action_timeout(),
        }
    }
}

/// What the slider drives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SliderBehavior {
    /// System volume, scaled to 0-100 percent.
    #[default]
    Volume,
    /// Any action; `{value}` and `{percent}` are substituted into its strings.
    Custom { action: ActionDescriptor },
    Off,
}

/// When a mapped action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    Tap,
    LongPress,
    Release,
}

impl TriggerMode {
    pub const ALL: [Self; 3] = [Self::Tap, Self::LongPress, Self::Release];

    pub fn index(self) -> usize {
        match self {
            Self::Tap => 0,
            Self::LongPress => 1,
            Self::Release => 2,
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tap => "tap",
            Self::LongPress => "long-press",
            Self::Release => "release",
        })
    }
}

/// Actions bound to one pad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMapping {
    pub pad: ButtonId,

    /// Label used in notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_tap: Option<ActionDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_hold: Option<ActionDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_release: Option<ActionDescriptor>,
}

impl ButtonMapping {
    pub fn new(pad: ButtonId) -> Self {
        Self {
            pad,
            name: None,
            enabled: true,
            on_tap: None,
            on_hold: None,
            on_release: None,
        }
    }

    pub fn action(&self, trigger: TriggerMode) -> Option<&ActionDescriptor> {
        match trigger {
            TriggerMode::Tap => self.on_tap.as_ref(),
            TriggerMode::LongPress => self.on_hold.as_ref(),
            TriggerMode::Release => self.on_release.as_ref(),
        }
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.pad.to_string())
    }
}

/// One step of a shell or PowerShell action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStep {
    pub command: String,

    /// Pause before this step runs.
    #[serde(default)]
    pub delay_ms: u64,
}

impl CommandStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKey {
    PlayPause,
    NextTrack,
    PrevTrack,
    Stop,
    VolumeUp,
    VolumeDown,
    VolumeMute,
}

impl MediaKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlayPause => "play_pause",
            Self::NextTrack => "next_track",
            Self::PrevTrack => "prev_track",
            Self::Stop => "stop",
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
            Self::VolumeMute => "volume_mute",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeOp {
    Increase,
    Decrease,
    Mute,
    /// Absolute level; `amount` is the target percent.
    Set,
}

impl VolumeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Mute => "mute",
            Self::Set => "set",
        }
    }
}

/// Half of a push-to-talk dictation: recording starts on press and is
/// transcribed on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictationPhase {
    Start,
    Stop,
}

impl DictationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// An action to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDescriptor {
    LaunchPath {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    ToggleProcess {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    OpenUrl {
        url: String,
    },
    ShellCommand {
        commands: Vec<CommandStep>,
    },
    PowerShellCommand {
        commands: Vec<CommandStep>,
    },
    KeyboardShortcut {
        keys: String,
    },
    MediaControl {
        control: MediaKey,
    },
    VolumeAdjust {
        op: VolumeOp,
        #[serde(default = "default_volume_step")]
        amount: u8,
    },
    AudioDeviceSwitch {
        /// Target device name; cycles to the next device when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<String>,
    },
    /// Push-to-talk when bound to `on_tap`: recording starts on press and
    /// stops on release. Elsewhere each firing alternates start and stop.
    SpeechToText {
        #[serde(default = "default_language")]
        language: String,
    },
    TextToSpeech {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    WakeOnLan {
        mac: String,
        #[serde(default = "default_broadcast")]
        broadcast: String,
    },
    TvControl {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
}

impl ActionDescriptor {
    /// Kind name, as used for the `action` tag and backend keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LaunchPath { .. } => "launch_path",
            Self::ToggleProcess { .. } => "toggle_process",
            Self::OpenUrl { .. } => "open_url",
            Self::ShellCommand { .. } => "shell_command",
            Self::PowerShellCommand { .. } => "power_shell_command",
            Self::KeyboardShortcut { .. } => "keyboard_shortcut",
            Self::MediaControl { .. } => "media_control",
            Self::VolumeAdjust { .. } => "volume_adjust",
            Self::AudioDeviceSwitch { .. } => "audio_device_switch",
            Self::SpeechToText { .. } => "speech_to_text",
            Self::TextToSpeech { .. } => "text_to_speech",
            Self::WakeOnLan { .. } => "wake_on_lan",
            Self::TvControl { .. } => "tv_control",
        }
    }

    /// Whether a successful run is worth a toast. Media keys, device
    /// switches and dictation give their own feedback.
    pub fn announces_success(&self) -> bool {
        !matches!(
            self,
            Self::MediaControl { .. } | Self::AudioDeviceSwitch { .. } | Self::SpeechToText { .. }
        )
    }

    /// Language of a `speech_to_text` action, if this is one.
    pub fn dictation_language(&self) -> Option<&str> {
        match self {
            Self::SpeechToText { language } => Some(language),
            _ => None,
        }
    }

    /// Copy of this action with `{name}` placeholders in its string
    /// parameters replaced.
    #[must_use]
    pub fn with_placeholders(&self, vars: &[(&str, &str)]) -> Self {
        let fill = |s: &str| crate::action::template::fill(s, vars);
        let fill_steps = |steps: &[CommandStep]| {
            steps
                .iter()
                .map(|s| CommandStep {
                    command: fill(&s.command),
                    delay_ms: s.delay_ms,
                })
                .collect()
        };
        match self {
            Self::LaunchPath { path, args } => Self::LaunchPath {
                path: fill(path),
                args: args.iter().map(|a| fill(a)).collect(),
            },
            Self::ToggleProcess { path, args } => Self::ToggleProcess {
                path: fill(path),
                args: args.iter().map(|a| fill(a)).collect(),
            },
            Self::OpenUrl { url } => Self::OpenUrl { url: fill(url) },
            Self::ShellCommand { commands } => Self::ShellCommand {
                commands: fill_steps(commands),
            },
            Self::PowerShellCommand { commands } => Self::PowerShellCommand {
                commands: fill_steps(commands),
            },
            Self::TextToSpeech { text, language } => Self::TextToSpeech {
                text: fill(text),
                language: language.clone(),
            },
            Self::TvControl {
                command,
                value,
                host,
            } => Self::TvControl {
                command: fill(command),
                value: value.as_deref().map(|v| fill(v)),
                host: host.clone(),
            },
            other => other.clone(),
        }
    }
}

/// Action kind names accepted as `[backends]` keys.
pub const BACKEND_KINDS: [&str; 7] = [
    "keyboard_shortcut",
    "media_control",
    "volume_adjust",
    "audio_device_switch",
    "speech_to_text",
    "text_to_speech",
    "tv_control",
];

// --- Defaults ---

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_known_devices() -> Vec<String> {
    vec!["easypad".to_string(), "worlde".to_string()]
}

fn default_retry_backoff() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_pad_notes() -> Vec<u8> {
    (40..=51).collect()
}

fn default_slider_control() -> u8 {
    9
}

fn default_hold_threshold() -> u64 {
    500
}

fn default_debounce() -> u64 {
    50
}

fn default_slider_interval() -> u64 {
    100
}

fn default_action_timeout() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_volume_step() -> u8 {
    5
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_broadcast() -> String {
    "255.255.255.255".to_string()
}
