pub mod schema;
pub mod watcher;

use crate::error::{PadError, Result};
use crate::event::PAD_COUNT;
use arc_swap::ArcSwap;
use schema::{
    ActionDescriptor, CommandStep, Configuration, PadLayout, SliderBehavior, TriggerMode,
    VolumeOp, BACKEND_KINDS, CONFIG_VERSION,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Load and parse configuration from a TOML file.
///
/// # Errors
/// Returns `PadError::ConfigNotFound` if the file doesn't exist,
/// `PadError::Io` on read errors, `PadError::TomlParse` on syntax errors,
/// or `PadError::ConfigValidation` on validation failures.
pub fn load(path: &Path) -> Result<Configuration> {
    if !path.exists() {
        return Err(PadError::ConfigNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Configuration = toml::from_str(&content)?;

    validate(&config)?;
    Ok(config)
}

/// Write configuration as TOML. The file is replaced via rename so readers
/// (and the watcher) never see a half-written document.
///
/// # Errors
/// Returns `PadError::TomlSerialize` or `PadError::Io`.
pub fn save(path: &Path, config: &Configuration) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    debug!("wrote config to {}", path.display());
    Ok(())
}

/// Validate config constraints.
///
/// # Errors
/// Returns `PadError::ConfigValidation` describing the first violation.
pub fn validate(config: &Configuration) -> Result<()> {
    if config.version != CONFIG_VERSION {
        return Err(invalid(format!(
            "unsupported config version {} (expected {CONFIG_VERSION})",
            config.version
        )));
    }

    let dispatch = &config.dispatch;
    if dispatch.hold_threshold_ms == 0 {
        return Err(invalid("hold_threshold_ms must be positive"));
    }
    if dispatch.debounce_ms >= dispatch.hold_threshold_ms {
        return Err(invalid("debounce_ms must be shorter than hold_threshold_ms"));
    }
    if dispatch.slider_interval_ms == 0 {
        return Err(invalid("slider_interval_ms must be positive"));
    }
    if dispatch.action_timeout_ms == 0 {
        return Err(invalid("action_timeout_ms must be positive"));
    }
    if config.device.poll_interval_ms == 0 {
        return Err(invalid("device.poll_interval_ms must be positive"));
    }

    validate_layout(&config.device.layout)?;

    if let SliderBehavior::Custom { action } = &config.slider {
        validate_action(action).map_err(|e| invalid(format!("slider: {e}")))?;
    }

    for (kind, template) in &config.backends {
        if !BACKEND_KINDS.contains(&kind.as_str()) {
            return Err(invalid(format!("backends: unknown action kind '{kind}'")));
        }
        if template.trim().is_empty() {
            return Err(invalid(format!("backends: empty command for '{kind}'")));
        }
    }

    let mut bound = HashSet::new();
    for button in &config.buttons {
        for trigger in TriggerMode::ALL {
            let Some(action) = button.action(trigger) else {
                continue;
            };
            if !bound.insert((button.pad, trigger)) {
                return Err(invalid(format!(
                    "{}: {trigger} is mapped more than once",
                    button.pad
                )));
            }
            validate_action(action)
                .map_err(|e| invalid(format!("{} {trigger}: {e}", button.pad)))?;
        }
        let push_to_talk = button
            .on_tap
            .as_ref()
            .is_some_and(|a| a.dictation_language().is_some());
        if push_to_talk && (button.on_hold.is_some() || button.on_release.is_some()) {
            return Err(invalid(format!(
                "{}: a push-to-talk speech_to_text pad cannot also map on_hold or on_release",
                button.pad
            )));
        }
    }

    Ok(())
}

fn validate_layout(layout: &PadLayout) -> Result<()> {
    if let Some(channel) = layout.channel {
        if channel > 15 {
            return Err(invalid(format!("channel {channel} out of range (0-15)")));
        }
    }
    check_midi_numbers("pad_notes", &layout.pad_notes)?;
    if !layout.pad_controls.is_empty() {
        check_midi_numbers("pad_controls", &layout.pad_controls)?;
        if layout.pad_controls.contains(&layout.slider_control) {
            return Err(invalid(format!(
                "slider_control {} is also a pad control",
                layout.slider_control
            )));
        }
    }
    if layout.slider_control > 127 {
        return Err(invalid(format!(
            "slider_control {} out of range (0-127)",
            layout.slider_control
        )));
    }
    Ok(())
}

fn check_midi_numbers(field: &str, numbers: &[u8]) -> Result<()> {
    if numbers.len() != PAD_COUNT {
        return Err(invalid(format!(
            "{field} must list exactly {PAD_COUNT} numbers, got {}",
            numbers.len()
        )));
    }
    let mut seen = HashSet::new();
    for &n in numbers {
        if n > 127 {
            return Err(invalid(format!("{field}: {n} out of range (0-127)")));
        }
        if !seen.insert(n) {
            return Err(invalid(format!("{field}: {n} listed twice")));
        }
    }
    Ok(())
}

fn validate_action(action: &ActionDescriptor) -> std::result::Result<(), String> {
    fn required(field: &str, value: &str) -> std::result::Result<(), String> {
        if value.trim().is_empty() {
            Err(format!("{field} must not be empty"))
        } else {
            Ok(())
        }
    }

    fn steps(commands: &[CommandStep]) -> std::result::Result<(), String> {
        if commands.is_empty() {
            return Err("at least one command is required".to_string());
        }
        commands
            .iter()
            .try_for_each(|step| required("command", &step.command))
    }

    match action {
        ActionDescriptor::LaunchPath { path, .. } | ActionDescriptor::ToggleProcess { path, .. } => {
            required("path", path)
        }
        ActionDescriptor::OpenUrl { url } => required("url", url),
        ActionDescriptor::ShellCommand { commands }
        | ActionDescriptor::PowerShellCommand { commands } => steps(commands),
        ActionDescriptor::KeyboardShortcut { keys } => {
            required("keys", keys)?;
            if keys.split('+').any(|k| k.trim().is_empty()) {
                return Err(format!("malformed key combination '{keys}'"));
            }
            Ok(())
        }
        ActionDescriptor::MediaControl { .. } => Ok(()),
        ActionDescriptor::VolumeAdjust { op, amount } => match op {
            VolumeOp::Mute => Ok(()),
            VolumeOp::Set if *amount <= 100 => Ok(()),
            VolumeOp::Increase | VolumeOp::Decrease if (1..=100).contains(amount) => Ok(()),
            _ => Err(format!("volume amount {amount} out of range")),
        },
        ActionDescriptor::AudioDeviceSwitch { device } => match device {
            Some(name) => required("device", name),
            None => Ok(()),
        },
        ActionDescriptor::SpeechToText { language } => required("language", language),
        ActionDescriptor::TextToSpeech { text, .. } => required("text", text),
        ActionDescriptor::WakeOnLan { mac, broadcast } => {
            crate::action::wol::parse_mac(mac).map_err(|e| e.to_string())?;
            broadcast
                .parse::<std::net::Ipv4Addr>()
                .map(|_| ())
                .map_err(|_| format!("invalid broadcast address '{broadcast}'"))
        }
        ActionDescriptor::TvControl { command, .. } => required("command", command),
    }
}

fn invalid(message: impl Into<String>) -> PadError {
    PadError::ConfigValidation(message.into())
}

/// Owner of the live configuration.
///
/// Readers take an immutable snapshot with [`MappingStore::current`]; writers
/// validate a complete replacement and swap it in atomically. A rejected
/// replacement leaves the previous configuration in force.
pub struct MappingStore {
    current: ArcSwap<Configuration>,
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl MappingStore {
    /// In-memory store, not backed by a file.
    ///
    /// # Errors
    /// Returns `PadError::ConfigValidation` if `config` is invalid.
    pub fn new(config: Configuration) -> Result<Self> {
        validate(&config)?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            path: None,
            writer: Mutex::new(()),
        })
    }

    /// Store backed by the TOML file at `path`.
    ///
    /// # Errors
    /// See [`load`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = load(&path)?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            path: Some(path),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Validate and atomically install `config`.
    ///
    /// # Errors
    /// Returns `PadError::ConfigValidation`; the active configuration is kept.
    pub fn replace(&self, config: Configuration) -> Result<()> {
        let _guard = self.lock_writer();
        validate(&config)?;
        self.current.store(Arc::new(config));
        info!("configuration replaced");
        Ok(())
    }

    /// Read-modify-write: apply `edit` to a copy of the current configuration
    /// and install the result if it validates.
    ///
    /// # Errors
    /// Returns `PadError::ConfigValidation`; the active configuration is kept.
    pub fn update(&self, edit: impl FnOnce(&mut Configuration)) -> Result<()> {
        let _guard = self.lock_writer();
        let mut config = Configuration::clone(&self.current.load());
        edit(&mut config);
        validate(&config)?;
        self.current.store(Arc::new(config));
        info!("configuration updated");
        Ok(())
    }

    /// Persist the current configuration to the backing file.
    ///
    /// # Errors
    /// Returns `PadError::Io` when the store has no file, or on write errors.
    pub fn save(&self) -> Result<()> {
        let path = self.require_path()?;
        save(path, &self.current())
    }

    /// Re-read the backing file and install it if valid.
    ///
    /// # Errors
    /// See [`load`]; the active configuration is kept on error.
    pub fn reload(&self) -> Result<()> {
        let path = self.require_path()?;
        let config = load(path)?;
        self.replace(config)
    }

    fn require_path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            PadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "configuration is not backed by a file",
            ))
        })
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
