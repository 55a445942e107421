use std::path::PathBuf;
use std::time::Duration;

/// Central error type for easypad.
#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("MIDI device busy: {0} (close other applications using it)")]
    DeviceBusy(String),

    #[error("no matching MIDI device found: {0}")]
    DeviceNotFound(String),

    #[error("device disconnected: {0}")]
    DeviceDisconnected(String),

    #[error("config error: {0}")]
    ConfigValidation(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{kind} action failed: {detail}")]
    ActionExecution { kind: &'static str, detail: String },

    #[error("{kind} action timed out after {}ms", .timeout.as_millis())]
    ActionTimeout {
        kind: &'static str,
        timeout: Duration,
    },

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher error: {0}")]
    Watcher(String),
}

/// Coarse classification of [`PadError`], used by callers that react to the
/// category (reconnect prompt, keep old config) rather than the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceBusy,
    DeviceNotFound,
    DeviceDisconnected,
    ConfigValidation,
    ActionExecution,
    ActionTimeout,
    Midi,
    Io,
}

impl PadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceBusy(_) => ErrorKind::DeviceBusy,
            Self::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Self::DeviceDisconnected(_) => ErrorKind::DeviceDisconnected,
            Self::ConfigValidation(_) | Self::ConfigNotFound(_) | Self::TomlParse(_) => {
                ErrorKind::ConfigValidation
            }
            Self::ActionExecution { .. } => ErrorKind::ActionExecution,
            Self::ActionTimeout { .. } => ErrorKind::ActionTimeout,
            Self::Midi(_) => ErrorKind::Midi,
            Self::TomlSerialize(_) | Self::Io(_) | Self::Watcher(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn action(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::ActionExecution {
            kind,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_classify_as_config() {
        let err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        assert_eq!(PadError::from(err).kind(), ErrorKind::ConfigValidation);
    }

    #[test]
    fn timeout_message_reports_millis() {
        let err = PadError::ActionTimeout {
            kind: "shell_command",
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "shell_command action timed out after 1500ms");
        assert_eq!(err.kind(), ErrorKind::ActionTimeout);
    }
}
