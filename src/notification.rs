use serde::Serialize;
use std::io::Write;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// A user-facing message for the toast layer and the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

/// Fan-out of [`Notification`]s. Emitting never blocks: with no subscriber
/// the message only reaches the log, and slow subscribers lag.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.emit(Level::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.emit(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.emit(Level::Error, message);
    }

    fn emit(&self, level: Level, message: String) {
        let _ = self.tx.send(Notification { level, message });
    }
}

/// Print notifications as JSON lines on stdout until cancelled, for a UI
/// process reading our output.
pub async fn print_json_lines(
    mut rx: broadcast::Receiver<Notification>,
    cancel: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            () = cancel.cancelled() => return,
            received = rx.recv() => match received {
                Ok(n) => n,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("notification sink lagged, missed {n} messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        };

        match serde_json::to_string(&notification) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{line}");
                let _ = stdout.flush();
            }
            Err(e) => warn!("failed to encode notification: {e}"),
        }
    }
}
