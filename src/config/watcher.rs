use crate::config::MappingStore;
use crate::error::PadError;
use crate::notification::Notifier;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch the store's backing file and hot-reload it on change. The device
/// session is untouched; the next pad event sees the new mappings.
///
/// # Errors
/// Returns `PadError::Watcher` if the file watcher cannot be initialized.
pub async fn watch_config(
    store: Arc<MappingStore>,
    notifier: Notifier,
    cancel: CancellationToken,
) -> crate::error::Result<()> {
    let Some(config_path) = store.path().map(Path::to_path_buf) else {
        debug!("configuration has no backing file, not watching");
        return Ok(());
    };

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel::<PathBuf>(16);

    let mut debouncer = new_debouncer(
        DEBOUNCE,
        move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
            match events {
                Ok(evts) => {
                    for evt in evts {
                        if evt.kind == DebouncedEventKind::Any {
                            let _ = notify_tx.blocking_send(evt.path);
                        }
                    }
                }
                Err(e) => {
                    warn!("file watcher error: {e}");
                }
            }
        },
    )
    .map_err(|e| PadError::Watcher(e.to_string()))?;

    // Saves replace the file by rename, so watch the directory holding it.
    let watch_dir = config_path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    debouncer
        .watcher()
        .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
        .map_err(|e| PadError::Watcher(e.to_string()))?;
    info!("watching config file: {}", config_path.display());

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("config watcher shutting down");
                return Ok(());
            }
            changed = notify_rx.recv() => {
                let Some(path) = changed else {
                    return Ok(());
                };
                if path.file_name() != config_path.file_name() {
                    continue;
                }
                info!("config file changed, reloading...");
                match store.reload() {
                    Ok(()) => notifier.info("configuration reloaded"),
                    Err(e) => {
                        notifier.warning(format!("config reload failed, keeping old config: {e}"));
                    }
                }
            }
        }
    }
}
