use crate::action::system::SystemExecutor;
use crate::action::ActionExecutor;
use crate::config::watcher;
use crate::config::MappingStore;
use crate::control::{self, Command};
use crate::device::{self, DeviceSession, SessionState};
use crate::engine::Engine;
use crate::error::{ErrorKind, Result};
use crate::event::SessionEvent;
use crate::notification::{self, Notifier};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

type EventStream = BoxStream<'static, SessionEvent>;

/// Startup options from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Port selector overriding `device.port`.
    pub device: Option<String>,
    /// Print notifications as JSON lines on stdout.
    pub events_json: bool,
}

/// Run the easypad daemon until SIGINT or a `quit` command.
///
/// # Errors
/// Returns `PadError::Io` if the control thread cannot be started.
pub async fn run(store: Arc<MappingStore>, options: Options) -> Result<()> {
    let cancel = CancellationToken::new();
    let notifier = Notifier::new();

    let sink_handle = options
        .events_json
        .then(|| spawn_notification_sink(&notifier, &cancel));
    let watcher_handle = spawn_config_watcher(&store, &notifier, &cancel);

    let (control_tx, mut control_rx) = mpsc::channel(CHANNEL_CAPACITY);
    control::spawn_stdin_reader(control_tx)?;

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    let executor: Arc<dyn ActionExecutor> = Arc::new(SystemExecutor::new(Arc::clone(&store)));
    let mut engine = Engine::new(Arc::clone(&store), executor, notifier.clone(), tick_tx);
    let mut session = DeviceSession::new(Arc::clone(&store));

    let mut events = until_cancelled(
        &cancel,
        connect(&mut session, options.device.as_deref(), &notifier),
    )
    .await
    .flatten();

    info!("easypad running, {} pads mapped", store.current().buttons.len());

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = interrupted() => {
                info!("received SIGINT, shutting down");
                break;
            }
            Some(tick) = tick_rx.recv() => engine.on_tick(tick),
            event = next_event(&mut events) => {
                on_session_event(event, &mut engine, &mut session, &mut events, &notifier);
            }
            Some(command) = control_rx.recv() => {
                let quit = handle_command(
                    command, &store, &mut engine, &mut session, &mut events, &notifier, &options, &cancel,
                )
                .await;
                if quit {
                    break;
                }
            }
        }
    }

    info!("daemon shutting down...");
    cancel.cancel();
    session.disconnect();
    engine.shutdown().await;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = watcher_handle.await;
        if let Some(handle) = sink_handle {
            let _ = handle.await;
        }
    })
    .await;

    info!("daemon stopped");
    Ok(())
}

async fn connect(
    session: &mut DeviceSession,
    selector: Option<&str>,
    notifier: &Notifier,
) -> Option<EventStream> {
    match session.auto_connect(selector).await {
        Ok(handle) => notifier.info(format!("Connected to {}", handle.port_name())),
        Err(e) if e.kind() == ErrorKind::DeviceBusy => {
            notifier.error(e.to_string());
            return None;
        }
        Err(e) => {
            notifier.warning(e.to_string());
            return None;
        }
    }
    session.events()
}

/// Resolves on SIGINT. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for SIGINT: {e}");
        std::future::pending::<()>().await;
    }
}

/// Run `work` unless the daemon is cancelled or interrupted first. SIGINT
/// cancels the daemon.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl std::future::Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        () = cancel.cancelled() => None,
        () = interrupted() => {
            info!("received SIGINT, shutting down");
            cancel.cancel();
            None
        }
        value = work => Some(value),
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<SessionEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn on_session_event(
    event: Option<SessionEvent>,
    engine: &mut Engine,
    session: &mut DeviceSession,
    events: &mut Option<EventStream>,
    notifier: &Notifier,
) {
    match event {
        Some(SessionEvent::Message(raw)) => engine.on_message(raw),
        Some(SessionEvent::Disconnected(reason)) => {
            lost_device(engine, session, events, notifier, &reason);
        }
        None => lost_device(engine, session, events, notifier, "event stream ended"),
    }
}

fn lost_device(
    engine: &mut Engine,
    session: &mut DeviceSession,
    events: &mut Option<EventStream>,
    notifier: &Notifier,
    reason: &str,
) {
    engine.reset();
    session.mark_disconnected();
    *events = None;
    notifier.warning(format!("Device disconnected: {reason}. Send `connect` to reconnect."));
}

/// Handle one control command. Returns `true` if the daemon should stop.
#[allow(clippy::too_many_arguments)]
async fn handle_command(
    command: Command,
    store: &MappingStore,
    engine: &mut Engine,
    session: &mut DeviceSession,
    events: &mut Option<EventStream>,
    notifier: &Notifier,
    options: &Options,
    cancel: &CancellationToken,
) -> bool {
    match command {
        Command::List => match tokio::task::spawn_blocking(device::enumerate).await {
            Ok(Ok(names)) if names.is_empty() => notifier.info("No MIDI inputs found"),
            Ok(Ok(names)) => {
                let listing: Vec<String> = names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| format!("{i}: {name}"))
                    .collect();
                notifier.info(format!("MIDI inputs: {}", listing.join(", ")));
            }
            Ok(Err(e)) => notifier.error(e.to_string()),
            Err(e) => error!("enumeration task failed: {e}"),
        },

        Command::Connect(selector) => {
            engine.reset();
            *events = None;
            let selector = selector.or_else(|| options.device.clone());
            match until_cancelled(cancel, connect(session, selector.as_deref(), notifier)).await {
                Some(connected) => *events = connected,
                None => return true,
            }
        }

        Command::Disconnect => {
            engine.reset();
            *events = None;
            session.disconnect();
            notifier.info("Disconnected");
        }

        Command::Status => {
            let device = match (session.state(), session.handle()) {
                (SessionState::Connected, Some(handle)) => format!("connected to {}", handle.port_name()),
                (state, _) => format!("{state:?}").to_lowercase(),
            };
            let config = store.current();
            notifier.info(format!(
                "Device {device}; {} mappings; {} actions running",
                config.buttons.len(),
                engine.dispatcher().in_flight()
            ));
        }

        Command::Reload => match store.reload() {
            Ok(()) => notifier.info("Configuration reloaded"),
            Err(e) => notifier.warning(format!("Reload failed, keeping current configuration: {e}")),
        },

        Command::Save => match store.save() {
            Ok(()) => notifier.info("Configuration saved"),
            Err(e) => notifier.error(format!("Save failed: {e}")),
        },

        Command::Quit => {
            info!("quit requested");
            return true;
        }
    }
    false
}

fn spawn_notification_sink(
    notifier: &Notifier,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(notification::print_json_lines(
        notifier.subscribe(),
        cancel.clone(),
    ))
}

fn spawn_config_watcher(
    store: &Arc<MappingStore>,
    notifier: &Notifier,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let watcher_store = Arc::clone(store);
    let watcher_notifier = notifier.clone();
    let watcher_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) =
            watcher::watch_config(watcher_store, watcher_notifier, watcher_cancel).await
        {
            warn!("config watcher error: {e}");
        }
    })
}
