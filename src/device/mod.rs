pub mod input;
pub mod lock;

use crate::config::schema::DeviceConfig;
use crate::config::MappingStore;
use crate::error::{PadError, Result};
use crate::event::SessionEvent;
use futures::stream::{self, BoxStream, StreamExt};
use lock::DeviceLock;
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CLIENT_NAME: &str = "easypad";

/// Names of the MIDI input ports currently present.
///
/// # Errors
/// Returns `PadError::Midi` if the MIDI subsystem is unavailable.
pub fn enumerate() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| PadError::Midi(e.to_string()))?;
    Ok(port_names(&midi_in))
}

fn port_names(midi_in: &MidiInput) -> Vec<String> {
    midi_in
        .ports()
        .iter()
        .map(|port| {
            midi_in
                .port_name(port)
                .unwrap_or_else(|_| "<unnamed>".to_string())
        })
        .collect()
}

/// Choose a port. A selector is either a port index or a case-insensitive
/// name fragment; without one, the first port whose name contains any of
/// the `known` fragments wins.
pub fn select_port(names: &[String], selector: Option<&str>, known: &[String]) -> Option<usize> {
    let selector = selector.map(str::trim).filter(|s| !s.is_empty());
    if let Some(selector) = selector {
        if let Ok(index) = selector.parse::<usize>() {
            return (index < names.len()).then_some(index);
        }
        let needle = selector.to_lowercase();
        return names
            .iter()
            .position(|name| name.to_lowercase().contains(&needle));
    }

    let known: Vec<String> = known.iter().map(|k| k.to_lowercase()).collect();
    names.iter().position(|name| {
        let name = name.to_lowercase();
        known.iter().any(|k| !k.is_empty() && name.contains(k.as_str()))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An open port: the driver connection, the cross-process lock and the
/// watchdog. Dropping it closes the port and releases the lock.
pub struct DeviceHandle {
    port_name: String,
    connection: Option<MidiInputConnection<()>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    watchdog: JoinHandle<()>,
    lock: DeviceLock,
}

impl DeviceHandle {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.watchdog.abort();
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
        debug!("released {}", self.lock.path().display());
    }
}

/// Lifecycle of the connection to one pad controller.
pub struct DeviceSession {
    store: Arc<MappingStore>,
    state: SessionState,
    handle: Option<DeviceHandle>,
}

impl DeviceSession {
    /// Device settings are read from `store` on every connect.
    pub fn new(store: Arc<MappingStore>) -> Self {
        Self {
            store,
            state: SessionState::Disconnected,
            handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    /// Open the port picked by `selector`, falling back to the configured
    /// port and then to the known device names. An open session is closed
    /// first.
    ///
    /// # Errors
    /// `DeviceNotFound` when no port matches, `DeviceBusy` when another
    /// process holds the port, `Midi` when the MIDI subsystem is unavailable.
    pub fn connect(&mut self, selector: Option<&str>) -> Result<&DeviceHandle> {
        self.close();
        self.state = SessionState::Connecting;
        let config = self.store.current();
        match open_port(&config.device, selector) {
            Ok(handle) => {
                info!("connected to '{}'", handle.port_name);
                self.state = SessionState::Connected;
                Ok(self.handle.insert(handle))
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Connect, retrying exactly once after the configured backoff if no
    /// device was found. Other failures are returned immediately.
    ///
    /// # Errors
    /// See [`DeviceSession::connect`].
    pub async fn auto_connect(&mut self, selector: Option<&str>) -> Result<&DeviceHandle> {
        let first = self.connect(selector).map(|_| ());
        match first {
            Ok(()) => {}
            Err(PadError::DeviceNotFound(reason)) => {
                let backoff = Duration::from_millis(self.store.current().device.retry_backoff_ms);
                info!("{reason}; retrying in {}ms", backoff.as_millis());
                tokio::time::sleep(backoff).await;
                self.connect(selector)?;
            }
            Err(e) => return Err(e),
        }
        self.handle
            .as_ref()
            .ok_or_else(|| PadError::DeviceDisconnected("session closed while connecting".to_string()))
    }

    /// Take the event stream of the open session. Returns `None` when not
    /// connected or when the stream was already taken. The stream ends once
    /// the session is closed.
    pub fn events(&mut self) -> Option<BoxStream<'static, SessionEvent>> {
        let rx = self.handle.as_mut()?.events.take()?;
        Some(event_stream(rx))
    }

    /// Close the port on request.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.as_ref() {
            info!("disconnecting from '{}'", handle.port_name);
        }
        self.close();
    }

    /// Record that the consumer saw the device go away.
    pub fn mark_disconnected(&mut self) {
        if let Some(handle) = self.handle.as_ref() {
            warn!("lost '{}'", handle.port_name);
        }
        self.close();
    }

    fn close(&mut self) {
        self.handle = None;
        self.state = SessionState::Disconnected;
    }
}

/// Stream over a session's event channel. It ends when every sender is
/// gone: the driver callback and the watchdog.
pub fn event_stream(rx: mpsc::UnboundedReceiver<SessionEvent>) -> BoxStream<'static, SessionEvent> {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .boxed()
}

fn lock_dir(config: &DeviceConfig) -> PathBuf {
    config
        .lock_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(CLIENT_NAME))
}

fn open_port(config: &DeviceConfig, selector: Option<&str>) -> Result<DeviceHandle> {
    let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| PadError::Midi(e.to_string()))?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    let names = port_names(&midi_in);
    let selector = selector.or(config.port.as_deref());
    let index = select_port(&names, selector, &config.known_devices).ok_or_else(|| {
        let wanted = selector.map_or_else(
            || format!("any of {:?}", config.known_devices),
            |s| format!("'{s}'"),
        );
        PadError::DeviceNotFound(format!("{wanted} among {} ports {names:?}", names.len()))
    })?;
    let port_name = names[index].clone();

    let lock = DeviceLock::acquire(&lock_dir(config), &port_name)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let connection = input::open(midi_in, &ports[index], &port_name, tx.clone())?;
    let watchdog = input::spawn_watchdog(
        port_name.clone(),
        Duration::from_millis(config.poll_interval_ms),
        Arc::new(enumerate),
        tx,
    );

    Ok(DeviceHandle {
        port_name,
        connection: Some(connection),
        events: Some(rx),
        watchdog,
        lock,
    })
}
