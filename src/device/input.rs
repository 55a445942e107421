use crate::error::{PadError, Result};
use crate::event::{RawMessage, SessionEvent};
use midir::{ConnectErrorKind, MidiInput, MidiInputConnection, MidiInputPort};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Open `port` and forward its channel messages to `tx`. The callback runs
/// on the driver's thread and only enqueues.
///
/// # Errors
/// `PadError::DeviceNotFound` if the port vanished before opening,
/// `PadError::DeviceBusy` if the driver refuses it.
pub fn open(
    midi_in: MidiInput,
    port: &MidiInputPort,
    name: &str,
    tx: mpsc::UnboundedSender<SessionEvent>,
) -> Result<MidiInputConnection<()>> {
    midi_in
        .connect(
            port,
            "easypad-in",
            move |_stamp, bytes, _| forward(bytes, &tx),
            (),
        )
        .map_err(|e| match e.kind() {
            ConnectErrorKind::InvalidPort => {
                PadError::DeviceNotFound(format!("'{name}' disappeared before it could be opened"))
            }
            ConnectErrorKind::Other(reason) => {
                PadError::DeviceBusy(format!("'{name}' could not be opened: {reason}"))
            }
        })
}

fn forward(bytes: &[u8], tx: &mpsc::UnboundedSender<SessionEvent>) {
    match RawMessage::from_bytes(bytes, Instant::now()) {
        Some(raw) => {
            trace!("midi in: {bytes:02X?}");
            let _ = tx.send(SessionEvent::Message(raw));
        }
        None => trace!("dropped midi bytes {bytes:02X?}"),
    }
}

/// Source of the current port names, called off the async threads.
pub type PortLister = Arc<dyn Fn() -> Result<Vec<String>> + Send + Sync>;

/// Poll `list` every `interval` and report `Disconnected` once `name` is no
/// longer listed. The task ends after reporting, dropping its sender.
pub fn spawn_watchdog(
    name: String,
    interval: Duration,
    list: PortLister,
    tx: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                return;
            }
            let lister = Arc::clone(&list);
            let names = match tokio::task::spawn_blocking(move || lister()).await {
                Ok(Ok(names)) => names,
                Ok(Err(e)) => {
                    warn!("port enumeration failed: {e}");
                    continue;
                }
                Err(e) => {
                    warn!("port enumeration task failed: {e}");
                    continue;
                }
            };
            if !names.iter().any(|n| *n == name) {
                debug!("'{name}' no longer listed");
                let _ = tx.send(SessionEvent::Disconnected(format!("'{name}' was unplugged")));
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_drops_system_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward(&[0xF8], &tx);
        forward(&[0x90, 42, 100], &tx);
        let Ok(SessionEvent::Message(raw)) = rx.try_recv() else {
            panic!("expected a message");
        };
        assert_eq!((raw.status, raw.data1, raw.data2), (0x90, 42, 100));
        assert!(rx.try_recv().is_err());
    }

    fn shared_lister(names: &Arc<std::sync::Mutex<Vec<String>>>) -> PortLister {
        let names = Arc::clone(names);
        Arc::new(move || -> Result<Vec<String>> { Ok(names.lock().unwrap().clone()) })
    }

    #[tokio::test]
    async fn watchdog_reports_unplug_once() {
        let names = Arc::new(std::sync::Mutex::new(vec![
            "Midi Through".to_string(),
            "WORLDE easypad".to_string(),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watchdog = spawn_watchdog(
            "WORLDE easypad".to_string(),
            Duration::from_millis(10),
            shared_lister(&names),
            tx,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        names.lock().unwrap().retain(|n| n != "WORLDE easypad");
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(SessionEvent::Disconnected(reason)) if reason.contains("unplugged")
        ));
        assert!(rx.recv().await.is_none());
        assert!(watchdog.await.is_ok());
    }

    #[tokio::test]
    async fn watchdog_survives_enumeration_errors() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lister: PortLister = Arc::new(move || {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                Err(PadError::Midi("backend restarting".to_string()))
            } else {
                Ok(Vec::new())
            }
        });
        spawn_watchdog("pad".to_string(), Duration::from_millis(10), lister, tx);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(SessionEvent::Disconnected(_))));
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 3);
    }
}
