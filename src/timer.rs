use crate::event::Tick;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Deliver `tick` to the engine loop `after` from now. Abort the handle to
/// cancel; a tick that loses the race is recognised as stale by its sequence
/// number.
pub fn schedule(tx: &mpsc::UnboundedSender<Tick>, after: Duration, tick: Tick) -> JoinHandle<()> {
    let deadline = Instant::now() + after;
    let tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let _ = tx.send(tick);
    })
}
