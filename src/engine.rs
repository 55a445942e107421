use crate::action::ActionExecutor;
use crate::config::MappingStore;
use crate::decoder::Decoder;
use crate::dispatch::Dispatcher;
use crate::event::{RawMessage, Tick};
use crate::notification::Notifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Single consumer of device messages and timer ticks.
///
/// Every input is handled against a fresh configuration snapshot, so a
/// mapping replaced through the store takes effect on the next event.
pub struct Engine {
    store: Arc<MappingStore>,
    decoder: Decoder,
    dispatcher: Dispatcher,
}

impl Engine {
    /// `ticks` must be the sending half of the channel whose receiver feeds
    /// [`Engine::on_tick`].
    pub fn new(
        store: Arc<MappingStore>,
        executor: Arc<dyn ActionExecutor>,
        notifier: Notifier,
        ticks: mpsc::UnboundedSender<Tick>,
    ) -> Self {
        Self {
            store,
            decoder: Decoder::new(ticks.clone()),
            dispatcher: Dispatcher::new(executor, notifier, ticks),
        }
    }

    pub fn on_message(&mut self, raw: RawMessage) {
        let config = self.store.current();
        if let Some(event) = self.decoder.decode(&raw, &config) {
            self.dispatcher.handle(event, &config);
        }
    }

    pub fn on_tick(&mut self, tick: Tick) {
        let config = self.store.current();
        match tick {
            Tick::Hold { pad, seq } => {
                if let Some(event) = self.decoder.hold_elapsed(pad, seq) {
                    self.dispatcher.handle(event, &config);
                }
            }
            Tick::SliderFlush { seq } => self.dispatcher.flush_slider(seq, &config),
        }
    }

    /// Drop timers and runtime state after the device went away.
    pub fn reset(&mut self) {
        debug!("engine reset");
        self.decoder.reset();
        self.dispatcher.reset();
    }

    pub async fn shutdown(mut self) {
        self.decoder.reset();
        self.dispatcher.shutdown().await;
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::recording::RecordingExecutor;
    use crate::config::schema::{ActionDescriptor, ButtonMapping, Configuration};
    use crate::event::ButtonId;
    use crate::notification::Level;
    use crate::state::PadPhase;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Rig {
        engine: Engine,
        store: Arc<MappingStore>,
        exec: RecordingExecutor,
        notifier: Notifier,
        ticks: mpsc::UnboundedReceiver<Tick>,
    }

    impl Rig {
        fn new(config: Configuration) -> Self {
            let store = Arc::new(MappingStore::new(config).unwrap());
            let exec = RecordingExecutor::new();
            let notifier = Notifier::new();
            let (tx, ticks) = mpsc::unbounded_channel();
            let engine = Engine::new(
                Arc::clone(&store),
                Arc::new(exec.clone()),
                notifier.clone(),
                tx,
            );
            Self {
                engine,
                store,
                exec,
                notifier,
                ticks,
            }
        }

        fn send(&mut self, bytes: &[u8]) {
            let raw = RawMessage::from_bytes(bytes, Instant::now()).unwrap();
            self.engine.on_message(raw);
        }

        fn press(&mut self, note: u8) {
            self.send(&[0x90, note, 100]);
        }

        fn release(&mut self, note: u8) {
            self.send(&[0x80, note, 0]);
        }

        /// Let timers fire and feed their ticks back in.
        async fn run_for(&mut self, ms: u64) {
            let step = Duration::from_millis(1);
            for _ in 0..ms {
                tokio::time::advance(step).await;
                settle().await;
                while let Ok(tick) = self.ticks.try_recv() {
                    self.engine.on_tick(tick);
                }
            }
            settle().await;
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn pad(n: u8) -> ButtonId {
        ButtonId::new(n).unwrap()
    }

    /// Pad 3 (note 42): tap launches notepad, hold saves.
    fn notepad_config() -> Configuration {
        let mut mapping = ButtonMapping::new(pad(3));
        mapping.on_tap = Some(ActionDescriptor::LaunchPath {
            path: "notepad".to_string(),
            args: vec![],
        });
        mapping.on_hold = Some(ActionDescriptor::KeyboardShortcut {
            keys: "ctrl+s".to_string(),
        });
        let mut config = Configuration::default();
        config.dispatch.hold_threshold_ms = 500;
        config.buttons.push(mapping);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn short_press_taps() {
        let mut rig = Rig::new(notepad_config());
        rig.press(42);
        rig.run_for(200).await;
        rig.release(42);
        rig.run_for(1_000).await;

        assert_eq!(rig.exec.calls_of("launch_path").len(), 1);
        assert!(rig.exec.calls_of("keyboard_shortcut").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_holds_at_threshold() {
        let mut rig = Rig::new(notepad_config());
        let t0 = Instant::now();
        rig.press(42);
        rig.run_for(700).await;
        rig.release(42);
        rig.run_for(100).await;

        assert!(rig.exec.calls_of("launch_path").is_empty());
        let holds = rig.exec.calls_of("keyboard_shortcut");
        assert_eq!(holds.len(), 1);
        assert_eq!(holds[0].detail, "ctrl+s");
        assert_eq!(holds[0].at - t0, Duration::from_millis(500));
        assert_eq!(rig.engine.dispatcher().state(pad(3)).phase, PadPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_then_hold_sequences() {
        let mut rig = Rig::new(notepad_config());
        for _ in 0..3 {
            rig.press(42);
            rig.run_for(100).await;
            rig.release(42);
            rig.run_for(100).await;
        }
        rig.press(42);
        rig.run_for(600).await;
        rig.release(42);
        rig.run_for(10).await;

        assert_eq!(rig.exec.calls_of("launch_path").len(), 3);
        assert_eq!(rig.exec.calls_of("keyboard_shortcut").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bouncing_contact_taps_once() {
        let mut rig = Rig::new(notepad_config());
        rig.press(42);
        rig.run_for(5).await;
        rig.release(42);
        rig.run_for(10).await;
        rig.press(42);
        rig.run_for(5).await;
        rig.release(42);
        rig.run_for(100).await;

        assert_eq!(rig.exec.calls_of("launch_path").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slider_burst_is_coalesced() {
        let mut rig = Rig::new(Configuration::default());
        for v in [10, 20, 21, 22, 90] {
            rig.send(&[0xB0, 9, v]);
            rig.run_for(5).await;
        }
        rig.run_for(200).await;

        let calls = rig.exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to_string(), "volume_adjust(set 70)");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_pending_hold() {
        let mut rig = Rig::new(notepad_config());
        rig.press(42);
        rig.run_for(300).await;
        rig.engine.reset();
        rig.run_for(500).await;
        rig.release(42);
        rig.run_for(10).await;

        assert!(rig.exec.calls().is_empty());
        assert_eq!(rig.engine.dispatcher().state(pad(3)).phase, PadPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_mapping_applies_to_next_press() {
        let mut rig = Rig::new(notepad_config());
        rig.press(42);
        rig.release(42);
        rig.run_for(100).await;

        rig.store
            .update(|config| {
                config.buttons[0].on_tap = Some(ActionDescriptor::OpenUrl {
                    url: "example.com".to_string(),
                });
            })
            .unwrap();

        rig.press(42);
        rig.release(42);
        rig.run_for(10).await;

        let calls: Vec<String> = rig.exec.calls().iter().map(ToString::to_string).collect();
        assert_eq!(calls, ["launch_path(notepad)", "open_url(example.com)"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_action_keeps_engine_running() {
        let mut rig = Rig::new(notepad_config());
        let mut notes = rig.notifier.subscribe();
        rig.exec.fail("launch_path");

        rig.press(42);
        rig.release(42);
        rig.run_for(100).await;
        rig.press(42);
        rig.release(42);
        rig.run_for(10).await;

        assert_eq!(rig.exec.calls_of("launch_path").len(), 2);
        let errors = std::iter::from_fn(|| notes.try_recv().ok())
            .filter(|n| n.level == Level::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_pad_is_silent() {
        let mut rig = Rig::new(notepad_config());
        rig.press(40);
        rig.run_for(700).await;
        rig.release(40);
        rig.run_for(10).await;
        assert!(rig.exec.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_completes() {
        let mut rig = Rig::new(notepad_config());
        rig.exec.delay(Duration::from_secs(1));
        rig.press(42);
        rig.release(42);
        rig.engine.shutdown().await;
    }
}
