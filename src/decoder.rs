use crate::config::schema::{Configuration, PadLayout};
use crate::event::{ButtonId, LogicalEvent, RawMessage, Tick, PAD_COUNT};
use crate::timer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

/// Map a raw message to a logical event using `layout`. Stateless.
pub fn classify(layout: &PadLayout, raw: &RawMessage) -> Option<LogicalEvent> {
    if layout.channel.is_some_and(|ch| ch != raw.channel()) {
        return None;
    }

    match raw.kind() {
        NOTE_ON if raw.data2 > 0 => {
            pad_at(&layout.pad_notes, raw.data1).map(|p| LogicalEvent::Pressed(p, raw.received))
        }
        NOTE_ON | NOTE_OFF => {
            pad_at(&layout.pad_notes, raw.data1).map(|p| LogicalEvent::Released(p, raw.received))
        }
        CONTROL_CHANGE if raw.data1 == layout.slider_control => {
            Some(LogicalEvent::SliderMoved(raw.data2, raw.received))
        }
        CONTROL_CHANGE => pad_at(&layout.pad_controls, raw.data1).map(|p| {
            if raw.data2 > 0 {
                LogicalEvent::Pressed(p, raw.received)
            } else {
                LogicalEvent::Released(p, raw.received)
            }
        }),
        _ => None,
    }
}

fn pad_at(numbers: &[u8], n: u8) -> Option<ButtonId> {
    numbers
        .iter()
        .position(|&x| x == n)
        .and_then(ButtonId::from_index)
}

struct HoldTimer {
    seq: u64,
    task: JoinHandle<()>,
}

/// Turns raw messages into [`LogicalEvent`]s and owns the per-pad hold
/// timers. Expired timers come back as [`Tick::Hold`] through the engine loop.
pub struct Decoder {
    timers: [Option<HoldTimer>; PAD_COUNT],
    next_seq: u64,
    ticks: mpsc::UnboundedSender<Tick>,
}

impl Decoder {
    pub fn new(ticks: mpsc::UnboundedSender<Tick>) -> Self {
        Self {
            timers: std::array::from_fn(|_| None),
            next_seq: 0,
            ticks,
        }
    }

    /// Decode one message against the current configuration. A press arms
    /// the pad's hold timer unless one is already running; a release
    /// disarms it.
    pub fn decode(&mut self, raw: &RawMessage, config: &Configuration) -> Option<LogicalEvent> {
        let event = classify(&config.device.layout, raw);
        match event {
            Some(LogicalEvent::Pressed(pad, _)) => {
                let threshold = Duration::from_millis(config.dispatch.hold_threshold_ms);
                self.arm(pad, threshold);
            }
            Some(LogicalEvent::Released(pad, _)) => self.disarm(pad),
            Some(_) => {}
            None => trace!("ignored MIDI message {raw:?}"),
        }
        event
    }

    /// Resolve an expired hold timer. Returns the hold event only for the
    /// timer currently armed on `pad`, and at most once.
    pub fn hold_elapsed(&mut self, pad: ButtonId, seq: u64) -> Option<LogicalEvent> {
        let slot = &mut self.timers[pad.index()];
        if slot.as_ref().is_some_and(|t| t.seq == seq) {
            *slot = None;
            debug!("{pad} held past threshold");
            Some(LogicalEvent::HeldThresholdReached(pad))
        } else {
            trace!("stale hold timer for {pad} (seq {seq})");
            None
        }
    }

    /// Drop every pending hold timer without firing.
    pub fn reset(&mut self) {
        for pad in ButtonId::all() {
            self.disarm(pad);
        }
    }

    pub fn armed(&self, pad: ButtonId) -> bool {
        self.timers[pad.index()].is_some()
    }

    fn arm(&mut self, pad: ButtonId, threshold: Duration) {
        let slot = &mut self.timers[pad.index()];
        if slot.is_some() {
            return;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        let task = timer::schedule(&self.ticks, threshold, Tick::Hold { pad, seq });
        *slot = Some(HoldTimer { seq, task });
    }

    fn disarm(&mut self, pad: ButtonId) {
        if let Some(timer) = self.timers[pad.index()].take() {
            timer.task.abort();
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn raw(bytes: &[u8]) -> RawMessage {
        RawMessage::from_bytes(bytes, Instant::now()).unwrap()
    }

    fn pad(n: u8) -> ButtonId {
        ButtonId::new(n).unwrap()
    }

    #[test]
    fn classify_notes() {
        let layout = PadLayout::default();
        assert!(matches!(
            classify(&layout, &raw(&[0x90, 40, 100])),
            Some(LogicalEvent::Pressed(p, _)) if p == pad(1)
        ));
        assert!(matches!(
            classify(&layout, &raw(&[0x80, 51, 64])),
            Some(LogicalEvent::Released(p, _)) if p == pad(12)
        ));
        // Note-on with zero velocity is a release.
        assert!(matches!(
            classify(&layout, &raw(&[0x95, 42, 0])),
            Some(LogicalEvent::Released(p, _)) if p == pad(3)
        ));
        assert_eq!(classify(&layout, &raw(&[0x90, 60, 100])), None);
        assert_eq!(classify(&layout, &raw(&[0xE0, 0, 64])), None);
    }

    #[test]
    fn classify_controls() {
        let mut layout = PadLayout::default();
        layout.pad_controls = (20..32).collect();

        assert!(matches!(
            classify(&layout, &raw(&[0xB0, 9, 127])),
            Some(LogicalEvent::SliderMoved(127, _))
        ));
        assert!(matches!(
            classify(&layout, &raw(&[0xB0, 9, 0])),
            Some(LogicalEvent::SliderMoved(0, _))
        ));
        assert!(matches!(
            classify(&layout, &raw(&[0xB0, 21, 127])),
            Some(LogicalEvent::Pressed(p, _)) if p == pad(2)
        ));
        assert!(matches!(
            classify(&layout, &raw(&[0xB0, 21, 0])),
            Some(LogicalEvent::Released(p, _)) if p == pad(2)
        ));
        assert_eq!(classify(&layout, &raw(&[0xB0, 64, 127])), None);
    }

    #[test]
    fn classify_respects_channel_filter() {
        let mut layout = PadLayout::default();
        layout.channel = Some(1);
        assert_eq!(classify(&layout, &raw(&[0x90, 40, 100])), None);
        assert!(classify(&layout, &raw(&[0x91, 40, 100])).is_some());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hold_timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = Decoder::new(tx);
        let config = Configuration::default();

        decoder.decode(&raw(&[0x90, 42, 100]), &config);
        assert!(decoder.armed(pad(3)));

        tokio::time::advance(Duration::from_millis(499)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        let Tick::Hold { pad: p, seq } = rx.try_recv().unwrap() else {
            panic!("expected hold tick");
        };
        assert_eq!(p, pad(3));
        assert_eq!(
            decoder.hold_elapsed(p, seq),
            Some(LogicalEvent::HeldThresholdReached(pad(3)))
        );
        assert_eq!(decoder.hold_elapsed(p, seq), None);

        // Release after the hold still decodes.
        assert!(matches!(
            decoder.decode(&raw(&[0x80, 42, 0]), &config),
            Some(LogicalEvent::Released(..))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn release_disarms_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = Decoder::new(tx);
        let config = Configuration::default();

        decoder.decode(&raw(&[0x90, 40, 100]), &config);
        tokio::time::advance(Duration::from_millis(200)).await;
        decoder.decode(&raw(&[0x80, 40, 0]), &config);
        assert!(!decoder.armed(pad(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_press_keeps_first_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = Decoder::new(tx);
        let config = Configuration::default();

        decoder.decode(&raw(&[0x90, 40, 100]), &config);
        tokio::time::advance(Duration::from_millis(300)).await;
        decoder.decode(&raw(&[0x90, 40, 100]), &config);
        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert!(matches!(rx.try_recv(), Ok(Tick::Hold { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_pending_holds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = Decoder::new(tx);
        let config = Configuration::default();

        decoder.decode(&raw(&[0x90, 40, 100]), &config);
        decoder.decode(&raw(&[0x90, 41, 100]), &config);
        decoder.reset();
        assert!(!decoder.armed(pad(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(decoder.hold_elapsed(pad(1), 1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_follows_configuration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut decoder = Decoder::new(tx);
        let mut config = Configuration::default();
        config.dispatch.hold_threshold_ms = 800;

        decoder.decode(&raw(&[0x90, 40, 100]), &config);
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        assert!(rx.try_recv().is_ok());
    }
}
