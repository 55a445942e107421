pub mod slider;

use crate::action::{self, ActionExecutor};
use crate::config::schema::{
    ActionDescriptor, Configuration, SliderBehavior, TriggerMode, VolumeOp,
};
use crate::error::PadError;
use crate::event::{ButtonId, LogicalEvent, Tick};
use crate::notification::Notifier;
use crate::state::{ButtonRuntimeState, ButtonTable};
use crate::timer;
use slider::SliderGate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Scale a raw slider position (0-127) to a percentage.
pub fn slider_percent(value: u8) -> u8 {
    (u16::from(value.min(127)) * 100 / 127) as u8
}

/// A push-to-talk recording in progress, stopped when its pad is released.
struct Dictation {
    label: String,
    action: ActionDescriptor,
    timeout: Duration,
}

/// Resolves logical events into actions.
///
/// Owns the per-pad state machines, the toggle flags, open dictations and
/// the slider gate.
/// Actions run on their own tasks; their results come back as
/// notifications, never as errors to the caller.
pub struct Dispatcher {
    executor: Arc<dyn ActionExecutor>,
    notifier: Notifier,
    table: ButtonTable,
    slider: SliderGate,
    /// Last slider action; the next one waits for it so values apply in order.
    slider_task: Option<JoinHandle<()>>,
    dictating: HashMap<ButtonId, Dictation>,
    epoch: Arc<AtomicU64>,
    ticks: mpsc::UnboundedSender<Tick>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        notifier: Notifier,
        ticks: mpsc::UnboundedSender<Tick>,
    ) -> Self {
        Self {
            executor,
            notifier,
            table: ButtonTable::default(),
            slider: SliderGate::default(),
            slider_task: None,
            dictating: HashMap::new(),
            epoch: Arc::new(AtomicU64::new(0)),
            ticks,
            tracker: TaskTracker::new(),
        }
    }

    /// Apply one logical event against the configuration snapshot `config`.
    pub fn handle(&mut self, event: LogicalEvent, config: &Configuration) {
        match event {
            LogicalEvent::Pressed(pad, at) => {
                let debounce = Duration::from_millis(config.dispatch.debounce_ms);
                if self.table.get_mut(pad).press(at, debounce) {
                    debug!("{pad} pressed");
                    self.start_dictation(pad, config);
                }
            }
            LogicalEvent::Released(pad, _) => {
                let trigger = self.table.get_mut(pad).release();
                if let Some(dictation) = self.dictating.remove(&pad) {
                    debug!("{pad} released, ending dictation");
                    self.stop_dictation(dictation);
                    return;
                }
                if let Some(trigger) = trigger {
                    debug!("{pad} released ({trigger})");
                    self.fire(pad, trigger, config);
                }
            }
            LogicalEvent::HeldThresholdReached(pad) => {
                if self.dictating.contains_key(&pad) {
                    trace!("{pad} held while dictating");
                    return;
                }
                if let Some(trigger) = self.table.get_mut(pad).hold() {
                    self.fire(pad, trigger, config);
                }
            }
            LogicalEvent::SliderMoved(value, _) => {
                if config.slider == SliderBehavior::Off {
                    trace!("slider moved to {value}, slider is off");
                    return;
                }
                if let Some(seq) = self.slider.offer(value) {
                    let interval = Duration::from_millis(config.dispatch.slider_interval_ms);
                    let task = timer::schedule(&self.ticks, interval, Tick::SliderFlush { seq });
                    self.slider.set_timer(task);
                }
            }
        }
    }

    /// Forward the latest slider value if `seq` is the armed flush.
    pub fn flush_slider(&mut self, seq: u64, config: &Configuration) {
        let Some(value) = self.slider.flush(seq) else {
            trace!("stale slider flush (seq {seq})");
            return;
        };
        let percent = slider_percent(value);
        let timeout = Duration::from_millis(config.dispatch.action_timeout_ms);

        match &config.slider {
            SliderBehavior::Volume => {
                let action = ActionDescriptor::VolumeAdjust {
                    op: VolumeOp::Set,
                    amount: percent,
                };
                let message = format!("Volume set to {percent}%");
                self.spawn_slider(&action, Some(message), timeout);
            }
            SliderBehavior::Custom { action } => {
                let value = value.to_string();
                let pct = percent.to_string();
                let action = action.with_placeholders(&[("value", &value), ("percent", &pct)]);
                self.spawn_slider(&action, None, timeout);
            }
            SliderBehavior::Off => trace!("slider turned off before flush"),
        }
    }

    fn spawn_slider(
        &mut self,
        action: &ActionDescriptor,
        message: Option<String>,
        timeout: Duration,
    ) {
        let previous = self.slider_task.take();
        let task = self.spawn("slider".to_string(), action, true, message, timeout, previous);
        self.slider_task = Some(task);
    }

    /// Forget all runtime state after a disconnect. Results of actions still
    /// in flight are dropped. Open dictations are stopped.
    pub fn reset(&mut self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.table.reset();
        self.slider.reset();
        self.slider_task = None;
        let open: Vec<Dictation> = self.dictating.drain().map(|(_, d)| d).collect();
        for dictation in open {
            self.stop_dictation(dictation);
        }
        debug!("dispatcher reset, epoch {epoch}");
    }

    /// Stop accepting work and wait briefly for running actions.
    pub async fn shutdown(&mut self) {
        self.reset();
        self.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("{} actions still running at shutdown", self.tracker.len());
        }
    }

    pub fn state(&self, pad: ButtonId) -> &ButtonRuntimeState {
        self.table.get(pad)
    }

    /// Number of action tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Begin recording if `pad` is a push-to-talk `speech_to_text` pad.
    fn start_dictation(&mut self, pad: ButtonId, config: &Configuration) {
        let Some(mapping) = config.mapping_for(pad, TriggerMode::Tap) else {
            return;
        };
        let Some(action) = mapping.on_tap.as_ref() else {
            return;
        };
        if action.dictation_language().is_none() || !mapping.enabled {
            return;
        }
        let label = mapping.label();
        info!("{label}: dictation started");
        let timeout = Duration::from_millis(config.dispatch.action_timeout_ms);
        self.spawn(label.clone(), action, true, None, timeout, None);
        self.dictating.insert(
            pad,
            Dictation {
                label,
                action: action.clone(),
                timeout,
            },
        );
    }

    fn stop_dictation(&self, dictation: Dictation) {
        info!("{}: dictation stopped", dictation.label);
        self.spawn(
            dictation.label,
            &dictation.action,
            false,
            None,
            dictation.timeout,
            None,
        );
    }

    fn fire(&mut self, pad: ButtonId, trigger: TriggerMode, config: &Configuration) {
        let Some(mapping) = config.mapping_for(pad, trigger) else {
            debug!("{pad}: nothing mapped to {trigger}");
            return;
        };
        let label = mapping.label();
        if !mapping.enabled {
            self.notifier.info(format!("{label} is disabled"));
            return;
        }
        let Some(action) = mapping.action(trigger) else {
            return;
        };

        let toggle_on = match action {
            // Pressed after a reload made this a push-to-talk pad.
            ActionDescriptor::SpeechToText { .. } if trigger == TriggerMode::Tap => {
                debug!("{label}: dictation starts on press, ignoring release");
                return;
            }
            ActionDescriptor::ToggleProcess { .. } | ActionDescriptor::SpeechToText { .. } => {
                self.table.get_mut(pad).flip_toggle(trigger)
            }
            _ => true,
        };
        info!("{label}: {trigger} -> {}", action.kind());
        let timeout = Duration::from_millis(config.dispatch.action_timeout_ms);
        self.spawn(label, action, toggle_on, None, timeout, None);
    }

    /// Run `action` on the tracker. With `after` set, the action starts only
    /// once that task has finished.
    fn spawn(
        &self,
        label: String,
        action: &ActionDescriptor,
        toggle_on: bool,
        message: Option<String>,
        timeout: Duration,
        after: Option<JoinHandle<()>>,
    ) -> JoinHandle<()> {
        let kind = action.kind();
        let announce = action.announces_success();
        let future = action::invoke(self.executor.as_ref(), action, toggle_on);

        let started = self.epoch.load(Ordering::SeqCst);
        let epoch = Arc::clone(&self.epoch);
        let notifier = self.notifier.clone();

        self.tracker.spawn(async move {
            if let Some(previous) = after {
                let _ = previous.await;
            }
            let result = match tokio::time::timeout(timeout, future).await {
                Ok(result) => result,
                Err(_) => Err(PadError::ActionTimeout { kind, timeout }),
            };
            if epoch.load(Ordering::SeqCst) != started {
                debug!("{label}: dropping {kind} result from previous session");
                return;
            }
            match result {
                Ok(outcome) if announce => {
                    let text = message.unwrap_or_else(|| match outcome.detail {
                        Some(detail) => format!("{label}: {detail}"),
                        None => format!("{label}: {kind} done"),
                    });
                    notifier.info(text);
                }
                Ok(_) => debug!("{label}: {kind} done"),
                Err(e) => notifier.error(format!("{label}: {e}")),
            }
        })
    }
}
