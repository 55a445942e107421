use tokio::task::JoinHandle;

/// Trailing-edge coalescing for slider positions.
///
/// The first value after a quiet period asks the caller to schedule a flush;
/// later values only overwrite the pending one. The flush hands out the
/// latest value, so at most one value leaves the gate per interval.
#[derive(Debug, Default)]
pub struct SliderGate {
    pending: Option<u8>,
    armed: Option<u64>,
    next_seq: u64,
    timer: Option<JoinHandle<()>>,
}

impl SliderGate {
    /// Record `value`. Returns the sequence number of a flush the caller must
    /// schedule, or `None` if one is already pending.
    pub fn offer(&mut self, value: u8) -> Option<u64> {
        self.pending = Some(value);
        if self.armed.is_some() {
            return None;
        }
        self.next_seq += 1;
        self.armed = Some(self.next_seq);
        self.armed
    }

    /// Keep the handle of the scheduled flush so a reset can abort it.
    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    /// Take the latest value if `seq` is the flush currently armed.
    pub fn flush(&mut self, seq: u64) -> Option<u8> {
        if self.armed != Some(seq) {
            return None;
        }
        self.armed = None;
        self.timer = None;
        self.pending.take()
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.armed = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_to_latest() {
        let mut gate = SliderGate::default();
        let seq = gate.offer(10).unwrap();
        for v in [20, 21, 22, 90] {
            assert_eq!(gate.offer(v), None);
        }
        assert_eq!(gate.flush(seq), Some(90));
        assert_eq!(gate.flush(seq), None);
    }

    #[test]
    fn next_burst_arms_again() {
        let mut gate = SliderGate::default();
        let first = gate.offer(1).unwrap();
        assert_eq!(gate.flush(first), Some(1));
        let second = gate.offer(2).unwrap();
        assert_ne!(first, second);
        assert_eq!(gate.flush(first), None);
        assert_eq!(gate.flush(second), Some(2));
    }

    #[test]
    fn reset_drops_pending() {
        let mut gate = SliderGate::default();
        let seq = gate.offer(64).unwrap();
        gate.reset();
        assert_eq!(gate.flush(seq), None);
        assert!(gate.offer(65).is_some());
    }
}
