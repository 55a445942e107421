use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Number of pads on the control surface.
pub const PAD_COUNT: usize = 12;

/// One of the twelve physical pads, numbered 1-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ButtonId(u8);

impl ButtonId {
    pub fn new(number: u8) -> Option<Self> {
        (1..=PAD_COUNT as u8).contains(&number).then_some(Self(number))
    }

    /// Zero-based position, for table lookups.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < PAD_COUNT).then(|| Self(index as u8 + 1))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (1..=PAD_COUNT as u8).map(Self)
    }
}

impl TryFrom<u8> for ButtonId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("pad {value} out of range (1-{PAD_COUNT})"))
    }
}

impl From<ButtonId> for u8 {
    fn from(id: ButtonId) -> Self {
        id.0
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pad {}", self.0)
    }
}

/// A channel voice message as received from the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub received: Instant,
}

impl RawMessage {
    /// Build from the bytes delivered by the MIDI driver. System messages
    /// (status 0xF0 and above) and empty packets are dropped; missing data
    /// bytes read as zero.
    pub fn from_bytes(bytes: &[u8], received: Instant) -> Option<Self> {
        let (&status, rest) = bytes.split_first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }
        Some(Self {
            status,
            data1: rest.first().copied().unwrap_or(0) & 0x7F,
            data2: rest.get(1).copied().unwrap_or(0) & 0x7F,
            received,
        })
    }

    pub fn kind(&self) -> u8 {
        self.status & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }
}

/// Decoded pad/slider input, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalEvent {
    Pressed(ButtonId, Instant),
    Released(ButtonId, Instant),
    HeldThresholdReached(ButtonId),
    /// Raw slider position, 0-127.
    SliderMoved(u8, Instant),
}

/// Items produced by an open device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(RawMessage),
    /// The port went away mid-session; the stream ends after this.
    Disconnected(String),
}

/// Timer expiries routed back into the engine loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Hold { pad: ButtonId, seq: u64 },
    SliderFlush { seq: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_id_range() {
        assert!(ButtonId::new(0).is_none());
        assert!(ButtonId::new(13).is_none());
        let pad = ButtonId::new(12).unwrap();
        assert_eq!(pad.index(), 11);
        assert_eq!(ButtonId::from_index(11), Some(pad));
        assert_eq!(ButtonId::all().count(), PAD_COUNT);
        assert_eq!(pad.to_string(), "pad 12");
    }

    #[test]
    fn raw_message_drops_system_bytes() {
        let now = Instant::now();
        assert!(RawMessage::from_bytes(&[], now).is_none());
        assert!(RawMessage::from_bytes(&[0xF8], now).is_none());
        assert!(RawMessage::from_bytes(&[0x40, 0x10], now).is_none());

        let msg = RawMessage::from_bytes(&[0x93, 40, 100], now).unwrap();
        assert_eq!(msg.kind(), 0x90);
        assert_eq!(msg.channel(), 3);
        assert_eq!((msg.data1, msg.data2), (40, 100));

        let short = RawMessage::from_bytes(&[0xC0, 5], now).unwrap();
        assert_eq!(short.data2, 0);
    }
}
