//! Cache of recently sent frames for firmware resend requests.

/// One cached frame, remembered under the line number it was sent with.
#[derive(Debug, Clone)]
struct CachedFrame {
    line: u64,
    frame: Vec<u8>,
}

/// Bounded mapping from line number to previously formatted frame bytes.
///
/// Slots are keyed by `line % capacity` and overwritten cyclically as the
/// line counter advances, so the cache always holds the most recent frame
/// for each slot. Lookups compare the stored line number: a slot recycled
/// for a newer line no longer satisfies requests for the old one. A
/// capacity of zero disables caching entirely.
#[derive(Debug)]
pub struct SentCache {
    slots: Vec<Option<CachedFrame>>,
}

impl SentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Remember `frame` as the bytes sent under `line`.
    pub fn insert(&mut self, line: u64, frame: Vec<u8>) {
        if self.slots.is_empty() {
            return;
        }
        let slot = (line % self.slots.len() as u64) as usize;
        self.slots[slot] = Some(CachedFrame { line, frame });
    }

    /// The frame previously sent under `line`, if still cached.
    pub fn lookup(&self, line: u64) -> Option<&[u8]> {
        let slot = (line % self.slots.len().max(1) as u64) as usize;
        match self.slots.get(slot) {
            Some(Some(cached)) if cached.line == line => Some(&cached.frame),
            _ => None,
        }
    }

    /// Number of frames the cache can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
