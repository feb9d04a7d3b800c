use crate::frame::Frame;
use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Calendar day (local time) a frame is filed under
pub fn day_key(timestamp: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(timestamp).date_naive()
}

#[derive(Default)]
struct StoreInner {
    accepting: bool,
    days: BTreeMap<NaiveDate, Vec<Frame>>,
    seen: HashSet<u64>,
}

/// Frames captured while continuous shooting, grouped by capture day.
///
/// Appends are refused unless the store is open, and each frame id is kept
/// at most once.
#[derive(Default)]
pub struct BufferedFrameStore {
    inner: Mutex<StoreInner>,
}

impl BufferedFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting appends
    pub fn open(&self) {
        self.inner.lock().accepting = true;
        debug!("Frame store opened");
    }

    /// Refuse any further appends until reopened
    pub fn close(&self) {
        self.inner.lock().accepting = false;
        debug!("Frame store closed");
    }

    /// Append a frame under its capture day. Returns whether it was stored.
    pub fn append(&self, frame: &Frame) -> bool {
        let mut inner = self.inner.lock();
        if !inner.accepting {
            trace!("Store closed; dropping frame {}", frame.id);
            return false;
        }
        if !inner.seen.insert(frame.id) {
            trace!("Frame {} already buffered", frame.id);
            return false;
        }

        inner
            .days
            .entry(day_key(frame.timestamp))
            .or_default()
            .push(frame.clone());
        true
    }

    /// Take every buffered frame in day order, leaving the store empty
    pub fn drain(&self) -> Vec<Frame> {
        let mut inner = self.inner.lock();
        inner.seen.clear();
        let days = std::mem::take(&mut inner.days);
        days.into_values().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames buffered under one day
    #[cfg(test)]
    pub fn frames_for(&self, day: NaiveDate) -> Vec<Frame> {
        self.inner
            .lock()
            .days
            .get(&day)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn days(&self) -> Vec<NaiveDate> {
        self.inner.lock().days.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::time::Duration;

    fn frame_at(id: u64, timestamp: SystemTime) -> Frame {
        Frame::new(id, timestamp, vec![0; 4], 2, 2, PixelFormat::Mono8)
    }

    #[test]
    fn test_closed_store_refuses_appends() {
        let store = BufferedFrameStore::new();
        assert!(!store.append(&frame_at(0, SystemTime::now())));
        assert!(store.is_empty());

        store.open();
        assert!(store.append(&frame_at(1, SystemTime::now())));
        store.close();
        assert!(!store.append(&frame_at(2, SystemTime::now())));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_frames_kept_in_arrival_order_once() {
        let store = BufferedFrameStore::new();
        store.open();
        let now = SystemTime::now();

        for id in [3, 4, 4, 5, 3, 6] {
            store.append(&frame_at(id, now));
        }

        let ids: Vec<u64> = store.frames_for(day_key(now)).iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_drain_empties_store_and_forgets_ids() {
        let store = BufferedFrameStore::new();
        store.open();
        let now = SystemTime::now();
        store.append(&frame_at(0, now));
        store.append(&frame_at(1, now));

        let drained = store.drain();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
        assert!(store.days().is_empty());

        assert!(store.append(&frame_at(0, now)));
    }

    #[test]
    fn test_frames_grouped_by_day() {
        let store = BufferedFrameStore::new();
        store.open();
        let today = SystemTime::now();
        let earlier = today - Duration::from_secs(3 * 24 * 60 * 60);

        store.append(&frame_at(0, earlier));
        store.append(&frame_at(1, today));

        assert_eq!(store.days(), vec![day_key(earlier), day_key(today)]);
        let ids: Vec<u64> = store.drain().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_buffered_frames_share_pixels() {
        let store = BufferedFrameStore::new();
        store.open();
        let frame = frame_at(7, SystemTime::now());
        store.append(&frame);
        assert!(store.drain()[0].shares_pixels_with(&frame));
    }
}
