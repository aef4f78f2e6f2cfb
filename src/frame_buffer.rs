// src/frame_buffer.rs
//
// Rolling frame history plus one preserved frame per view category.
//
// The ring buffer holds the last `capacity` committed frames in commit
// order. The preserved slots sit beside it: each useful category keeps its
// newest frame even after the ring has long since evicted it, so a camera
// that lingers on one angle does not erase what the other angles looked
// like. Preserved frames are never deleted here; freshness is a read-time
// filter so different callers can apply different windows.

use crate::types::{Frame, ViewCategory};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct Commit {
    pub frame: Arc<Frame>,
    /// Frame pushed out of the ring to make room, if any.
    pub evicted: Option<Arc<Frame>>,
    /// Whether the frame became its category's preserved frame.
    pub preserved: bool,
}

pub struct FrameStore {
    buffer: VecDeque<Arc<Frame>>,
    capacity: usize,
    preserved: BTreeMap<ViewCategory, Arc<Frame>>,
}

impl FrameStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            preserved: BTreeMap::new(),
        }
    }

    /// Append a classified frame, evicting the oldest entry when full.
    ///
    /// Unclassified frames are refused. Useful categories also update the
    /// preserved slot when the frame is strictly newer than its occupant.
    pub fn commit(&mut self, frame: Frame) -> Option<Commit> {
        let Some(category) = frame.category else {
            warn!(
                "Refusing to buffer unclassified frame {}",
                frame.frame_id
            );
            return None;
        };

        let frame = Arc::new(frame);
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(frame.clone());

        let preserved = category.is_useful() && self.preserve(frame.clone());

        debug!(
            "Buffered frame {} ({}), {}/{} slots used{}",
            frame.frame_id,
            category,
            self.buffer.len(),
            self.capacity,
            if preserved { ", preserved" } else { "" }
        );

        Some(Commit {
            frame,
            evicted,
            preserved,
        })
    }

    /// Offer a frame for its category's preserved slot without touching the ring.
    /// Used for warm starts from disk.
    pub fn preserve(&mut self, frame: Arc<Frame>) -> bool {
        let Some(category) = frame.category.filter(|c| c.is_useful()) else {
            return false;
        };

        match self.preserved.get(&category) {
            Some(current) if current.captured_at_ms >= frame.captured_at_ms => false,
            _ => {
                self.preserved.insert(category, frame);
                true
            }
        }
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.buffer.back().cloned()
    }

    /// Newest buffered frame of `category`.
    pub fn latest_of(&self, category: ViewCategory) -> Option<Arc<Frame>> {
        self.buffer
            .iter()
            .rev()
            .find(|f| f.category == Some(category))
            .cloned()
    }

    /// Preserved frame for `category` if it is no older than `max_age_ms` at `now_ms`.
    pub fn preserved(
        &self,
        category: ViewCategory,
        now_ms: u64,
        max_age_ms: u64,
    ) -> Option<Arc<Frame>> {
        self.preserved
            .get(&category)
            .filter(|f| f.age_ms(now_ms) <= max_age_ms)
            .cloned()
    }

    /// Preserved frame for `category` regardless of age.
    pub fn preserved_slot(&self, category: ViewCategory) -> Option<Arc<Frame>> {
        self.preserved.get(&category).cloned()
    }

    /// Buffered frames, oldest first.
    pub fn buffered(&self) -> impl Iterator<Item = &Arc<Frame>> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn preserved_count(&self) -> usize {
        self.preserved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::frame;
    use ViewCategory::*;

    fn ids(store: &FrameStore) -> Vec<u64> {
        store.buffered().map(|f| f.frame_id).collect()
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut store = FrameStore::new(4);
        for i in 0..25u64 {
            let category = [BridgeView, ProcessingView, WideView][(i % 3) as usize];
            store.commit(frame(i, i * 1_000, category)).unwrap();
            assert!(store.len() <= 4);
        }
        assert_eq!(ids(&store), vec![21, 22, 23, 24]);
    }

    #[test]
    fn test_overflow_keeps_commit_order() {
        let mut store = FrameStore::new(3);
        store.commit(frame(1, 1, BridgeView));
        store.commit(frame(2, 2, ProcessingView));
        store.commit(frame(3, 3, WideView));
        let commit = store.commit(frame(4, 4, BridgeView)).unwrap();

        assert_eq!(commit.evicted.map(|f| f.frame_id), Some(1));
        assert_eq!(ids(&store), vec![2, 3, 4]);
        assert_eq!(store.latest().unwrap().frame_id, 4);
        assert_eq!(store.latest_of(BridgeView).unwrap().captured_at_ms, 4);
    }

    #[test]
    fn test_unclassified_frame_refused() {
        let mut store = FrameStore::new(3);
        assert!(store.commit(Frame::new(1, 10, vec![1])).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_useless_frame_never_preserved() {
        let mut store = FrameStore::new(3);
        let commit = store.commit(frame(1, 10, Useless)).unwrap();

        assert!(!commit.preserved);
        assert!(store.preserved_slot(Useless).is_none());
        assert_eq!(store.preserved_count(), 0);
    }

    #[test]
    fn test_preserved_replaced_only_by_newer() {
        let mut store = FrameStore::new(2);
        assert!(store.commit(frame(1, 100, BridgeView)).unwrap().preserved);
        assert!(store.commit(frame(2, 200, BridgeView)).unwrap().preserved);
        assert_eq!(store.preserved_slot(BridgeView).unwrap().frame_id, 2);

        // Same timestamp is not strictly newer.
        assert!(!store.preserve(Arc::new(frame(3, 200, BridgeView))));
        assert!(!store.preserve(Arc::new(frame(4, 50, BridgeView))));
        assert_eq!(store.preserved_slot(BridgeView).unwrap().frame_id, 2);

        for (category, slot) in [BridgeView, ProcessingView, WideView]
            .iter()
            .map(|c| (*c, store.preserved_slot(*c)))
        {
            if let Some(f) = slot {
                assert_eq!(f.category, Some(category));
            }
        }
    }

    #[test]
    fn test_preserved_survives_eviction() {
        let mut store = FrameStore::new(2);
        store.commit(frame(1, 100, WideView));
        store.commit(frame(2, 200, BridgeView));
        store.commit(frame(3, 300, BridgeView));

        assert!(store.latest_of(WideView).is_none());
        assert_eq!(store.preserved_slot(WideView).unwrap().frame_id, 1);
    }

    #[test]
    fn test_preserved_freshness_window() {
        let t0 = 1_000_000;
        let mut store = FrameStore::new(5);
        store.commit(frame(1, t0, BridgeView));

        assert!(store.preserved(BridgeView, t0 + 700_000, 600_000).is_none());
        assert_eq!(
            store.preserved(BridgeView, t0 + 500_000, 600_000).unwrap().frame_id,
            1
        );
        // A looser window still sees the frame that the strict one rejected.
        assert!(store.preserved(BridgeView, t0 + 700_000, 3_600_000).is_some());
        assert!(store.preserved(ProcessingView, t0, 600_000).is_none());
    }
}
