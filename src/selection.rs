// src/selection.rs
//
// Picks the small, fixed-size frame set sent for downstream analysis.
//
// Pass 1: one frame per useful category in priority order (bridge,
//         processing, wide). The newest buffered frame of that category
//         wins; otherwise the preserved frame if it is still fresh.
// Pass 2: if fewer than MAX_ANALYSIS_FRAMES were found, backfill from the
//         buffer, starting with the category that has the most buffered
//         frames, oldest first, skipping frames already chosen.
//
// The result depends only on the store contents and `now_ms`, so two calls
// with nothing committed in between return the same list.

use crate::frame_buffer::FrameStore;
use crate::types::{Frame, ViewCategory};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MAX_ANALYSIS_FRAMES: usize = 3;

pub fn select_for_analysis(
    store: &FrameStore,
    now_ms: u64,
    fresh_window_ms: u64,
) -> Vec<Arc<Frame>> {
    let mut selected: Vec<Arc<Frame>> = Vec::with_capacity(MAX_ANALYSIS_FRAMES);

    for category in ViewCategory::ANALYSIS_ORDER {
        let pick = store
            .latest_of(category)
            .or_else(|| store.preserved(category, now_ms, fresh_window_ms));
        if let Some(frame) = pick {
            selected.push(frame);
        }
    }

    if selected.len() < MAX_ANALYSIS_FRAMES {
        backfill(store, &mut selected);
    }

    selected
}

fn backfill(store: &FrameStore, selected: &mut Vec<Arc<Frame>>) {
    let mut by_category: BTreeMap<ViewCategory, Vec<&Arc<Frame>>> = BTreeMap::new();
    for frame in store.buffered() {
        if let Some(category) = frame.category.filter(|c| c.is_useful()) {
            by_category.entry(category).or_default().push(frame);
        }
    }

    // Most populated category first; ties go to the higher-priority view.
    let mut groups: Vec<(ViewCategory, Vec<&Arc<Frame>>)> = by_category.into_iter().collect();
    groups.sort_by(|(ca, fa), (cb, fb)| {
        fb.len()
            .cmp(&fa.len())
            .then_with(|| ca.priority_rank().cmp(&cb.priority_rank()))
    });

    for (_, frames) in groups {
        for frame in frames {
            if selected.len() >= MAX_ANALYSIS_FRAMES {
                return;
            }
            if !selected.iter().any(|s| s.frame_id == frame.frame_id) {
                selected.push(frame.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::frame;
    use ViewCategory::*;

    const FRESH: u64 = 600_000;

    fn ids(frames: &[Arc<Frame>]) -> Vec<u64> {
        frames.iter().map(|f| f.frame_id).collect()
    }

    #[test]
    fn test_one_per_category_in_priority_order() {
        let mut store = FrameStore::new(10);
        store.commit(frame(1, 100, WideView));
        store.commit(frame(2, 200, ProcessingView));
        store.commit(frame(3, 300, BridgeView));
        store.commit(frame(4, 400, WideView));

        let selected = select_for_analysis(&store, 500, FRESH);
        assert_eq!(ids(&selected), vec![3, 2, 4]);
    }

    #[test]
    fn test_fresh_preserved_frame_fills_gap() {
        let mut store = FrameStore::new(2);
        store.commit(frame(1, 1_000, ProcessingView));
        store.commit(frame(2, 2_000, BridgeView));
        store.commit(frame(3, 3_000, BridgeView));

        let selected = select_for_analysis(&store, 10_000, FRESH);
        assert_eq!(ids(&selected), vec![3, 1, 2]);
    }

    #[test]
    fn test_stale_preserved_frame_skipped() {
        let mut store = FrameStore::new(2);
        store.commit(frame(1, 0, ProcessingView));
        store.commit(frame(2, 700_000, BridgeView));
        store.commit(frame(3, 710_000, BridgeView));

        let selected = select_for_analysis(&store, 720_000, FRESH);
        // Processing is stale, so the bridge backlog fills the remaining slot.
        assert_eq!(ids(&selected), vec![3, 2]);
    }

    #[test]
    fn test_backfill_prefers_largest_category_oldest_first() {
        let mut store = FrameStore::new(10);
        store.commit(frame(1, 100, BridgeView));
        store.commit(frame(2, 200, WideView));
        store.commit(frame(3, 300, BridgeView));
        store.commit(frame(4, 400, BridgeView));

        let selected = select_for_analysis(&store, 500, FRESH);
        assert_eq!(ids(&selected), vec![4, 2, 1]);
    }

    #[test]
    fn test_empty_store_selects_nothing() {
        let store = FrameStore::new(3);
        assert!(select_for_analysis(&store, 0, FRESH).is_empty());
    }

    #[test]
    fn test_useless_frames_never_selected() {
        let mut store = FrameStore::new(5);
        store.commit(frame(1, 100, Useless));
        store.commit(frame(2, 200, Useless));
        assert!(select_for_analysis(&store, 300, FRESH).is_empty());

        store.commit(frame(3, 300, WideView));
        assert_eq!(ids(&select_for_analysis(&store, 300, FRESH)), vec![3]);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let mut store = FrameStore::new(6);
        for (i, category) in [BridgeView, BridgeView, WideView, BridgeView, ProcessingView]
            .into_iter()
            .enumerate()
        {
            store.commit(frame(i as u64, i as u64 * 10, category));
        }

        let first = select_for_analysis(&store, 100, FRESH);
        let second = select_for_analysis(&store, 100, FRESH);
        assert_eq!(ids(&first), ids(&second));
        assert!(first.len() <= MAX_ANALYSIS_FRAMES);
    }
}
