use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// History of access timestamps (most recent at back), at most k entries
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
    /// Set once the frame has been accessed k times; never cleared
    is_promoted: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
            is_promoted: false,
        }
    }

    /// Records an access at the given timestamp
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    /// Logical clock, advanced on every access
    current_timestamp: Timestamp,
    frame_info: HashMap<FrameId, FrameAccessInfo>,
    /// Frames with fewer than k accesses, least recently accessed at the front
    history_list: VecDeque<FrameId>,
    /// Frames with at least k accesses, most recently accessed at the front
    cache_list: VecDeque<FrameId>,
    num_evictable: usize,
}

impl ReplacerState {
    fn detach(list: &mut VecDeque<FrameId>, frame_id: FrameId) {
        if let Some(pos) = list.iter().position(|&f| f == frame_id) {
            list.remove(pos);
        }
    }

    fn is_evictable(&self, frame_id: &FrameId) -> bool {
        self.frame_info
            .get(frame_id)
            .is_some_and(|info| info.is_evictable)
    }

    /// Finds the frame with the largest backward k-distance: the least
    /// recently accessed evictable frame below k accesses, else the least
    /// recently used evictable promoted frame.
    fn find_victim(&self) -> Option<FrameId> {
        if self.num_evictable == 0 {
            return None;
        }
        self.history_list
            .iter()
            .find(|f| self.is_evictable(f))
            .or_else(|| self.cache_list.iter().rev().find(|f| self.is_evictable(f)))
            .copied()
    }

    /// Drops an evictable frame from whichever list holds it along with its history.
    fn evict_frame(&mut self, frame_id: FrameId) {
        Self::detach(&mut self.history_list, frame_id);
        Self::detach(&mut self.cache_list, frame_id);
        self.forget(frame_id);
    }

    fn forget(&mut self, frame_id: FrameId) {
        self.frame_info.remove(&frame_id);
        self.num_evictable -= 1;
    }
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts a frame whose backward k-distance is the maximum
/// of all evictable frames. Frames with fewer than k recorded accesses have
/// +inf backward k-distance and are always evicted before any frame that has
/// reached k accesses; among them the least recently accessed goes first.
///
/// Internally frames with fewer than k accesses sit in a history list ordered
/// by most recent access. Once a frame reaches k accesses it is promoted to a
/// cache list kept in most-recently-used order and stays there until evicted
/// or removed.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Number of frames the replacer can track, valid ids are `0..max_frames`
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and maximum frame count.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.max_frames,
            "{} is out of range for a replacer of {} frames",
            frame_id,
            self.max_frames
        );
    }

    /// Evicts the frame with the largest backward k-distance and forgets its
    /// access history. Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.find_victim()?;
        state.evict_frame(frame_id);
        Some(frame_id)
    }

    /// Returns the frame `evict` would pick without evicting it.
    ///
    /// The buffer pool uses this to write a dirty victim back before
    /// committing the eviction with [`LruKReplacer::remove`].
    pub fn victim(&self) -> Option<FrameId> {
        self.state.lock().find_victim()
    }

    /// Records that the given frame was accessed at the current timestamp.
    /// This method should be called after a page is pinned in the BufferPoolManager.
    ///
    /// # Panics
    /// Panics if `frame_id` is out of range.
    pub fn record_access(&self, frame_id: FrameId) {
        self.check_frame(frame_id);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        let info = state.frame_info.entry(frame_id).or_insert_with(|| {
            state.history_list.push_back(frame_id);
            FrameAccessInfo::new()
        });
        info.record_access(timestamp, self.k);

        if info.is_promoted {
            ReplacerState::detach(&mut state.cache_list, frame_id);
            state.cache_list.push_front(frame_id);
        } else if info.history.len() >= self.k {
            info.is_promoted = true;
            ReplacerState::detach(&mut state.history_list, frame_id);
            state.cache_list.push_front(frame_id);
        } else {
            ReplacerState::detach(&mut state.history_list, frame_id);
            state.history_list.push_back(frame_id);
        }
    }

    /// Sets whether a frame is evictable.
    /// When a frame's pin count drops to 0, it should be marked as evictable.
    ///
    /// # Panics
    /// Panics if `frame_id` is out of range or has no recorded access.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        self.check_frame(frame_id);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let info = state
            .frame_info
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("{} has no recorded access", frame_id));

        if info.is_evictable != is_evictable {
            info.is_evictable = is_evictable;
            if is_evictable {
                state.num_evictable += 1;
            } else {
                state.num_evictable -= 1;
            }
        }
    }

    /// Removes a frame and its access history from the replacer.
    /// This should be called when a page is deleted from the BufferPoolManager.
    /// Removing an untracked frame does nothing.
    ///
    /// # Panics
    /// Panics if the frame is tracked but not evictable.
    pub fn remove(&self, frame_id: FrameId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(info) = state.frame_info.get(&frame_id) else {
            return;
        };
        assert!(
            info.is_evictable,
            "cannot remove non-evictable {}",
            frame_id
        );

        if info.is_promoted {
            ReplacerState::detach(&mut state.cache_list, frame_id);
        } else {
            ReplacerState::detach(&mut state.history_list, frame_id);
        }
        state.frame_info.remove(&frame_id);
        state.num_evictable -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
