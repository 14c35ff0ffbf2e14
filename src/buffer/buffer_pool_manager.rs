use std::collections::LinkedList;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StrataError, DEFAULT_BUCKET_SIZE};
use crate::container::hash::ExtendibleHashTable;
use crate::recovery::LogManager;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

use super::{LruKReplacer, PageGuard};

/// State guarded by the pool latch
struct PoolState {
    /// Free list: frames that are not currently in use
    free_list: LinkedList<FrameId>,
    /// Next page ID to hand out
    next_page_id: i32,
}

impl PoolState {
    fn allocate_page(&mut self) -> PageId {
        let page_id = PageId::new(self.next_page_id);
        self.next_page_id += 1;
        page_id
    }
}

/// BufferPoolManager is responsible for fetching database pages from disk
/// and storing them in memory. It manages a fixed number of frames and uses
/// the LRU-K replacement policy to decide which pages to evict.
///
/// Every operation runs under one pool latch from the lookup through to the
/// final directory and replacer update, so a frame chosen for eviction can
/// never be picked up by another caller before it has been reused. Disk
/// transfers for eviction and fetch happen while the latch is held.
///
/// Pages handed out by [`new_page`](Self::new_page) and
/// [`fetch_page`](Self::fetch_page) are pinned and must be released with
/// [`unpin_page`](Self::unpin_page); the guarded variants do that on drop.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames, indexed by frame ID
    pages: Vec<Page>,
    latch: Mutex<PoolState>,
    /// Page table: maps page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    disk_manager: Arc<DiskManager>,
    /// Reserved for write-ahead logging around write-back
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for LRU-K,
    /// and disk manager.
    ///
    /// # Panics
    /// Panics if `pool_size` or `k` is 0.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_log_manager(pool_size, k, disk_manager, None)
    }

    /// Creates a new BufferPoolManager that also holds a log manager.
    ///
    /// # Panics
    /// Panics if `pool_size` or `k` is 0.
    pub fn with_log_manager(
        pool_size: usize,
        k: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            pages.push(Page::new(frame_id));
            free_list.push_back(frame_id);
        }

        // Never hand out an id that already names a page in the file
        let next_page_id = disk_manager.get_num_pages();

        Self {
            pool_size,
            pages,
            latch: Mutex::new(PoolState {
                free_list,
                next_page_id,
            }),
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            replacer: LruKReplacer::new(k, pool_size),
            disk_manager,
            log_manager,
        }
    }

    /// Creates a new zeroed page in the buffer pool and returns it pinned.
    ///
    /// Returns `BufferPoolFull` if every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &Page)> {
        let mut state = self.latch.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = state.allocate_page();
        let page = &self.pages[frame_id.as_usize()];

        page.set_page_id(page_id);
        page.pin();
        self.page_table.insert(page_id, frame_id);

        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        trace!("created {} in {}", page_id, frame_id);
        Ok((page_id, page))
    }

    /// Fetches a page into the buffer pool and returns it pinned.
    /// If the page is already resident no disk I/O happens; otherwise a frame
    /// is taken from the free list or by eviction and the page is read from disk.
    ///
    /// Returns `BufferPoolFull` if the page is not resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Page> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut state = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let page = &self.pages[frame_id.as_usize()];
            page.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            trace!("fetch hit {} in {}", page_id, frame_id);
            return Ok(page);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let page = &self.pages[frame_id.as_usize()];

        page.set_page_id(page_id);
        self.page_table.insert(page_id, frame_id);

        // The data guard must be released before the error path resets the page
        let read = self
            .disk_manager
            .read_page(page_id, &mut page.data_mut()[..]);
        if let Err(e) = read {
            self.page_table.remove(&page_id);
            page.reset();
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        page.pin();
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        trace!("fetch miss {}, loaded into {}", page_id, frame_id);
        Ok(page)
    }

    /// Releases one pin on a page. `is_dirty` marks the page dirty; it never
    /// clears a dirty flag set by another holder, only a flush does.
    ///
    /// Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            warn!("unpin of non-resident {}", page_id);
            return false;
        };
        let page = &self.pages[frame_id.as_usize()];

        let Some(pin_count) = page.unpin() else {
            warn!("unpin of {} with pin count 0", page_id);
            return false;
        };

        if is_dirty {
            page.set_dirty(true);
        }
        if pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes a resident page to disk and clears its dirty flag, whether or
    /// not it is pinned.
    ///
    /// Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let _state = self.latch.lock();

        match self.page_table.find(&page_id) {
            Some(frame_id) => {
                self.write_back(&self.pages[frame_id.as_usize()])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _state = self.latch.lock();

        for page in self.pages.iter().filter(|p| p.page_id().is_valid()) {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Deletes a page from the buffer pool, writing it back first if dirty,
    /// and returns its frame to the free list.
    ///
    /// Returns true if the page is gone afterwards (including when it was
    /// never resident) and false if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        let page = &self.pages[frame_id.as_usize()];

        if page.pin_count() > 0 {
            return Ok(false);
        }
        if page.is_dirty() {
            self.write_back(page)?;
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        page.reset();
        state.free_list.push_back(frame_id);

        debug!("deleted {} from {}", page_id, frame_id);
        Ok(true)
    }

    /// Like [`new_page`](Self::new_page), returning a guard that unpins on drop.
    pub fn new_page_guarded(&self) -> Result<PageGuard<'_>> {
        let (page_id, page) = self.new_page()?;
        Ok(PageGuard::new(self, page_id, page))
    }

    /// Like [`fetch_page`](Self::fetch_page), returning a guard that unpins on drop.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, page_id, page))
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _state = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.pages[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Returns the number of pages mapped in the page table.
    pub fn resident_page_count(&self) -> usize {
        let _state = self.latch.lock();
        self.page_table.len()
    }

    /// Returns the number of frames the replacer may currently evict.
    pub fn evictable_frame_count(&self) -> usize {
        let _state = self.latch.lock();
        self.replacer.size()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Gets a free frame, either from the free list or by evicting a page.
    /// An evicted page is written back if dirty and dropped from the page table.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        // Only commit the eviction once the victim is safely on disk, so a
        // failed write-back leaves its access history untouched
        let frame_id = self
            .replacer
            .victim()
            .ok_or(StrataError::BufferPoolFull)?;
        let page = &self.pages[frame_id.as_usize()];
        let old_page_id = page.page_id();
        debug_assert_eq!(page.pin_count(), 0, "evicted a pinned frame");

        if page.is_dirty() {
            if let Err(e) = self.write_back(page) {
                warn!("write-back of {} failed, keeping it resident: {}", old_page_id, e);
                return Err(e);
            }
        }

        self.replacer.remove(frame_id);
        self.page_table.remove(&old_page_id);
        page.reset();

        debug!("evicted {} from {}", old_page_id, frame_id);
        Ok(frame_id)
    }

    fn write_back(&self, page: &Page) -> Result<()> {
        let page_id = page.page_id();
        self.disk_manager.write_page(page_id, &page.data()[..])?;
        page.set_dirty(false);
        debug!("wrote back {}", page_id);
        Ok(())
    }
}
