use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};
use crate::storage::page::Page;

use super::BufferPoolManager;

/// RAII handle on a pinned page.
/// Unpins the page when dropped, reporting it dirty if it was written
/// through [`PageGuard::data_mut`].
///
/// The guard only holds the pin. The page's data lock is taken for as long
/// as each borrow returned by `data`/`data_mut` lives.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    page: &'a Page,
    is_dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, page: &'a Page) -> Self {
        Self {
            bpm,
            page_id,
            page,
            is_dirty: false,
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the underlying page.
    pub fn page(&self) -> &Page {
        self.page
    }

    /// Returns a read guard to the page data.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.page.data()
    }

    /// Returns a write guard to the page data.
    /// The page will be unpinned as dirty.
    ///
    /// Drop the returned guard before calling back into the buffer pool
    /// (`flush_page`, `flush_all_pages`, fetching another page). A flush of
    /// this page waits for the data lock while holding the pool latch, so a
    /// thread that keeps the write guard and then enters the pool deadlocks.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.is_dirty = true;
        self.page.data_mut()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}
