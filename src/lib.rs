//! Strata - a buffer pool for disk-oriented database storage
//!
//! This crate caches fixed-size disk pages in a fixed number of in-memory
//! frames. Callers pin pages while they use them; unpinned pages are evicted
//! with the LRU-K policy when a frame is needed, and dirty pages are written
//! back before their frame is reused.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O and the in-memory page slot
//!   - `DiskManager`: Reads and writes pages to/from a single database file
//!   - `Page`: A frame's bytes plus page ID, pin count and dirty flag
//!
//! - **Containers** (`container`): General purpose data structures
//!   - `ExtendibleHashTable`: Thread-safe hash table that grows by bucket splitting
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `PageGuard`: RAII handle that unpins a page on drop
//!
//! - **Recovery** (`recovery`): Write-ahead log hooks
//!   - `LogManager`: Log sequence numbers, not yet used by the buffer pool
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::storage::disk::DiskManager;
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = BufferPoolManager::new(100, 2, disk_manager);
//!
//! // Allocate a new page and write to it
//! let (page_id, page) = bpm.new_page().unwrap();
//! page.data_mut()[..5].copy_from_slice(b"hello");
//! bpm.unpin_page(page_id, true);
//!
//! // Flush changes to disk
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod recovery;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, Result, StrataError};
