/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default number of entries a page directory bucket holds before it splits
pub const DEFAULT_BUCKET_SIZE: usize = 4;
