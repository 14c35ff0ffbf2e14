//! Integration tests for the buffer pool manager

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strata::buffer::BufferPoolManager;
use strata::common::{PageId, StrataError, PAGE_SIZE};
use strata::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
    init_logger();
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = BufferPoolManager::new(pool_size, 2, dm);
    (bpm, temp_file)
}

fn stamp(page_id: PageId) -> [u8; 4] {
    page_id.as_i32().to_le_bytes()
}

#[test]
fn test_buffer_pool_basic_operations() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, page) = bpm.new_page().unwrap();
    assert_eq!(page_id, PageId::new(0));

    page.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(bpm.unpin_page(page_id, true));

    let page = bpm.fetch_page(page_id).unwrap();
    assert_eq!(&page.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(bpm.unpin_page(page_id, false));
}

#[test]
fn test_buffer_pool_evicts_only_unpinned_frame() {
    let (bpm, _temp) = create_bpm(2);
    let dm = Arc::clone(bpm.disk_manager());

    let (p0, f0) = bpm.new_page().unwrap();
    let (p1, f1) = bpm.new_page().unwrap();
    assert_eq!(p0, PageId::new(0));
    assert_eq!(p1, PageId::new(1));
    let (f0, f1) = (f0.frame_id(), f1.frame_id());

    assert!(bpm.unpin_page(p0, false));

    let (p2, page) = bpm.new_page().unwrap();
    assert_eq!(p2, PageId::new(2));
    assert_eq!(page.frame_id(), f0);
    assert_eq!(bpm.get_pin_count(p0), None);

    // Page 0 is gone; make room and fetch it back from disk
    assert!(bpm.unpin_page(p2, false));
    let reads = dm.get_num_reads();
    let page = bpm.fetch_page(p0).unwrap();
    assert_eq!(dm.get_num_reads(), reads + 1);
    assert_eq!(page.page_id(), p0);
    assert_eq!(page.frame_id(), f0);
    assert_eq!(page.pin_count(), 1);
    assert_eq!(bpm.get_pin_count(p1), Some(1));
    assert_ne!(f0, f1);
}

#[test]
fn test_buffer_pool_lru_k_prefers_cold_frame() {
    let (bpm, _temp) = create_bpm(2);

    // A, B, A: A reaches two accesses, B stays at one
    let (a, _) = bpm.new_page().unwrap();
    assert!(bpm.unpin_page(a, false));
    let (b, _) = bpm.new_page().unwrap();
    assert!(bpm.unpin_page(b, false));
    bpm.fetch_page(a).unwrap();
    assert!(bpm.unpin_page(a, false));

    // C needs a victim
    let (c, _) = bpm.new_page().unwrap();
    assert_eq!(bpm.get_pin_count(b), None);
    assert_eq!(bpm.get_pin_count(a), Some(0));
    assert_eq!(bpm.get_pin_count(c), Some(1));
}

#[test]
fn test_buffer_pool_fetch_hit_does_no_io() {
    let (bpm, _temp) = create_bpm(4);
    let dm = Arc::clone(bpm.disk_manager());

    let (page_id, _) = bpm.new_page().unwrap();
    for _ in 0..5 {
        bpm.fetch_page(page_id).unwrap();
    }
    assert_eq!(bpm.get_pin_count(page_id), Some(6));
    assert_eq!(dm.get_num_reads(), 0);
    assert_eq!(dm.get_num_writes(), 0);
}

#[test]
fn test_buffer_pool_pin_prevents_eviction() {
    let (bpm, _temp) = create_bpm(2);

    bpm.new_page().unwrap();
    bpm.new_page().unwrap();

    assert!(matches!(bpm.new_page(), Err(StrataError::BufferPoolFull)));
    assert!(matches!(
        bpm.fetch_page(PageId::new(5)),
        Err(StrataError::BufferPoolFull)
    ));
    assert_eq!(bpm.resident_page_count(), 2);
}

#[test]
fn test_buffer_pool_delete_pinned_page_is_refused() {
    let (bpm, _temp) = create_bpm(3);

    let (page_id, page) = bpm.new_page().unwrap();
    page.data_mut()[0] = 9;

    assert!(!bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), Some(1));
    assert_eq!(bpm.free_frame_count(), 2);
    assert_eq!(bpm.resident_page_count(), 1);
    assert_eq!(page.data()[0], 9);
}

#[test]
fn test_buffer_pool_delete_then_fetch_reads_disk() {
    let (bpm, _temp) = create_bpm(3);
    let dm = Arc::clone(bpm.disk_manager());

    let (page_id, page) = bpm.new_page().unwrap();
    page.data_mut()[0] = 42;
    assert!(bpm.unpin_page(page_id, true));

    assert!(bpm.delete_page(page_id).unwrap());
    // Dirty contents were written back before the frame was freed
    assert_eq!(dm.get_num_writes(), 1);
    assert_eq!(bpm.free_frame_count(), 3);
    assert_eq!(bpm.get_pin_count(page_id), None);

    let page = bpm.fetch_page(page_id).unwrap();
    assert_eq!(dm.get_num_reads(), 1);
    assert_eq!(page.data()[0], 42);
}

#[test]
fn test_buffer_pool_flush_page() {
    let (bpm, _temp) = create_bpm(3);
    let dm = Arc::clone(bpm.disk_manager());

    let (page_id, page) = bpm.new_page().unwrap();
    page.data_mut()[0] = 1;
    page.set_dirty(true);

    // Pinned pages can be flushed
    assert!(bpm.flush_page(page_id).unwrap());
    assert!(!page.is_dirty());
    assert_eq!(dm.get_num_writes(), 1);

    let mut on_disk = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut on_disk).unwrap();
    assert_eq!(on_disk[0], 1);

    assert!(!bpm.flush_page(PageId::new(40)).unwrap());
}

#[test]
fn test_buffer_pool_persistence() {
    init_logger();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let test_data = b"Persistence test data";

    let page_ids: Vec<PageId>;
    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        page_ids = (0..5)
            .map(|i| {
                let mut guard = bpm.new_page_guarded().unwrap();
                guard.data_mut()[..test_data.len()].copy_from_slice(test_data);
                guard.data_mut()[PAGE_SIZE - 1] = i;
                guard.page_id()
            })
            .collect();

        bpm.flush_all_pages().unwrap();
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = BufferPoolManager::new(10, 2, dm);

        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.fetch_page_guarded(pid).unwrap();
            assert_eq!(&guard.data()[..test_data.len()], test_data);
            assert_eq!(guard.data()[PAGE_SIZE - 1], i as u8);
        }

        // New ids continue after the pages already on disk
        let (next, _) = bpm.new_page().unwrap();
        assert_eq!(next, PageId::new(5));
    }
}

#[test]
fn test_buffer_pool_large_workload() {
    let (bpm, _temp) = create_bpm(5);

    let page_ids: Vec<_> = (0..20)
        .map(|_| {
            let mut guard = bpm.new_page_guarded().unwrap();
            let pid = guard.page_id();
            guard.data_mut()[..4].copy_from_slice(&stamp(pid));
            pid
        })
        .collect();

    for &pid in page_ids.iter().rev() {
        let guard = bpm.fetch_page_guarded(pid).unwrap();
        assert_eq!(guard.data()[..4], stamp(pid));
    }

    assert_eq!(bpm.resident_page_count(), 5);
    assert_eq!(bpm.free_frame_count(), 0);
}

#[test]
fn test_buffer_pool_concurrent_access() {
    let (bpm, _temp) = create_bpm(8);
    let bpm = Arc::new(bpm);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut mine = Vec::new();
                for _ in 0..50 {
                    let (pid, page) = bpm.new_page().unwrap();
                    page.data_mut()[..4].copy_from_slice(&stamp(pid));
                    assert!(bpm.unpin_page(pid, true));
                    mine.push(pid);
                }
                for &pid in &mine {
                    let page = bpm.fetch_page(pid).unwrap();
                    assert_eq!(page.data()[..4], stamp(pid));
                    assert!(bpm.unpin_page(pid, false));
                }
                mine
            })
        })
        .collect();

    let mut all: Vec<PageId> = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    // Every page id was handed out exactly once
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 200);

    assert_eq!(bpm.free_frame_count() + bpm.resident_page_count(), 8);
    assert_eq!(bpm.evictable_frame_count(), bpm.resident_page_count());
}

#[test]
fn test_buffer_pool_concurrent_shared_page() {
    let (bpm, _temp) = create_bpm(4);
    let bpm = Arc::new(bpm);

    let (page_id, _) = bpm.new_page().unwrap();
    assert!(bpm.unpin_page(page_id, false));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = bpm.fetch_page_guarded(page_id).unwrap();
                    let _ = guard.data()[0];
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_guarded_writes_with_concurrent_flush() {
    let (bpm, _temp) = create_bpm(4);
    let bpm = Arc::new(bpm);

    let (page_id, _) = bpm.new_page().unwrap();
    assert!(bpm.unpin_page(page_id, false));

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for i in 0..50u8 {
                    let mut guard = bpm.fetch_page_guarded(page_id).unwrap();
                    {
                        let mut data = guard.data_mut();
                        data[t as usize] = i;
                    }
                    // The data lock is released, so entering the pool is safe
                    assert!(bpm.flush_page(page_id).unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(bpm.get_pin_count(page_id), Some(0));
    let page = bpm.fetch_page(page_id).unwrap();
    assert_eq!(page.data()[..4], [49, 49, 49, 49]);
    assert!(bpm.unpin_page(page_id, false));
}

/// Reads of `/proc/self/mem` at offset 0 fail with EIO, so every fetch miss
/// hits a read error.
#[cfg(target_os = "linux")]
#[test]
fn test_buffer_pool_failed_read_releases_frame() {
    init_logger();
    let dm = Arc::new(DiskManager::new("/proc/self/mem").unwrap());
    let bpm = BufferPoolManager::new(2, 2, dm);

    let result = bpm.fetch_page(PageId::new(0));
    assert!(matches!(result, Err(StrataError::Io(_))));

    assert_eq!(bpm.free_frame_count(), 2);
    assert_eq!(bpm.resident_page_count(), 0);
    assert_eq!(bpm.evictable_frame_count(), 0);
    assert_eq!(bpm.get_pin_count(PageId::new(0)), None);

    // Retrying fails the same way without leaking a frame
    assert!(bpm.fetch_page(PageId::new(0)).is_err());
    assert_eq!(bpm.free_frame_count(), 2);

    let (page_id, page) = bpm.new_page().unwrap();
    assert!(page.data().iter().all(|&b| b == 0));
    assert!(bpm.unpin_page(page_id, false));
    assert_eq!(bpm.free_frame_count() + bpm.resident_page_count(), 2);
}

/// Writes to `/dev/full` fail with ENOSPC, so every write-back fails.
#[cfg(target_os = "linux")]
#[test]
fn test_buffer_pool_failed_write_back_keeps_victim() {
    init_logger();
    let dm = Arc::new(DiskManager::new("/dev/full").unwrap());
    let bpm = BufferPoolManager::new(1, 2, dm);

    let (page_id, page) = bpm.new_page().unwrap();
    page.data_mut()[0] = 7;
    assert!(bpm.unpin_page(page_id, true));

    assert!(matches!(bpm.new_page(), Err(StrataError::Io(_))));

    // The dirty victim is still resident, unpinned and evictable
    assert_eq!(bpm.resident_page_count(), 1);
    assert_eq!(bpm.free_frame_count(), 0);
    assert_eq!(bpm.evictable_frame_count(), 1);
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    let page = bpm.fetch_page(page_id).unwrap();
    assert!(page.is_dirty());
    assert_eq!(page.data()[0], 7);
    assert!(bpm.unpin_page(page_id, false));

    assert!(matches!(bpm.flush_page(page_id), Err(StrataError::Io(_))));
    assert!(bpm.fetch_page(PageId::new(5)).is_err());
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_buffer_pool_random_operations_keep_invariants() {
    let pool_size = 6;
    let (bpm, _temp) = create_bpm(pool_size);
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let mut known: Vec<PageId> = Vec::new();
    let mut pins: HashMap<PageId, u32> = HashMap::new();

    for _ in 0..3000 {
        match rng.gen_range(0..4) {
            0 => match bpm.new_page() {
                Ok((pid, page)) => {
                    page.data_mut()[..4].copy_from_slice(&stamp(pid));
                    page.set_dirty(true);
                    known.push(pid);
                    *pins.entry(pid).or_default() += 1;
                }
                Err(StrataError::BufferPoolFull) => {
                    assert_eq!(pins.values().filter(|&&p| p > 0).count(), pool_size);
                }
                Err(e) => panic!("unexpected error: {}", e),
            },
            1 => {
                if let Some(&pid) = known.choose(&mut rng) {
                    match bpm.fetch_page(pid) {
                        Ok(page) => {
                            assert_eq!(page.data()[..4], stamp(pid));
                            *pins.entry(pid).or_default() += 1;
                        }
                        Err(StrataError::BufferPoolFull) => {
                            assert_eq!(pins.values().filter(|&&p| p > 0).count(), pool_size);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            }
            2 => {
                let pinned: Vec<PageId> = pins
                    .iter()
                    .filter(|&(_, &p)| p > 0)
                    .map(|(&pid, _)| pid)
                    .collect();
                if let Some(&pid) = pinned.choose(&mut rng) {
                    assert!(bpm.unpin_page(pid, rng.gen()));
                    *pins.get_mut(&pid).unwrap() -= 1;
                }
            }
            _ => {
                if let Some(&pid) = known.choose(&mut rng) {
                    let pinned = pins.get(&pid).copied().unwrap_or(0) > 0;
                    assert_eq!(bpm.delete_page(pid).unwrap(), !pinned);
                }
            }
        }

        let pinned_pages = pins.values().filter(|&&p| p > 0).count();
        let resident = bpm.resident_page_count();
        assert_eq!(bpm.free_frame_count() + resident, pool_size);
        assert_eq!(bpm.evictable_frame_count(), resident - pinned_pages);
        for (&pid, &p) in &pins {
            if p > 0 {
                assert_eq!(bpm.get_pin_count(pid), Some(p));
            }
        }
    }
}
