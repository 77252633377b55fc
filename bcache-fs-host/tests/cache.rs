mod common;

use std::sync::Arc;
use std::thread;

use bcache_fs::{BLOCK_SIZE, BlockCache, CacheConfig};
use bcache_fs_host::RamDisk;

use common::{Lcg, cache_on, pattern};

#[test]
fn read_back_what_was_written() {
    let disk = Arc::new(RamDisk::new(32));
    let cache = cache_on(&disk, 4);

    cache.write(3, 10, b"hello");
    let mut buf = [0; 5];
    cache.read(3, 10, &mut buf);
    assert_eq!(&buf, b"hello");

    // 还没写回设备
    assert_eq!(disk.peek(3), [0; BLOCK_SIZE]);
    assert!(cache.contains(3));
}

#[test]
fn reads_see_device_contents() {
    let disk = Arc::new(RamDisk::new(32));
    disk.poke(7, &pattern(7));
    let cache = cache_on(&disk, 4);

    let mut buf = [0; BLOCK_SIZE];
    cache.read(7, 0, &mut buf);
    assert_eq!(buf, pattern(7));

    // 第二次命中，不再读设备
    cache.read(7, 0, &mut buf);
    assert_eq!(disk.reads(), 1);
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn write_visible_to_other_threads() {
    let disk = Arc::new(RamDisk::new(32));
    let cache = cache_on(&disk, 4);

    let writer = {
        let cache = cache.clone();
        thread::spawn(move || cache.write(5, 0, &pattern(5)))
    };
    writer.join().unwrap();

    let reader = {
        let cache = cache.clone();
        thread::spawn(move || {
            let mut buf = [0; BLOCK_SIZE];
            cache.read(5, 0, &mut buf);
            buf
        })
    };
    assert_eq!(reader.join().unwrap(), pattern(5));
}

#[test]
fn eviction_writes_dirty_victim_back() {
    let disk = Arc::new(RamDisk::new(64));
    let cache = cache_on(&disk, 2);

    cache.write(10, 0, b"ten");
    cache.write(20, 0, b"twenty");
    cache.write(30, 0, b"thirty");

    // 10 最早进入，时钟转一圈后它先被换出
    assert!(!cache.contains(10));
    assert!(cache.contains(20));
    assert!(cache.contains(30));
    assert_eq!(&disk.peek(10)[..3], b"ten");
    assert_eq!(disk.peek(20), [0; BLOCK_SIZE]);

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.write_backs, 1);

    // 换出后再读回来，内容不丢
    let mut buf = [0; 3];
    cache.read(10, 0, &mut buf);
    assert_eq!(&buf, b"ten");
}

#[test]
fn clock_gives_second_chance() {
    let disk = Arc::new(RamDisk::new(64));
    let cache = cache_on(&disk, 3);
    let mut buf = [0; 1];

    for sector in 1..=3 {
        cache.read(sector, 0, &mut buf);
    }
    cache.read(4, 0, &mut buf);
    assert!(!cache.contains(1));

    // 刚用过的 2 逃过这一次
    cache.read(2, 0, &mut buf);
    cache.read(5, 0, &mut buf);
    assert!(!cache.contains(3));
    assert!(cache.contains(2));

    cache.read(6, 0, &mut buf);
    assert!(!cache.contains(2));
    assert!(cache.contains(4));
    assert!(cache.contains(5));
    assert!(cache.contains(6));
}

#[test]
fn capacity_is_never_exceeded() {
    const SECTORS: u32 = 200;
    let disk = Arc::new(RamDisk::new(SECTORS as usize));
    let cache = cache_on(&disk, 8);
    let mut model = vec![0u8; SECTORS as usize];
    let mut rng = Lcg::new(42);

    for step in 0..2000 {
        let sector = (rng.next() % SECTORS as u64) as u32;
        if rng.next() % 3 == 0 {
            let value = (step % 251) as u8;
            cache.write(sector, 100, &[value]);
            model[sector as usize] = value;
        } else {
            let mut buf = [0; 1];
            cache.read(sector, 100, &mut buf);
            assert_eq!(buf[0], model[sector as usize], "sector {sector}");
        }
        assert!(cache.len() <= cache.capacity());
    }

    cache.flush_all();
    for sector in 0..SECTORS {
        assert_eq!(disk.peek(sector)[100], model[sector as usize]);
    }
}

#[test]
fn whole_sector_write_skips_device_read() {
    let disk = Arc::new(RamDisk::new(16));
    let cache = cache_on(&disk, 4);

    cache.write(1, 0, &pattern(1));
    assert_eq!(disk.reads(), 0);

    cache.write(2, 0, &pattern(2)[..BLOCK_SIZE - 1]);
    assert_eq!(disk.reads(), 1);
}

#[test]
fn release_writes_back_and_forgets() {
    let disk = Arc::new(RamDisk::new(16));
    let cache = cache_on(&disk, 4);

    cache.write(7, 0, &pattern(7));
    assert!(cache.release(7));
    assert!(!cache.contains(7));
    assert_eq!(disk.peek(7), pattern(7));
    assert!(cache.is_empty());

    assert!(!cache.release(7));
}

#[test]
fn flush_all_keeps_slots() {
    let disk = Arc::new(RamDisk::new(16));
    let cache = cache_on(&disk, 4);

    cache.write(1, 0, b"a");
    cache.write(2, 0, b"b");
    assert_eq!(cache.flush_all(), 2);
    assert_eq!(cache.flush_all(), 0);
    assert_eq!(cache.len(), 2);
    assert_eq!(disk.peek(1)[0], b'a');
    assert_eq!(disk.peek(2)[0], b'b');
}

#[test]
fn destroy_flushes_and_empties() {
    let disk = Arc::new(RamDisk::new(16));
    let cache = cache_on(&disk, 4);

    for sector in 1..=3 {
        cache.write(sector, 0, &pattern(sector));
    }
    cache.destroy();

    assert!(cache.is_empty());
    for sector in 1..=3 {
        assert_eq!(disk.peek(sector), pattern(sector));
    }
}

#[test]
fn drop_flushes_dirty_sectors() {
    let disk = Arc::new(RamDisk::new(16));
    let cache = BlockCache::new(disk.clone(), CacheConfig::with_capacity(4));

    cache.write(9, 0, &pattern(9));
    drop(cache);

    assert_eq!(disk.peek(9), pattern(9));
}

#[test]
fn concurrent_disjoint_sectors() {
    const THREADS: u32 = 8;
    const PER_THREAD: u32 = 16;
    let disk = Arc::new(RamDisk::new((THREADS * PER_THREAD) as usize));
    let cache = cache_on(&disk, 6);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for round in 0..4 {
                    for i in 0..PER_THREAD {
                        let sector = t * PER_THREAD + i;
                        cache.write(sector, 0, &pattern(sector));
                        let mut buf = [0; BLOCK_SIZE];
                        cache.read(sector, 0, &mut buf);
                        assert_eq!(buf, pattern(sector), "round {round}");
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.len() <= 6);
    cache.flush_all();
    for sector in 0..THREADS * PER_THREAD {
        assert_eq!(disk.peek(sector), pattern(sector));
    }
}

#[test]
fn concurrent_writes_to_one_sector() {
    const THREADS: usize = 8;
    const CHUNK: usize = BLOCK_SIZE / THREADS;
    let disk = Arc::new(RamDisk::new(64));
    let cache = cache_on(&disk, 3);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                let chunk = [t as u8 + 1; CHUNK];
                cache.write(0, t * CHUNK, &chunk);
                // 其他扇区的访问迫使扇区 0 反复换出换入
                for sector in 1..20 {
                    let mut buf = [0; 1];
                    cache.read(sector + t as u32 * 5, 0, &mut buf);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut buf = [0; BLOCK_SIZE];
    cache.read(0, 0, &mut buf);
    for (t, chunk) in buf.chunks(CHUNK).enumerate() {
        assert!(chunk.iter().all(|&byte| byte == t as u8 + 1), "chunk {t}");
    }
}

#[test]
fn contended_hits_wait_for_the_slot() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;
    let disk = Arc::new(RamDisk::new(8));
    let cache = cache_on(&disk, 2);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    cache.write(1, t, &[round as u8]);
                    let mut buf = [0; 1];
                    cache.read(1, t, &mut buf);
                    assert_eq!(buf[0], round as u8);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 扇区只装入一次，其余每次访问都恰好算一次命中
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, THREADS * ROUNDS * 2 - 1);
    assert_eq!(stats.evictions, 0);
}
