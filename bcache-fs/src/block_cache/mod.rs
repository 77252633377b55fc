//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟固定数量的槽位，
//! 把即将操作的扇区复制到槽位中，提高对块设备的操作效率。
//!
//! 块缓存层对使用者来说是透明的，使用者对块设备的操作都经过块缓存层，
//! 且**操作扇区时一定在槽位当中**。
//!
//! ## 锁
//!
//! - 目录锁保护扇区到槽位的映射、时钟指针和空闲槽位；
//! - 槽位锁保护槽位的数据和标志。
//!
//! 加锁顺序总是先目录后槽位，持有槽位锁时绝不去拿目录锁，
//! 因此持有目录锁时可以阻塞等待槽位锁。
//! 换出扫描和后台写回只做非阻塞尝试，跳过正被使用的槽位。

mod clock;
mod directory;
mod semaphore;
mod slot;
mod write_behind;

pub use write_behind::WriteBehind;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic;
use core::sync::atomic::AtomicUsize;

use block_dev::BlockDevice;
use spin::{Mutex, MutexGuard};

use self::directory::Directory;
use self::semaphore::Semaphore;
use self::slot::Slot;
use crate::BLOCK_SIZE;

/// 块缓存的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 槽位个数的上限
    pub capacity: usize,
    /// 后台写回的周期，以调用者的时钟滴答计
    pub write_behind_ticks: u64,
}

impl CacheConfig {
    pub const DEFAULT_CAPACITY: usize = 64;
    pub const DEFAULT_WRITE_BEHIND_TICKS: u64 = 120;

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            write_behind_ticks: Self::DEFAULT_WRITE_BEHIND_TICKS,
        }
    }
}

/// 缓存运行以来的计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    /// 脏块写回设备的次数，无论由谁触发
    pub write_backs: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
    write_backs: AtomicUsize,
}

/// 固定容量的扇区缓存
pub struct BlockCache {
    /// 底层块设备的引用
    device: Arc<dyn BlockDevice>,
    /// 槽位池，按编号寻址
    slots: Box<[Mutex<Slot>]>,
    directory: Mutex<Directory>,
    /// 新建槽位的名额
    admission: Semaphore,
    config: CacheConfig,
    counters: Counters,
}

impl BlockCache {
    pub fn new(device: Arc<dyn BlockDevice>, config: CacheConfig) -> Self {
        assert!(config.capacity > 0, "block cache needs at least one slot");

        Self {
            device,
            slots: (0..config.capacity)
                .map(|_| Mutex::new(Slot::new()))
                .collect(),
            directory: Mutex::new(Directory::new(config.capacity)),
            admission: Semaphore::new(config.capacity),
            config,
            counters: Counters::default(),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// 当前占用的槽位数
    pub fn len(&self) -> usize {
        self.directory.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 扇区当前是否驻留在缓存中
    pub fn contains(&self, sector: u32) -> bool {
        self.directory.lock().position(sector).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        let load = |counter: &AtomicUsize| counter.load(atomic::Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            evictions: load(&self.counters.evictions),
            write_backs: load(&self.counters.write_backs),
        }
    }

    /// 从 `sector` 的 `offset` 处读出 `buf.len()` 个字节
    pub fn read(&self, sector: u32, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= BLOCK_SIZE, "read crosses the sector end");
        self.acquire(sector, true).read(offset, buf);
    }

    /// 把 `buf` 写到 `sector` 的 `offset` 处，槽位变脏。
    ///
    /// 写满整个扇区时不必先读出旧内容。
    pub fn write(&self, sector: u32, offset: usize, buf: &[u8]) {
        assert!(offset + buf.len() <= BLOCK_SIZE, "write crosses the sector end");
        let whole = offset == 0 && buf.len() == BLOCK_SIZE;
        self.acquire(sector, !whole).write(offset, buf);
    }

    /// 强制把 `sector` 逐出缓存，脏块先写回；返回它原先是否在缓存中
    pub fn release(&self, sector: u32) -> bool {
        let mut dir = self.directory.lock();
        let Some(pos) = dir.position(sector) else {
            return false;
        };

        let mut slot = self.slots[dir.entry(pos).slot].lock();
        self.sync(&mut slot);
        slot.reset();
        drop(slot);

        dir.remove(pos);
        self.admission.up();
        log::trace!("block cache: released sector {sector}");

        true
    }

    /// 同步写回所有脏块，返回写回的个数
    pub fn flush_all(&self) -> usize {
        let dir = self.directory.lock();
        let flushed = dir
            .entries()
            .iter()
            .filter(|entry| self.sync(&mut self.slots[entry.slot].lock()))
            .count();
        log::debug!("block cache: flushed {flushed} dirty sectors");

        flushed
    }

    /// 后台写回的一个周期：只写回能立刻锁住的脏块，正被使用的留到下个周期。
    ///
    /// 从不换出槽位。
    pub fn write_behind(&self) -> usize {
        let dir = self.directory.lock();
        let mut flushed = 0;
        for entry in dir.entries() {
            if let Some(mut slot) = self.slots[entry.slot].try_lock() {
                if self.sync(&mut slot) {
                    flushed += 1;
                }
            }
        }

        flushed
    }

    /// 拆除整个缓存：写回所有脏块并释放所有槽位
    pub fn destroy(&self) {
        let mut dir = self.directory.lock();
        while !dir.is_empty() {
            let mut slot = self.slots[dir.entry(0).slot].lock();
            self.sync(&mut slot);
            slot.reset();
            drop(slot);

            dir.remove(0);
            self.admission.up();
        }
        log::debug!("block cache: destroyed");
    }
}

impl BlockCache {
    /// 取得缓存 `sector` 的槽位并加锁。
    ///
    /// 命中时在放开目录锁之前就锁住槽位，其间没人能换出它；
    /// 未命中时在目录锁下决定新建槽位还是换出，同一扇区不会被装入两次。
    fn acquire(&self, sector: u32, load: bool) -> MutexGuard<'_, Slot> {
        let mut dir = self.directory.lock();

        if let Some(pos) = dir.position(sector) {
            let slot = self.slots[dir.entry(pos).slot].lock();
            drop(dir);
            debug_assert_eq!(slot.sector(), sector);
            self.counters.hits.fetch_add(1, atomic::Ordering::Relaxed);
            log::trace!("block cache: hit sector {sector}");

            return slot;
        }

        self.counters.misses.fetch_add(1, atomic::Ordering::Relaxed);
        let mut slot = if self.admission.try_down() {
            let index = dir.admit(sector);
            self.slots[index].lock()
        } else {
            let (pos, mut victim) = clock::find_victim(&self.slots, &mut dir);
            let old = victim.sector();
            // 目录锁下写回：否则别人可能从设备读到旧数据
            self.sync(&mut victim);
            dir.retarget(pos, sector);
            self.counters.evictions.fetch_add(1, atomic::Ordering::Relaxed);
            log::debug!("block cache: evicted sector {old} for sector {sector}");

            victim
        };
        drop(dir);

        // 装入期间其他访问者阻塞在槽位锁上
        slot.fill(sector, &*self.device, load);
        log::trace!("block cache: miss sector {sector}");

        slot
    }

    fn sync(&self, slot: &mut Slot) -> bool {
        let written = slot.sync(&*self.device);
        if written {
            self.counters.write_backs.fetch_add(1, atomic::Ordering::Relaxed);
        }
        written
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.flush_all();
    }
}

impl core::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
