//! # 空闲扇区管理
//!
//! 索引层通过 [`SectorAllocator`] 申请新扇区。[`FreeMap`] 是它的位图实现：
//! 位图本身存放在磁盘上，经由块缓存读写。

use alloc::sync::Arc;

use spin::Mutex;

use crate::layout::Bitmap;
use crate::{BLOCK_BITS, BlockCache, NO_SECTOR};

/// 空闲扇区分配器
///
/// 同一个扇区绝不会同时交给两个调用者。
pub trait SectorAllocator: Send + Sync {
    /// 分配 `count` 个连续扇区，返回首个扇区号；空间用尽时返回空
    fn allocate(&self, count: usize) -> Option<u32>;
    /// 归还从 `sector` 开始的 `count` 个扇区
    fn release(&self, sector: u32, count: usize);
}

/// 位图空闲扇区管理，扇区 0 保留，位图紧随其后
#[derive(Debug)]
pub struct FreeMap {
    cache: Arc<BlockCache>,
    bitmap: Mutex<Bitmap>,
    total_sectors: usize,
}

impl FreeMap {
    /// 位图的起始扇区
    pub const START_SECTOR: u32 = NO_SECTOR + 1;

    /// 指示 `total_sectors` 个扇区需要的位图扇区数
    #[inline]
    pub fn bitmap_sectors(total_sectors: usize) -> usize {
        total_sectors.div_ceil(BLOCK_BITS)
    }

    /// 在设备上建立全新的位图：除保留扇区和位图本身外全部空闲
    pub fn format(cache: Arc<BlockCache>, total_sectors: usize) -> Self {
        let bitmap_sectors = Self::bitmap_sectors(total_sectors);
        let reserved = Self::START_SECTOR as usize + bitmap_sectors;
        assert!(reserved < total_sectors, "device too small for a free map");

        let bitmap = Bitmap::new(Self::START_SECTOR, bitmap_sectors);
        bitmap.zero(&cache);
        bitmap.reserve(&cache, 0, reserved);
        log::debug!(
            "free map: formatted {total_sectors} sectors, {} free",
            total_sectors - reserved
        );

        Self {
            cache,
            bitmap: Mutex::new(bitmap),
            total_sectors,
        }
    }

    /// 使用设备上已有的位图
    pub fn open(cache: Arc<BlockCache>, total_sectors: usize) -> Self {
        let bitmap = Bitmap::new(Self::START_SECTOR, Self::bitmap_sectors(total_sectors));
        Self {
            cache,
            bitmap: Mutex::new(bitmap),
            total_sectors,
        }
    }

    #[inline]
    pub fn total_sectors(&self) -> usize {
        self.total_sectors
    }

    pub fn is_allocated(&self, sector: u32) -> bool {
        self.bitmap.lock().test(&self.cache, sector as usize)
    }

    pub fn free_sectors(&self) -> usize {
        self.bitmap
            .lock()
            .count_free(&self.cache, self.total_sectors)
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self, count: usize) -> Option<u32> {
        let sector = self
            .bitmap
            .lock()
            .alloc(&self.cache, count, self.total_sectors)?;
        log::trace!("free map: allocated {count} sectors at {sector}");
        Some(sector as u32)
    }

    fn release(&self, sector: u32, count: usize) {
        assert_ne!(sector, NO_SECTOR, "releasing the reserved sector");
        self.bitmap
            .lock()
            .dealloc(&self.cache, sector as usize, count);
        log::trace!("free map: released {count} sectors at {sector}");
    }
}
