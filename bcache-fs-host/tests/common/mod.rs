#![allow(dead_code)]

use std::sync::Arc;

use bcache_fs::{BLOCK_SIZE, BlockCache, CacheConfig, FreeMap, InodeIndexer, InodeTable};
use bcache_fs_host::RamDisk;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn cache_on(disk: &Arc<RamDisk>, capacity: usize) -> Arc<BlockCache> {
    init_logger();
    Arc::new(BlockCache::new(
        disk.clone(),
        CacheConfig::with_capacity(capacity),
    ))
}

/// 格式化好的一整套：设备、缓存、空闲扇区管理、索引层、打开表
pub struct Fs {
    pub disk: Arc<RamDisk>,
    pub cache: Arc<BlockCache>,
    pub free_map: Arc<FreeMap>,
    pub indexer: Arc<InodeIndexer>,
    pub table: InodeTable,
}

impl Fs {
    pub fn format(sectors: usize, capacity: usize) -> Self {
        let disk = Arc::new(RamDisk::new(sectors));
        let cache = cache_on(&disk, capacity);
        let free_map = Arc::new(FreeMap::format(cache.clone(), sectors));
        let indexer = Arc::new(InodeIndexer::new(cache.clone(), free_map.clone()));
        let table = InodeTable::new(indexer.clone());

        Self {
            disk,
            cache,
            free_map,
            indexer,
            table,
        }
    }
}

/// 每个扇区都能认出来的内容
pub fn pattern(seed: u32) -> [u8; BLOCK_SIZE] {
    let mut block = [0; BLOCK_SIZE];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = (seed as usize * 31 + i) as u8;
    }
    block
}

/// 线性同余伪随机数，测试结果可复现
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}
