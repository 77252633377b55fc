use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bcache_fs::BLOCK_SIZE;
use block_dev::BlockDevice;

/// 内存里的块设备，记录读写次数，也能绕过缓存直接查看扇区
#[derive(Debug)]
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; BLOCK_SIZE]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; BLOCK_SIZE]; sectors]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.sectors.lock().expect("ram disk poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 设备上的扇区内容，不经过缓存
    pub fn peek(&self, sector: u32) -> [u8; BLOCK_SIZE] {
        self.sectors.lock().expect("ram disk poisoned")[sector as usize]
    }

    /// 直接改写设备上的扇区，不经过缓存
    pub fn poke(&self, sector: u32, data: &[u8; BLOCK_SIZE]) {
        self.sectors.lock().expect("ram disk poisoned")[sector as usize] = *data;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let sectors = self.sectors.lock().expect("ram disk poisoned");
        let sector = sectors
            .get(block_id)
            .unwrap_or_else(|| panic!("read past the end of the ram disk: sector {block_id}"));
        buf[..BLOCK_SIZE].copy_from_slice(sector);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut sectors = self.sectors.lock().expect("ram disk poisoned");
        let sector = sectors
            .get_mut(block_id)
            .unwrap_or_else(|| panic!("write past the end of the ram disk: sector {block_id}"));
        sector.copy_from_slice(&buf[..BLOCK_SIZE]);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}
