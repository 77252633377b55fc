use block_dev::BlockDevice;

use crate::DataBlock;
use crate::{BLOCK_SIZE, NO_SECTOR};

/// 内存中的缓存槽位，容纳一个扇区
///
/// 槽位的数据和标志只能由持有其锁的线程修改。
#[derive(Debug)]
pub struct Slot {
    /// 缓存的数据
    data: DataBlock,
    /// 对应的扇区号，仅在槽位登记于目录中时有效
    sector: u32,
    /// 是否为脏块
    dirty: bool,
    /// 时钟位：最近被访问过
    clock_bit: bool,
}

impl Slot {
    pub const fn new() -> Self {
        Self {
            data: [0; BLOCK_SIZE],
            sector: NO_SECTOR,
            dirty: false,
            clock_bit: false,
        }
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// 改为缓存 `sector`；`load` 为假时不读设备，调用者会覆盖整个扇区
    pub fn fill(&mut self, sector: u32, device: &dyn BlockDevice, load: bool) {
        assert!(!self.dirty, "refilling dirty slot of sector {}", self.sector);
        self.sector = sector;
        self.clock_bit = false;
        if load {
            device.read_block(sector as usize, &mut self.data);
        }
    }

    /// 脏块写回设备，返回是否真的写了
    pub fn sync(&mut self, device: &dyn BlockDevice) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        device.write_block(self.sector as usize, &self.data);
        true
    }

    pub fn read(&mut self, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        self.clock_bit = true;
    }

    pub fn write(&mut self, offset: usize, buf: &[u8]) {
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
        self.dirty = true;
        self.clock_bit = true;
    }

    /// 时钟扫描经过此槽位：时钟位置位则清零并放过它（返回真），否则它就是牺牲者
    #[inline]
    pub fn second_chance(&mut self) -> bool {
        core::mem::replace(&mut self.clock_bit, false)
    }

    /// 槽位离开目录，回到空闲状态
    pub fn reset(&mut self) {
        assert!(!self.dirty, "freeing dirty slot of sector {}", self.sector);
        self.sector = NO_SECTOR;
        self.clock_bit = false;
    }

    #[cfg(test)]
    pub fn touch(&mut self) {
        self.clock_bit = true;
    }
}
