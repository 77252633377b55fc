//! 缓存目录：扇区到槽位的映射
//!
//! 目录项首尾相接组成一个环，时钟指针在环上转动；
//! 目录的成员和时钟指针只能在持有目录锁时修改。

use alloc::vec::Vec;

/// 目录项：扇区号及缓存它的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub sector: u32,
    pub slot: usize,
}

#[derive(Debug)]
pub struct Directory {
    /// 按时钟顺序排列的目录项
    entries: Vec<Entry>,
    /// 时钟指针：`entries` 中下一个被检查的位置
    hand: usize,
    /// 不在目录中的空闲槽位
    free: Vec<usize>,
}

impl Directory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            hand: 0,
            // 倒序存放，先分配编号小的槽位
            free: (0..capacity).rev().collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// 线性查找缓存 `sector` 的目录项位置
    pub fn position(&self, sector: u32) -> Option<usize> {
        self.entries.iter().position(|entry| entry.sector == sector)
    }

    #[inline]
    pub fn entry(&self, pos: usize) -> Entry {
        self.entries[pos]
    }

    /// 时钟指针当前指向的位置及目录项
    #[inline]
    pub fn current(&self) -> (usize, Entry) {
        (self.hand, self.entries[self.hand])
    }

    /// 时钟指针前进一格，越过环尾回到环首
    #[inline]
    pub fn advance(&mut self) {
        self.hand = (self.hand + 1) % self.entries.len();
    }

    /// 取出一个空闲槽位缓存 `sector`，插到时钟指针之前，返回槽位编号。
    ///
    /// 新项要等时钟转满一圈才会被检查。
    pub fn admit(&mut self, sector: u32) -> usize {
        let slot = self.free.pop().expect("admitted without a free slot");
        let entry = Entry { sector, slot };

        if self.entries.is_empty() {
            self.entries.push(entry);
            self.hand = 0;
        } else {
            self.entries.insert(self.hand, entry);
            // 指针保持指向原来的项
            self.hand += 1;
        }

        slot
    }

    /// 原地改换目录项缓存的扇区，不动目录结构
    #[inline]
    pub fn retarget(&mut self, pos: usize, sector: u32) {
        self.entries[pos].sector = sector;
    }

    /// 移除目录项，其槽位回到空闲表
    pub fn remove(&mut self, pos: usize) -> Entry {
        let entry = self.entries.remove(pos);
        if pos < self.hand {
            self.hand -= 1;
        }
        if self.hand >= self.entries.len() {
            self.hand = 0;
        }
        self.free.push(entry.slot);

        entry
    }
}
