//! 磁盘上的 inode，恰好占据一个扇区，扇区号即 inode 号。
//!
//! 间接索引块
//! - 一级：整个块连续存储**扇区号**，每个编号都指向一个**数据块**
//! - 二级：整个块连续存储**扇区号**，每个编号都指向一个一级索引块
//!
//! 索引块本身就是普通的缓存扇区，读写都经过块缓存。
//!
//! ## 块索引编码
//!
//! - 二级内的索引除以一级块的**可编号数量**，可得一级块在二级块中的位置
//! - 二级内的索引模一级块的**可编号数量**，可得一级块的内部索引

use alloc::vec::Vec;
use core::mem;

use super::{put_word, word};
use crate::error::Error;
use crate::{BLOCK_SIZE, BlockCache, DataBlock, INODE_MAGIC, NO_SECTOR};

/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / 4;

/// 直接索引可编号数量
pub const DIRECT_COUNT: usize = 123;
/// 一级索引块可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = INDIRECT2_CAP * BLOCK_SIZE;

/// 新分配扇区的初始内容
const ZERO_BLOCK: DataBlock = [0; BLOCK_SIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    /// 类型
    pub kind: DiskInodeKind,
    // 不用usize是为了严控布局
    pub length: u32,
    /// 直接索引，包含 DIRECT_COUNT 个扇区号，
    /// 存储容量：DIRECT_CAP * BLOCK_SIZE 字节
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect1: u32,
    /// 指向一个二级索引块
    indirect2: u32,
    /// 魔数：用于校验扇区上确实是 inode
    magic: u32,
}

const _: () = assert!(mem::size_of::<DiskInode>() == BLOCK_SIZE);

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum DiskInodeKind {
    #[default]
    File = 0,
    Directory = 1,
}

/* 各字段在扇区中的字偏移 */
const KIND_WORD: usize = 0;
const LENGTH_WORD: usize = 1;
const DIRECT_WORD: usize = 2;
const INDIRECT1_WORD: usize = DIRECT_WORD + DIRECT_COUNT;
const INDIRECT2_WORD: usize = INDIRECT1_WORD + 1;
const MAGIC_WORD: usize = INDIRECT2_WORD + 1;

impl DiskInode {
    /// 空的 inode，长度为 0
    pub fn new(kind: DiskInodeKind) -> Self {
        Self {
            kind,
            length: 0,
            direct: [NO_SECTOR; DIRECT_COUNT],
            indirect1: NO_SECTOR,
            indirect2: NO_SECTOR,
            magic: INODE_MAGIC,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    /// 从 `sector` 的内容解出 inode，魔数、类型或长度不对即视为损坏
    pub fn decode(sector: u32, block: &DataBlock) -> Result<Self, Error> {
        if word(block, MAGIC_WORD) != INODE_MAGIC {
            return Err(Error::Corrupted { sector });
        }
        // 超出索引结构的长度会让二级索引越过索引块末尾
        if word(block, LENGTH_WORD) as usize > MAX_FILE_SIZE {
            return Err(Error::Corrupted { sector });
        }
        let kind = match word(block, KIND_WORD) {
            0 => DiskInodeKind::File,
            1 => DiskInodeKind::Directory,
            _ => return Err(Error::Corrupted { sector }),
        };

        Ok(Self {
            kind,
            length: word(block, LENGTH_WORD),
            direct: core::array::from_fn(|i| word(block, DIRECT_WORD + i)),
            indirect1: word(block, INDIRECT1_WORD),
            indirect2: word(block, INDIRECT2_WORD),
            magic: INODE_MAGIC,
        })
    }

    pub fn encode(&self) -> DataBlock {
        let mut block = ZERO_BLOCK;
        put_word(&mut block, KIND_WORD, self.kind as u32);
        put_word(&mut block, LENGTH_WORD, self.length);
        for (i, &sector) in self.direct.iter().enumerate() {
            put_word(&mut block, DIRECT_WORD + i, sector);
        }
        put_word(&mut block, INDIRECT1_WORD, self.indirect1);
        put_word(&mut block, INDIRECT2_WORD, self.indirect2);
        put_word(&mut block, MAGIC_WORD, self.magic);

        block
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 然后返回给**块缓存层**使用的扇区号。
    ///
    /// 索引必须落在当前长度之内，否则表项未定义。
    pub fn block_id(&self, block_index: usize, cache: &BlockCache) -> Result<u32, Error> {
        debug_assert!(block_index < Self::count_data_block(self.length as usize));

        let sector = if block_index < DIRECT_CAP {
            self.direct[block_index]
        } else if block_index < INDIRECT1_CAP {
            let indirect1 = present(self.indirect1, block_index)?;
            // 剔去直接索引的部分
            read_entry(cache, indirect1, block_index - DIRECT_CAP)
        } else {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;

            let indirect2 = present(self.indirect2, block_index)?;
            let indirect1 = read_entry(cache, indirect2, index / INDIRECT1_COUNT);
            read_entry(cache, present(indirect1, block_index)?, index % INDIRECT1_COUNT)
        };

        present(sector, block_index)
    }

    /// 把长度扩展到 `larger_length`。
    ///
    /// `new_blocks` 是一批刚分配的扇区，个数恰好等于新增的数据块加索引块；
    /// 它们全部在这里清零，索引块在首次需要时才启用。
    ///
    /// 增长要接着使用的已有索引块若是空的，返回错误且什么也不写，
    /// `new_blocks` 原样留给调用者归还。
    pub fn expand_to(
        &mut self,
        larger_length: usize,
        new_blocks: &[u32],
        cache: &BlockCache,
    ) -> Result<(), Error> {
        assert!(larger_length <= MAX_FILE_SIZE);
        assert_eq!(
            new_blocks.len(),
            Self::count_total_block(larger_length) - Self::count_total_block(self.length as usize)
        );

        let old_total = Self::count_data_block(self.length as usize);
        let new_total = Self::count_data_block(larger_length);
        if new_total > old_total {
            self.check_growth_path(old_total, cache)?;
        }
        let mut new_blocks = new_blocks.iter().copied();
        let mut take = || {
            let sector = new_blocks.next().expect("ran out of preallocated sectors");
            cache.write(sector, 0, &ZERO_BLOCK);
            sector
        };

        for block_index in old_total..new_total {
            /******************** 直接索引 ********************/
            if block_index < DIRECT_CAP {
                self.direct[block_index] = take();
                continue;
            }

            /******************** 一级索引 ********************/
            if block_index < INDIRECT1_CAP {
                // 这次增长经过了 DIRECT_CAP，创建一级索引
                if block_index == DIRECT_CAP {
                    self.indirect1 = take();
                }
                let data = take();
                write_entry(cache, self.indirect1, block_index - DIRECT_CAP, data);
                continue;
            }

            /******************** 二级索引 ********************/
            let index = block_index - INDIRECT1_CAP;
            // 这次增长经过了 INDIRECT1_CAP，创建二级索引
            if index == 0 {
                self.indirect2 = take();
            }

            let index2 = index / INDIRECT1_COUNT;
            let index1 = index % INDIRECT1_COUNT;
            // 子块索引为0表示进入新的一级块
            let indirect1 = if index1 == 0 {
                let indirect1 = take();
                write_entry(cache, self.indirect2, index2, indirect1);
                indirect1
            } else {
                read_entry(cache, self.indirect2, index2)
            };
            let data = take();
            write_entry(cache, indirect1, index1, data);
        }

        self.length = larger_length as u32;

        Ok(())
    }

    /// 第 `block_index` 个数据块将挂在哪些已有索引块上，逐一确认它们存在
    fn check_growth_path(&self, block_index: usize, cache: &BlockCache) -> Result<(), Error> {
        if block_index > DIRECT_CAP && block_index < INDIRECT1_CAP {
            present(self.indirect1, block_index)?;
        } else if block_index > INDIRECT1_CAP {
            let indirect2 = present(self.indirect2, block_index)?;
            let index = block_index - INDIRECT1_CAP;
            // 一级块已开了头，后续项接着写进去
            if index % INDIRECT1_COUNT != 0 {
                present(read_entry(cache, indirect2, index / INDIRECT1_COUNT), block_index)?;
            }
        }

        Ok(())
    }

    /// 清空 inode，返回它占有的全部扇区：数据块和各级索引块。
    ///
    /// 尽力而为：遇到本应存在却为空的索引项，记录泄漏并跳过。
    pub fn clear(&mut self, cache: &BlockCache) -> Vec<u32> {
        let data_blocks = Self::count_data_block(self.length as usize);
        let mut sectors = Vec::with_capacity(Self::count_total_block(self.length as usize));
        self.length = 0;

        /******************** 直接索引 ********************/
        sectors.extend_from_slice(&self.direct[..data_blocks.min(DIRECT_CAP)]);
        self.direct.fill(NO_SECTOR);

        /******************** 一级索引 ********************/
        if data_blocks > DIRECT_CAP {
            let count = (data_blocks - DIRECT_CAP).min(INDIRECT1_COUNT);
            collect_table(cache, self.indirect1, count, &mut sectors);
        }
        self.indirect1 = NO_SECTOR;

        /******************** 二级索引 ********************/
        if data_blocks > INDIRECT1_CAP {
            let data_blocks = data_blocks - INDIRECT1_CAP;
            let tables = data_blocks.div_ceil(INDIRECT1_COUNT);

            // 二级索引块丢了，整棵树都找不回来
            if !leaked(self.indirect2, "double indirect") {
                sectors.push(self.indirect2);
                for index2 in 0..tables {
                    let indirect1 = read_entry(cache, self.indirect2, index2);
                    let count = (data_blocks - index2 * INDIRECT1_COUNT).min(INDIRECT1_COUNT);
                    collect_table(cache, indirect1, count, &mut sectors);
                }
            }
        }
        self.indirect2 = NO_SECTOR;

        sectors.retain(|&sector| !leaked(sector, "data"));
        sectors
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，读到文件末尾为止
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        cache: &BlockCache,
    ) -> Result<usize, Error> {
        let mut start = offset;
        let end = (start + buf.len()).min(self.length as usize);

        if start >= end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引，见 `DiskInode::block_id`
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;

            cache.read(
                self.block_id(block_index, cache)?,
                // 绝对地址 % 块大小 = 块内偏移
                start % BLOCK_SIZE,
                &mut buf[read_size..read_size + block_read_size],
            );
            read_size += block_read_size;

            if current_block_end == end {
                break;
            }
            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 写入不会越过当前长度，增长由调用者先行完成
    pub fn write_at(
        &self,
        offset: usize,
        buf: &[u8],
        cache: &BlockCache,
    ) -> Result<usize, Error> {
        let mut start = offset;
        let end = (start + buf.len()).min(self.length as usize);

        if start >= end {
            return Ok(0);
        }

        let mut written_size = 0;
        loop {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            cache.write(
                self.block_id(block_index, cache)?,
                start % BLOCK_SIZE,
                &buf[written_size..written_size + block_write_size],
            );
            written_size += block_write_size;

            if current_block_end == end {
                break;
            }
            start = current_block_end;
        }

        Ok(written_size)
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(length: usize) -> usize {
        length.div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**
    pub fn count_total_block(length: usize) -> usize {
        let data_blocks = Self::count_data_block(length);
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引块及其下的一级索引块
        if data_blocks > INDIRECT1_CAP {
            total += 1 + (data_blocks - INDIRECT1_CAP).div_ceil(INDIRECT1_COUNT);
        }

        total
    }
}

/// 索引块中的第 `index` 项
fn read_entry(cache: &BlockCache, table: u32, index: usize) -> u32 {
    let mut raw = [0; 4];
    cache.read(table, index * 4, &mut raw);
    u32::from_le_bytes(raw)
}

fn write_entry(cache: &BlockCache, table: u32, index: usize, sector: u32) {
    cache.write(table, index * 4, &sector.to_le_bytes());
}

#[inline]
fn present(sector: u32, block_index: usize) -> Result<u32, Error> {
    if sector == NO_SECTOR {
        Err(Error::DanglingIndex { block_index })
    } else {
        Ok(sector)
    }
}

fn leaked(sector: u32, what: &str) -> bool {
    if sector == NO_SECTOR {
        log::warn!("inode clear: missing {what} sector, its subtree is leaked");
    }
    sector == NO_SECTOR
}

/// 收集一级索引块本身及其前 `count` 项
fn collect_table(cache: &BlockCache, table: u32, count: usize, sectors: &mut Vec<u32>) {
    if leaked(table, "indirect") {
        return;
    }
    sectors.push(table);
    sectors.extend((0..count).map(|index| read_entry(cache, table, index)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_fills_one_sector() {
        assert_eq!(MAGIC_WORD, BLOCK_SIZE / 4 - 1);
        assert_eq!(MAX_FILE_SIZE, (123 + 128 + 128 * 128) * 512);
    }

    #[test]
    fn encode_then_decode() {
        let mut inode = DiskInode::new(DiskInodeKind::Directory);
        inode.length = 4242;
        inode.direct[0] = 17;
        inode.direct[DIRECT_COUNT - 1] = 99;
        inode.indirect1 = 1234;
        inode.indirect2 = 5678;

        let block = inode.encode();
        assert_eq!(word(&block, MAGIC_WORD), INODE_MAGIC);
        assert_eq!(DiskInode::decode(3, &block), Ok(inode));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut block = DiskInode::new(DiskInodeKind::File).encode();
        put_word(&mut block, MAGIC_WORD, 0xdead_beef);
        assert_eq!(DiskInode::decode(8, &block), Err(Error::Corrupted { sector: 8 }));

        let zeroed = ZERO_BLOCK;
        assert_eq!(DiskInode::decode(9, &zeroed), Err(Error::Corrupted { sector: 9 }));
    }

    #[test]
    fn bad_kind_is_corruption() {
        let mut block = DiskInode::new(DiskInodeKind::File).encode();
        put_word(&mut block, KIND_WORD, 7);
        assert_eq!(DiskInode::decode(1, &block), Err(Error::Corrupted { sector: 1 }));
    }

    #[test]
    fn oversized_length_is_corruption() {
        let mut block = DiskInode::new(DiskInodeKind::File).encode();
        put_word(&mut block, LENGTH_WORD, (MAX_FILE_SIZE + 1) as u32);
        assert_eq!(DiskInode::decode(2, &block), Err(Error::Corrupted { sector: 2 }));

        put_word(&mut block, LENGTH_WORD, MAX_FILE_SIZE as u32);
        assert_eq!(
            DiskInode::decode(2, &block).map(|inode| inode.length as usize),
            Ok(MAX_FILE_SIZE)
        );
    }

    #[test]
    fn total_block_count() {
        let count = DiskInode::count_total_block;
        assert_eq!(count(0), 0);
        assert_eq!(count(1), 1);
        assert_eq!(count(DIRECT_CAP * BLOCK_SIZE), DIRECT_CAP);
        // 第一个数据块进入一级索引，多出一级索引块
        assert_eq!(count(DIRECT_CAP * BLOCK_SIZE + 1), DIRECT_CAP + 2);
        assert_eq!(count(INDIRECT1_CAP * BLOCK_SIZE), INDIRECT1_CAP + 1);
        // 进入二级索引：二级块加第一个一级块
        assert_eq!(count(INDIRECT1_CAP * BLOCK_SIZE + 1), INDIRECT1_CAP + 1 + 3);
        assert_eq!(
            count((INDIRECT1_CAP + INDIRECT1_COUNT + 1) * BLOCK_SIZE),
            INDIRECT1_CAP + INDIRECT1_COUNT + 1 + 1 + 1 + 2
        );
        assert_eq!(count(MAX_FILE_SIZE), INDIRECT2_CAP + 1 + 1 + INDIRECT1_COUNT);
    }
}
