//! # 索引层
//!
//! 以 inode 所在扇区号指代 inode，把文件内的字节偏移翻译成扇区号，
//! 并负责文件的增长与回收。所有读写都经过块缓存，
//! 索引块和数据块一样只是普通的缓存扇区。
//!
//! 改写 inode 扇区的操作（建立、增长、回收）由增长锁串行化，
//! 数据块的读写不受它约束。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::error::Error;
use crate::layout::{DiskInode, DiskInodeKind, MAX_FILE_SIZE};
use crate::{BLOCK_SIZE, BlockCache, SectorAllocator};

pub struct InodeIndexer {
    cache: Arc<BlockCache>,
    allocator: Arc<dyn SectorAllocator>,
    /// inode 扇区的读出、修改、写回必须一气呵成
    growth: Mutex<()>,
}

impl InodeIndexer {
    #[inline]
    pub fn new(cache: Arc<BlockCache>, allocator: Arc<dyn SectorAllocator>) -> Self {
        Self {
            cache,
            allocator,
            growth: Mutex::new(()),
        }
    }

    #[inline]
    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    /// 在 `sector` 上建立 `kind` 类型的 inode，并增长到 `length` 字节，数据全为零
    pub fn create(&self, sector: u32, length: usize, kind: DiskInodeKind) -> Result<(), Error> {
        let _growth = self.growth.lock();
        self.store(sector, &DiskInode::new(kind));
        self.grow(sector, length)
    }

    /// 偏移 `offset` 处的字节所在的扇区
    pub fn resolve(&self, sector: u32, offset: usize) -> Result<u32, Error> {
        let disk_inode = self.load(sector)?;
        let length = disk_inode.length as usize;
        if offset >= length {
            return Err(Error::OutOfBounds { offset, length });
        }

        disk_inode.block_id(offset / BLOCK_SIZE, &self.cache)
    }

    /// 把 inode 增长到 `new_length` 字节；不会缩短文件。
    ///
    /// 所需扇区一次申请齐全，申请不到就原样归还，inode 保持不变。
    pub fn extend(&self, sector: u32, new_length: usize) -> Result<(), Error> {
        let _growth = self.growth.lock();
        self.grow(sector, new_length)
    }

    pub fn length(&self, sector: u32) -> Result<usize, Error> {
        self.load(sector)
            .map(|disk_inode| disk_inode.length as usize)
    }

    pub fn is_directory(&self, sector: u32) -> Result<bool, Error> {
        self.load(sector).map(|disk_inode| disk_inode.is_dir())
    }

    /// 从 `offset` 读到 `buf` 满或文件末尾
    pub fn read_at(&self, sector: u32, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        self.load(sector)?.read_at(offset, buf, &self.cache)
    }

    /// 写入 `buf`，越过文件末尾时先增长文件
    pub fn write_at(&self, sector: u32, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.extend(sector, offset + buf.len())?;
        self.load(sector)?.write_at(offset, buf, &self.cache)
    }

    /// 回收 inode 占有的全部扇区，包括 inode 本身；它们同时被逐出缓存
    pub fn release(&self, sector: u32) -> Result<(), Error> {
        let _growth = self.growth.lock();
        let mut disk_inode = self.load(sector)?;
        let mut sectors = disk_inode.clear(&self.cache);
        sectors.push(sector);

        for &sector in &sectors {
            self.cache.release(sector);
            self.allocator.release(sector, 1);
        }
        log::debug!("inode {sector}: released {} sectors", sectors.len());

        Ok(())
    }

    /// 读出并校验 inode
    pub(crate) fn load(&self, sector: u32) -> Result<DiskInode, Error> {
        let mut block = [0; BLOCK_SIZE];
        self.cache.read(sector, 0, &mut block);
        DiskInode::decode(sector, &block)
    }
}

impl InodeIndexer {
    /// 调用者持有增长锁
    fn grow(&self, sector: u32, new_length: usize) -> Result<(), Error> {
        let mut disk_inode = self.load(sector)?;
        let length = disk_inode.length as usize;
        if new_length <= length {
            return Ok(());
        }
        if new_length > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge { length: new_length });
        }

        let needed =
            DiskInode::count_total_block(new_length) - DiskInode::count_total_block(length);
        let new_blocks = self.allocate(needed)?;

        // 传进去的是一批未初始化扇区
        if let Err(err) = disk_inode.expand_to(new_length, &new_blocks, &self.cache) {
            log::warn!("inode {sector}: cannot grow past a dangling index, {err}");
            self.give_back(new_blocks);
            return Err(err);
        }
        self.store(sector, &disk_inode);
        log::debug!("inode {sector}: extended {length} -> {new_length} bytes, {needed} new sectors");

        Ok(())
    }

    fn store(&self, sector: u32, disk_inode: &DiskInode) {
        self.cache.write(sector, 0, &disk_inode.encode());
    }

    /// 逐个申请 `count` 个扇区，全部成功或全部归还
    fn allocate(&self, count: usize) -> Result<Vec<u32>, Error> {
        let mut sectors = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(sector) = self.allocator.allocate(1) else {
                log::debug!("indexer: out of space after {} of {count} sectors", sectors.len());
                self.give_back(sectors);
                return Err(Error::NoSpace);
            };
            sectors.push(sector);
        }

        Ok(sectors)
    }

    fn give_back(&self, sectors: Vec<u32>) {
        for sector in sectors {
            self.allocator.release(sector, 1);
        }
    }
}
