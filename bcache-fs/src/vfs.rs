//! # 打开文件层
//!
//! 内存中的 inode 句柄。同一扇区只有一个句柄，由所有打开者共享；
//! 最后一个打开者关闭时句柄消失，若 inode 已被删除，则回收其全部扇区。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::error::Error;
use crate::indexer::InodeIndexer;

/// 已打开 inode 的登记表
pub struct InodeTable {
    indexer: Arc<InodeIndexer>,
    open_inodes: Mutex<Vec<Arc<Inode>>>,
}

pub struct Inode {
    /// inode 所在扇区，即 inode 号
    sector: u32,
    indexer: Arc<InodeIndexer>,
    state: Mutex<OpenState>,
}

#[derive(Debug)]
struct OpenState {
    /// 打开者个数
    open_count: usize,
    /// 已删除，最后关闭时回收
    removed: bool,
    /// 大于 0 时拒绝写入
    deny_write_count: usize,
}

impl InodeTable {
    pub fn new(indexer: Arc<InodeIndexer>) -> Self {
        Self {
            indexer,
            open_inodes: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn indexer(&self) -> &Arc<InodeIndexer> {
        &self.indexer
    }

    /// 打开 `sector` 上的 inode；已打开的直接共享同一句柄
    pub fn open(&self, sector: u32) -> Result<Arc<Inode>, Error> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.iter().find(|inode| inode.sector == sector) {
            return Ok(inode.reopen());
        }

        // 确认扇区上确实是 inode
        self.indexer.load(sector)?;
        let inode = Arc::new(Inode {
            sector,
            indexer: self.indexer.clone(),
            state: Mutex::new(OpenState {
                open_count: 1,
                removed: false,
                deny_write_count: 0,
            }),
        });
        open_inodes.push(inode.clone());

        Ok(inode)
    }

    /// 关闭一次打开；最后一次关闭已删除的 inode 时回收其全部扇区
    pub fn close(&self, inode: Arc<Inode>) -> Result<(), Error> {
        let mut open_inodes = self.open_inodes.lock();

        let removed = {
            let mut state = inode.state.lock();
            assert!(state.open_count > 0, "inode {} closed too often", inode.sector);
            state.open_count -= 1;
            if state.open_count > 0 {
                return Ok(());
            }
            state.removed
        };

        open_inodes.retain(|open| !Arc::ptr_eq(open, &inode));
        drop(open_inodes);

        if removed {
            self.indexer.release(inode.sector)?;
        }

        Ok(())
    }

    /// 当前打开着的不同 inode 个数
    pub fn len(&self) -> usize {
        self.open_inodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inode {
    /// 再打开一次，与原句柄共享
    pub fn reopen(self: &Arc<Self>) -> Arc<Self> {
        self.state.lock().open_count += 1;
        Arc::clone(self)
    }

    #[inline]
    pub fn inumber(&self) -> u32 {
        self.sector
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// 标记删除，等最后一个打开者关闭时再回收
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        self.indexer.read_at(self.sector, offset, buf)
    }

    /// 写入 `buf`，必要时增长文件；拒绝写入期间什么也不写
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        if self.state.lock().deny_write_count > 0 {
            return Ok(0);
        }
        self.indexer.write_at(self.sector, offset, buf)
    }

    /// 每个打开者最多调用一次
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        assert!(state.deny_write_count <= state.open_count);
    }

    /// 调用过 `deny_write` 的打开者必须在关闭前调用一次
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_count > 0);
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    pub fn length(&self) -> Result<usize, Error> {
        self.indexer.length(self.sector)
    }

    pub fn is_dir(&self) -> Result<bool, Error> {
        self.indexer.is_directory(self.sector)
    }
}
