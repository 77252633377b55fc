#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

/* bcache-fs 的整体架构，自上而下 */

// 打开文件层：共享的内存 inode 句柄
mod vfs;

// 索引层：字节偏移到扇区的翻译，以及文件增长
mod indexer;

// 空闲扇区管理
mod free_map;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的扇区缓存，时钟算法换出，后台写回
mod block_cache;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    block_cache::{BlockCache, CacheConfig, CacheStats, WriteBehind},
    error::Error,
    free_map::{FreeMap, SectorAllocator},
    indexer::InodeIndexer,
    layout::{DIRECT_COUNT, DiskInodeKind, INDIRECT_COUNT, MAX_FILE_SIZE},
    vfs::{Inode, InodeTable},
};

pub const INODE_MAGIC: u32 = 0x494e4f44;
pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 索引结构里表示“没有扇区”的哨兵，空闲扇区管理永远不会分配它
pub const NO_SECTOR: u32 = 0;

type DataBlock = [u8; BLOCK_SIZE];
