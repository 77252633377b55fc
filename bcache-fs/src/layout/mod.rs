//! # 磁盘数据结构层
//!
//! 磁盘布局：
//! 保留扇区 0 | 空闲位图 | 其余扇区（inode、索引块、数据块混用）
//!
//! 所有结构都按小端序逐字段编解码，整扇区读写。

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DIRECT_COUNT, DiskInode, DiskInodeKind, INDIRECT_COUNT, MAX_FILE_SIZE};

/// 取出第 `index` 个小端 u32
#[inline]
fn word(bytes: &[u8], index: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[index * 4..index * 4 + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn put_word(bytes: &mut [u8], index: usize, value: u32) {
    bytes[index * 4..index * 4 + 4].copy_from_slice(&value.to_le_bytes());
}
