//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块设备没有“部分失败”：驱动遇到 I/O 错误时应当直接 panic，
//! 上层的缓存没有冗余，无法从损坏的数据中恢复。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读取整个扇区到 `buf`
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// 以 `buf` 覆盖整个扇区
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
