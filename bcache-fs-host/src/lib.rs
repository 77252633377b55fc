//! 在宿主机上运行 `bcache-fs`：文件和内存两种块设备，以及后台写回线程。

mod block_file;
mod ram_disk;
mod write_behind;

pub use self::{
    block_file::BlockFile,
    ram_disk::RamDisk,
    write_behind::{WriteBehindThread, spawn_write_behind},
};
