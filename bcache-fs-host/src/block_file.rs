use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use bcache_fs::BLOCK_SIZE;
use block_dev::BlockDevice;

/// 以宿主机上的普通文件充当块设备
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(file: File) -> Self {
        Self(Mutex::new(file))
    }

    /// 创建（或截断）`path`，大小为 `sectors` 个扇区，内容全零
    pub fn create(path: impl AsRef<Path>, sectors: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((sectors * BLOCK_SIZE) as u64)?;

        Ok(Self::new(file))
    }

    /// 打开已有的镜像
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(file))
    }

    pub fn sectors(&self) -> io::Result<usize> {
        let len = self.0.lock().expect("block file poisoned").metadata()?.len();
        Ok(len as usize / BLOCK_SIZE)
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().expect("block file poisoned");
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(&mut buf[..BLOCK_SIZE])
            .expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().expect("block file poisoned");
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(&buf[..BLOCK_SIZE])
            .expect("not a complete block!");
    }
}
