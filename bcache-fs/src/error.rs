use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 空闲扇区用尽
    NoSpace,
    /// 超出索引结构能表示的最大文件长度
    FileTooLarge { length: usize },
    /// 偏移越过了文件末尾
    OutOfBounds { offset: usize, length: usize },
    /// 扇区上不是合法的 inode：魔数或类型不对
    Corrupted { sector: u32 },
    /// 本应已分配的索引项却是空的
    DanglingIndex { block_index: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no free sector left"),
            Self::FileTooLarge { length } => {
                write!(f, "length {length} exceeds the maximum file size")
            }
            Self::OutOfBounds { offset, length } => {
                write!(f, "offset {offset} is beyond the file length {length}")
            }
            Self::Corrupted { sector } => write!(f, "sector {sector} does not hold a valid inode"),
            Self::DanglingIndex { block_index } => {
                write!(f, "block index {block_index} points to no sector")
            }
        }
    }
}
