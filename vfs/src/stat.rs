use crate::DirEntryType;

/// 单个文件的元信息
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct Stat {
    /// Inode number
    pub inode: u64,
    pub mode: DirEntryType,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying blocks
    pub blocks: u64,
    /// File size
    pub size: u64,
}

/// 整个文件系统的容量信息，对应宿主的 statfs 查询
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub magic: u32,
    pub block_size: u64,
    /// Data blocks
    pub blocks: u64,
    pub free_blocks: u64,
    /// Inode slots
    pub inodes: u64,
    pub free_inodes: u64,
}

impl StatFs {
    /// 已被占用的 inode 数
    #[inline]
    pub fn used_inodes(&self) -> u64 {
        self.inodes - self.free_inodes
    }
}
