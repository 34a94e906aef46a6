//! # 磁盘数据结构层
//!
//! arcofs 的磁盘布局（块大小 1024 字节）：
//! 保留块 | 超级块 | 数据块字节图 | 索引节点字节图 | 索引节点表 | 数据块区域
//!
//! 所有结构都按固定偏移显式编码为小端字节，不在缓冲区上做类型重解释。

mod super_block;
pub use super_block::{RESERVED_INODES, SuperBlock};

mod bytemap;
pub use bytemap::{Bytemap, Slot};

mod inode;
pub use inode::{DiskInode, DiskInodeKind};

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

#[inline]
fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
