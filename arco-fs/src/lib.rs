#![no_std]

extern crate alloc;

/* arcofs 的整体架构，自上而下 */

// 索引节点层：文件创建、查找、读写、删除与列目录
mod vfs;

// 磁盘块管理器层：格式化、挂载、分配与回收
mod afs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    afs::ArcoFileSystem,
    error::{Error, Result},
    layout::{Slot, SuperBlock},
    vfs::{Directory, Inode, Listing, RegularFile},
};

pub const MAGIC: u32 = 0x27266673;
pub const BLOCK_SIZE: usize = 1024;

/// 0号块保留给引导扇区
pub const BOOT_BLOCK_ID: usize = 0;
pub const SUPER_BLOCK_ID: usize = 1;
pub const BLOCK_MAP_ID: usize = 2;
pub const INODE_MAP_ID: usize = 3;
pub const INODE_TABLE_ID: usize = 4;
/// 数据区的起始块
pub const DATA_START_BLOCK: usize = 5;
/// 至少要有一个数据块
pub const MIN_BLOCKS: usize = DATA_START_BLOCK + 1;
pub const MIN_DEVICE_SIZE: usize = MIN_BLOCKS * BLOCK_SIZE;

/// 字节图的项数：一块，一字节一项
pub const BYTEMAP_CAP: usize = BLOCK_SIZE;

/// 直接索引个数
pub const DIRECT_COUNT: usize = 8;
/// 文件大小上限
pub const MAX_FILE_SIZE: usize = DIRECT_COUNT * BLOCK_SIZE;
/// 文件名最长字节数，不含结尾的 \0
pub const NAME_MAX_LEN: usize = 11;

pub const INODE_SIZE: usize = 64;
/// inode 表只占一块
pub const INODE_COUNT: usize = BLOCK_SIZE / INODE_SIZE;
/// 根目录的 inode 编号，即 "." 所在槽位
pub const ROOT_INODE_ID: u32 = 1;

type DataBlock = [u8; BLOCK_SIZE];
