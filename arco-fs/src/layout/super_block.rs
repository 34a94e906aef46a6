use super::{read_u32, write_u32};
use crate::{BYTEMAP_CAP, DATA_START_BLOCK, DataBlock, Error, INODE_COUNT, MAGIC, Result};

/// 字段偏移
const MAGIC_OFFSET: usize = 0;
const INODES_OFFSET: usize = 4;
const FREE_INODES_OFFSET: usize = 8;
const BLOCKS_OFFSET: usize = 12;
const FREE_BLOCKS_OFFSET: usize = 16;
/// 之后直到块尾都是填充
const ENCODED_SIZE: usize = 20;

/// 格式化时预先占用的 inode："." 与 ".."
pub const RESERVED_INODES: u32 = 2;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录 inode 与数据块的容量和空闲数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// inode 槽位总数
    pub inodes: u32,
    pub free_inodes: u32,
    /// 数据块总数
    pub blocks: u32,
    pub free_blocks: u32,
}

impl SuperBlock {
    /// 刚格式化的超级块：数据块全部空闲，inode 只占去根目录的两项
    #[inline]
    pub fn new(inodes: u32, blocks: u32) -> Self {
        Self {
            magic: MAGIC,
            inodes,
            free_inodes: inodes - RESERVED_INODES,
            blocks,
            free_blocks: blocks,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn decode(block: &DataBlock) -> Self {
        Self {
            magic: read_u32(block, MAGIC_OFFSET),
            inodes: read_u32(block, INODES_OFFSET),
            free_inodes: read_u32(block, FREE_INODES_OFFSET),
            blocks: read_u32(block, BLOCKS_OFFSET),
            free_blocks: read_u32(block, FREE_BLOCKS_OFFSET),
        }
    }

    pub fn encode(&self, block: &mut DataBlock) {
        write_u32(block, MAGIC_OFFSET, self.magic);
        write_u32(block, INODES_OFFSET, self.inodes);
        write_u32(block, FREE_INODES_OFFSET, self.free_inodes);
        write_u32(block, BLOCKS_OFFSET, self.blocks);
        write_u32(block, FREE_BLOCKS_OFFSET, self.free_blocks);
        block[ENCODED_SIZE..].fill(0);
    }

    /// 挂载时的校验：魔数与容量都必须落在固定布局之内
    pub fn validate(&self) -> Result<()> {
        if !self.is_valid() {
            log::error!("bad magic {:#x}", self.magic);
            return Err(Error::Format);
        }

        let inodes = self.inodes as usize;
        let blocks = self.blocks as usize;
        if !(RESERVED_INODES as usize..=INODE_COUNT).contains(&inodes)
            || blocks == 0
            || DATA_START_BLOCK + blocks > BYTEMAP_CAP
            || self.free_inodes > self.inodes
            || self.free_blocks > self.blocks
        {
            log::error!("superblock out of layout: {self:?}");
            return Err(Error::Format);
        }

        Ok(())
    }

    /// 数据区之后的第一个块
    #[inline]
    pub fn end_block(&self) -> usize {
        DATA_START_BLOCK + self.blocks as usize
    }
}
