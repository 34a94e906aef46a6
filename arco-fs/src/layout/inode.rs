//! 索引节点记录与文件数据引擎
//!
//! 每条记录 64 字节，整张 inode 表恰好占据一块：
//!
//! | 偏移 | 长度 | 字段 |
//! |------|------|------|
//! | 0    | 4    | 类型（`S_IFREG` / `S_IFDIR` / 0） |
//! | 4    | 4    | 文件大小 |
//! | 8    | 32   | 8 个直接索引块号，0 表示未使用 |
//! | 40   | 12   | 文件名，\0 结尾 |
//! | 52   | 12   | 填充 |
//!
//! 没有间接索引，文件大小上限即 [`MAX_FILE_SIZE`]。

use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use super::{read_u32, write_u32};
use crate::{
    ArcoFileSystem, BLOCK_SIZE, BYTEMAP_CAP, DATA_START_BLOCK, DIRECT_COUNT, Error, INODE_SIZE,
    MAX_FILE_SIZE, NAME_MAX_LEN, Result,
};

const MODE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const DIRECT_OFFSET: usize = 8;
const NAME_OFFSET: usize = DIRECT_OFFSET + DIRECT_COUNT * 4;
const NAME_END: usize = NAME_OFFSET + NAME_MAX_LEN + 1;

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFlag {
    Directory = 0o040000,
    Regular = 0o100000,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum DiskInodeKind {
    /// 空槽位，不论残留的大小与名字
    #[default]
    Empty,
    File,
    Directory,
}

impl DiskInodeKind {
    fn from_mode(raw: u32) -> Result<Self> {
        let mode = BitFlags::<ModeFlag>::from_bits(raw).map_err(|_| {
            log::error!("unknown inode mode {raw:#o}");
            Error::Corruption
        })?;

        match mode.exactly_one() {
            Some(ModeFlag::Regular) => Ok(Self::File),
            Some(ModeFlag::Directory) => Ok(Self::Directory),
            None if mode.is_empty() => Ok(Self::Empty),
            None => {
                log::error!("ambiguous inode mode {raw:#o}");
                Err(Error::Corruption)
            }
        }
    }

    fn mode(self) -> BitFlags<ModeFlag> {
        match self {
            Self::Empty => BitFlags::empty(),
            Self::File => ModeFlag::Regular.into(),
            Self::Directory => ModeFlag::Directory.into(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskInode {
    pub kind: DiskInodeKind,
    // 不用usize是为了严控布局
    pub size: u32,
    /// 直接索引块，存储容量：DIRECT_COUNT * BLOCK_SIZE 字节
    direct: [u32; DIRECT_COUNT],
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
}

impl DiskInode {
    /// 新记录：大小为零，没有数据块。名字须先经过 [`Self::check_name`]。
    pub fn new(kind: DiskInodeKind, name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut stored = [0; NAME_MAX_LEN + 1];
        stored[..bytes.len()].copy_from_slice(bytes);

        Self {
            kind,
            name: stored,
            ..Default::default()
        }
    }

    /// 合法文件名：非空、不超过 [`NAME_MAX_LEN`] 字节、不含 `/` 与 `\0`
    pub fn check_name(name: &str) -> Result<()> {
        if name.is_empty()
            || name.len() > NAME_MAX_LEN
            || name.bytes().any(|c| c == b'/' || c == 0)
        {
            return Err(Error::InvalidName);
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        debug_assert_eq!(bytes.len(), INODE_SIZE);

        let mut direct = [0; DIRECT_COUNT];
        for (i, block_id) in direct.iter_mut().enumerate() {
            *block_id = read_u32(bytes, DIRECT_OFFSET + i * 4);
        }
        let mut name = [0; NAME_MAX_LEN + 1];
        name.copy_from_slice(&bytes[NAME_OFFSET..NAME_END]);

        Ok(Self {
            kind: DiskInodeKind::from_mode(read_u32(bytes, MODE_OFFSET))?,
            size: read_u32(bytes, SIZE_OFFSET),
            direct,
            name,
        })
    }

    pub fn encode(&self, bytes: &mut [u8]) {
        debug_assert_eq!(bytes.len(), INODE_SIZE);

        write_u32(bytes, MODE_OFFSET, self.kind.mode().bits());
        write_u32(bytes, SIZE_OFFSET, self.size);
        for (i, &block_id) in self.direct.iter().enumerate() {
            write_u32(bytes, DIRECT_OFFSET + i * 4, block_id);
        }
        bytes[NAME_OFFSET..NAME_END].copy_from_slice(&self.name);
        bytes[NAME_END..].fill(0);
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.kind == DiskInodeKind::Empty
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        &self.name[..len]
    }

    pub fn name(&self) -> Result<&str> {
        core::str::from_utf8(self.name_bytes()).map_err(|_| Error::Corruption)
    }

    #[inline]
    pub fn name_matches(&self, name: &str) -> bool {
        !self.is_free() && self.name_bytes() == name.as_bytes()
    }

    /// 已挂上的数据块
    pub fn data_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.direct.iter().copied().filter(|&block_id| block_id != 0)
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 然后返回给**块缓存层**使用的ID
    fn block_id(&self, block_index: usize) -> Result<u32> {
        match self.direct.get(block_index).copied() {
            Some(block_id) if (DATA_START_BLOCK..BYTEMAP_CAP).contains(&(block_id as usize)) => {
                Ok(block_id)
            }
            block_id => {
                log::error!(
                    "size {} needs block #{block_index}, found {block_id:?}",
                    self.size
                );
                Err(Error::Corruption)
            }
        }
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8], fs: &mut ArcoFileSystem) -> Result<usize> {
        let size = self.size as usize;
        if offset >= size {
            return Ok(0);
        }

        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(size);
        if start == end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            fs.block(self.block_id(block_index)?)?
                .lock()
                .map(|data_block| {
                    // 绝对地址 % 块大小 = 块内偏移
                    let src = &data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
                    dest.copy_from_slice(src);
                });

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 写入`buf`，非追加模式先截断。
    ///
    /// 逐块提交：失败时已提交的部分保留，大小停在失败之前。
    pub fn write(&mut self, buf: &[u8], append: bool, fs: &mut ArcoFileSystem) -> Result<usize> {
        if buf.len() > MAX_FILE_SIZE {
            return Err(Error::SpaceExhausted);
        }

        if !append {
            self.truncate(fs)?;
        }

        let mut written_size = 0;
        while written_size < buf.len() {
            let size = self.size as usize;
            let block_index = size / BLOCK_SIZE;
            let block_offset = size % BLOCK_SIZE;
            // 不跨块：剩下的部分留到下一轮
            let chunk = (buf.len() - written_size).min(BLOCK_SIZE - block_offset);

            if size + chunk > MAX_FILE_SIZE {
                log::debug!("file full at {size} bytes, {written_size} written");
                return Err(Error::SpaceExhausted);
            }

            // 大小恰在块边界上（含空文件）就挂一个新块
            let fresh = block_offset == 0;
            let block_id = if fresh {
                fs.alloc_data()?
            } else {
                self.block_id(block_index)?
            };

            let copied = fs.block(block_id).map(|cache| {
                cache.lock().map_mut(|data_block| {
                    data_block[block_offset..block_offset + chunk]
                        .copy_from_slice(&buf[written_size..written_size + chunk]);
                });
            });
            if let Err(err) = copied {
                // 新块还没挂上，直接归还
                if fresh {
                    fs.dealloc_data(block_id)?;
                }
                return Err(err);
            }
            if fresh {
                self.direct[block_index] = block_id;
            }

            self.size += chunk as u32;
            written_size += chunk;
        }

        Ok(written_size)
    }

    /// 清空直接索引与大小，返回原先挂着的数据块
    pub fn clear(&mut self) -> Vec<u32> {
        let data_blocks: Vec<u32> = self.data_blocks().collect();
        if data_blocks.len() != Self::count_data_block(self.size) {
            log::warn!(
                "size {} disagrees with {} data blocks",
                self.size,
                data_blocks.len()
            );
        }

        self.size = 0;
        self.direct.fill(0);

        data_blocks
    }

    /// 截断为空文件，类型保持不变
    pub fn truncate(&mut self, fs: &mut ArcoFileSystem) -> Result<()> {
        for block_id in self.clear() {
            fs.dealloc_data(block_id)?;
        }
        Ok(())
    }
}
