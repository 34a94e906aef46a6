//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：格式化、挂载，以及 inode 槽位与数据块的分配回收。
//! 超级块中的空闲计数与字节图在同一次操作内一起更新。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;
use vfs::StatFs;

use crate::block_cache::{BlockCache, BlockCacheManager};
use crate::layout::*;
use crate::vfs::{Directory, Inode, RegularFile};
use crate::{
    BLOCK_MAP_ID, BLOCK_SIZE, BYTEMAP_CAP, DATA_START_BLOCK, DataBlock, Error, INODE_COUNT,
    INODE_MAP_ID, INODE_SIZE, INODE_TABLE_ID, MIN_BLOCKS, ROOT_INODE_ID, Result, SUPER_BLOCK_ID,
};

/// 超级块到 inode 表的元数据块
const METADATA_BLOCKS: core::ops::RangeInclusive<usize> = SUPER_BLOCK_ID..=INODE_TABLE_ID;

/// 修改前的元数据，写回失败时据此撤销
struct Snapshot {
    super_block: SuperBlock,
    blocks: Vec<DataBlock>,
}

pub struct ArcoFileSystem {
    cache: BlockCacheManager,
    super_block: SuperBlock,
    /// 以绝对块号为下标
    block_map: Bytemap,
    /// 以 inode 槽位为下标
    inode_map: Bytemap,
}

impl ArcoFileSystem {
    /// 在设备上建立空的 arcofs：根目录只有 "." 与 ".." 两项。
    ///
    /// 设备超出字节图容量的部分不会被使用。
    pub fn format(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>> {
        let device_blocks = block_device.num_blocks();
        if device_blocks < MIN_BLOCKS {
            log::error!("{device_blocks} blocks, at least {MIN_BLOCKS} required");
            return Err(Error::DeviceTooSmall);
        }
        if device_blocks > BYTEMAP_CAP {
            log::warn!("only the first {BYTEMAP_CAP} of {device_blocks} blocks are addressable");
        }
        let total_blocks = device_blocks.min(BYTEMAP_CAP);

        let mut cache = BlockCacheManager::new(block_device);
        for block_id in 0..DATA_START_BLOCK {
            cache.get(block_id)?.lock().map_mut(|block| block.fill(0));
        }

        let block_map = Bytemap::new(BLOCK_MAP_ID, BYTEMAP_CAP);
        block_map.init(&mut cache, |block_id| {
            if (DATA_START_BLOCK..total_blocks).contains(&block_id) {
                Slot::Free
            } else {
                Slot::Reserved
            }
        })?;

        let inode_map = Bytemap::new(INODE_MAP_ID, INODE_COUNT);
        inode_map.init(&mut cache, |slot| {
            if slot < RESERVED_INODES as usize {
                Slot::Allocated
            } else if slot < INODE_COUNT {
                Slot::Free
            } else {
                Slot::Reserved
            }
        })?;

        let mut afs = Self {
            cache,
            super_block: SuperBlock::new(
                INODE_COUNT as u32,
                (total_blocks - DATA_START_BLOCK) as u32,
            ),
            block_map,
            inode_map,
        };
        afs.write_super_block()?;
        afs.write_disk_inode(ROOT_INODE_ID, &DiskInode::new(DiskInodeKind::Directory, "."))?;
        afs.write_disk_inode(ROOT_INODE_ID + 1, &DiskInode::new(DiskInodeKind::Directory, ".."))?;
        afs.sync()?;

        log::info!(
            "formatted: {} data blocks, {} inodes",
            afs.super_block.blocks,
            afs.super_block.inodes
        );

        Ok(Arc::new(Mutex::new(afs)))
    }

    /// 挂载：校验超级块，并按字节图核对空闲计数
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>> {
        let device_blocks = block_device.num_blocks();
        let mut cache = BlockCacheManager::new(block_device);

        let super_block = cache
            .get(SUPER_BLOCK_ID)
            .map_err(|err| {
                log::error!("unable to read superblock: {err}");
                Error::Format
            })?
            .lock()
            .map(SuperBlock::decode);
        super_block.validate()?;

        if super_block.end_block() > device_blocks {
            log::error!(
                "image truncated: {} blocks expected, {device_blocks} present",
                super_block.end_block()
            );
            return Err(Error::Format);
        }

        for block_id in [BLOCK_MAP_ID, INODE_MAP_ID, INODE_TABLE_ID] {
            cache.get(block_id).map_err(|err| {
                log::error!("unable to read metadata block {block_id}: {err}");
                Error::Format
            })?;
        }

        let mut afs = Self {
            cache,
            super_block,
            block_map: Bytemap::new(BLOCK_MAP_ID, BYTEMAP_CAP),
            inode_map: Bytemap::new(INODE_MAP_ID, super_block.inodes as usize),
        };
        afs.recount()?;

        log::info!("mounted: {:?}", afs.statfs());

        Ok(Arc::new(Mutex::new(afs)))
    }

    pub fn root_inode(afs: &Arc<Mutex<Self>>) -> Directory {
        Directory::new(ROOT_INODE_ID, afs.clone())
    }

    /// 凭借编号打开 inode，按类型得到文件或目录
    pub fn inode(afs: &Arc<Mutex<Self>>, inode_id: u32) -> Result<Inode> {
        let disk_inode = afs.lock().disk_inode(inode_id)?;
        match disk_inode.kind {
            DiskInodeKind::Empty => Err(Error::NotFound),
            DiskInodeKind::File => Ok(Inode::File(RegularFile::new(inode_id, afs.clone()))),
            DiskInodeKind::Directory => Ok(Inode::Directory(Directory::new(inode_id, afs.clone()))),
        }
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn statfs(&self) -> StatFs {
        let sb = &self.super_block;
        StatFs {
            magic: crate::MAGIC,
            block_size: BLOCK_SIZE as u64,
            blocks: sb.blocks as u64,
            free_blocks: sb.free_blocks as u64,
            inodes: sb.inodes as u64,
            free_inodes: sb.free_inodes as u64,
        }
    }

    /// 字节图中实际的空闲项数：(inode, 数据块)
    pub fn count_free(&mut self) -> Result<(u32, u32)> {
        let free_inodes = self.inode_map.count(&mut self.cache, Slot::Free)?;
        let free_blocks = self.block_map.count(&mut self.cache, Slot::Free)?;
        Ok((free_inodes as u32, free_blocks as u32))
    }

    /// 数据块在块字节图中的状态
    pub fn block_slot(&mut self, block_id: u32) -> Result<Slot> {
        self.block_map.get(&mut self.cache, block_id as usize)
    }

    /// inode 在 inode 字节图中的状态
    pub fn inode_slot(&mut self, inode_id: u32) -> Result<Slot> {
        let slot = Self::inode_index(inode_id, self.super_block.inodes as usize)?;
        self.inode_map.get(&mut self.cache, slot)
    }

    /// 把所有脏块写回设备
    pub fn sync(&mut self) -> Result<()> {
        self.cache.sync_all()?;
        Ok(())
    }

    /// 尚未写回的块数
    pub fn dirty_blocks(&self) -> usize {
        self.cache.dirty_count()
    }
}

impl ArcoFileSystem {
    #[inline]
    pub(crate) fn block(&mut self, block_id: u32) -> Result<Arc<Mutex<BlockCache>>> {
        Ok(self.cache.get(block_id as usize)?)
    }

    /// 在 inode 表中分配新的普通文件并返回其编号
    pub(crate) fn alloc_inode(&mut self, name: &str) -> Result<u32> {
        let slot = self
            .inode_map
            .alloc(&mut self.cache, 0)?
            .ok_or(Error::SpaceExhausted)?;
        self.super_block.free_inodes -= 1;
        self.write_super_block()?;

        let inode_id = slot + 1;
        self.write_disk_inode(inode_id, &DiskInode::new(DiskInodeKind::File, name))?;
        log::debug!("alloc inode {inode_id} for {name:?}");

        Ok(inode_id)
    }

    /// 清空 inode 记录并归还槽位；数据块须事先回收
    pub(crate) fn dealloc_inode(&mut self, inode_id: u32) -> Result<()> {
        self.write_disk_inode(inode_id, &DiskInode::default())?;

        let prev = self.inode_map.dealloc(&mut self.cache, inode_id - 1)?;
        if prev == Slot::Allocated {
            self.super_block.free_inodes += 1;
            self.write_super_block()?;
        }
        log::debug!("dealloc inode {inode_id}");

        Ok(())
    }

    /// 在磁盘上分配新的数据块并返回其ID，块内容清零。
    /// 块读不进缓存时归还字节图项，不留下无主的块。
    pub(crate) fn alloc_data(&mut self) -> Result<u32> {
        let block_id = self
            .block_map
            .alloc(&mut self.cache, DATA_START_BLOCK)?
            .ok_or(Error::SpaceExhausted)?;

        if let Err(err) = self
            .block(block_id)
            .map(|cache| cache.lock().map_mut(|data_block| data_block.fill(0)))
        {
            self.block_map.dealloc(&mut self.cache, block_id)?;
            return Err(err);
        }

        self.super_block.free_blocks -= 1;
        self.write_super_block()?;
        log::trace!("alloc data block {block_id}");

        Ok(block_id)
    }

    /// 归还数据块。内容留在原处，重新分配时才清零。
    pub(crate) fn dealloc_data(&mut self, block_id: u32) -> Result<()> {
        let prev = self.block_map.dealloc(&mut self.cache, block_id)?;
        if prev == Slot::Allocated {
            self.super_block.free_blocks += 1;
            self.write_super_block()?;
        }
        log::trace!("dealloc data block {block_id}");

        Ok(())
    }

    /// 执行一次只改动元数据的操作并写回设备。
    ///
    /// 操作本身或写回失败时，缓存中的元数据恢复到操作之前，错误原样返回；
    /// 恢复后的块仍是脏块，下一次成功的写回会覆盖设备上写了一半的内容。
    pub(crate) fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.snapshot()?;

        let result = match op(self) {
            Ok(value) => self.sync().map(|()| value),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.restore(snapshot);
        }

        result
    }

    /// 读出 inode 记录
    pub(crate) fn disk_inode(&mut self, inode_id: u32) -> Result<DiskInode> {
        let slot = Self::inode_index(inode_id, self.super_block.inodes as usize)?;
        self.cache.get(INODE_TABLE_ID)?.lock().map(|table| {
            DiskInode::decode(&table[slot * INODE_SIZE..(slot + 1) * INODE_SIZE])
        })
    }

    /// 写回 inode 记录
    pub(crate) fn write_disk_inode(&mut self, inode_id: u32, disk_inode: &DiskInode) -> Result<()> {
        let slot = Self::inode_index(inode_id, self.super_block.inodes as usize)?;
        self.cache.get(INODE_TABLE_ID)?.lock().map_mut(|table| {
            disk_inode.encode(&mut table[slot * INODE_SIZE..(slot + 1) * INODE_SIZE])
        });
        Ok(())
    }

    /// inode 编号从 1 开始
    fn inode_index(inode_id: u32, inodes: usize) -> Result<usize> {
        match (inode_id as usize).checked_sub(1) {
            Some(slot) if slot < inodes => Ok(slot),
            _ => Err(Error::NotFound),
        }
    }

    fn write_super_block(&mut self) -> Result<()> {
        let super_block = self.super_block;
        self.cache
            .get(SUPER_BLOCK_ID)?
            .lock()
            .map_mut(|block| super_block.encode(block));
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Snapshot> {
        let blocks = METADATA_BLOCKS
            .map(|block_id| -> Result<DataBlock> { Ok(*self.cache.get(block_id)?.lock().data()) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Snapshot {
            super_block: self.super_block,
            blocks,
        })
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.super_block = snapshot.super_block;
        for (block_id, saved) in METADATA_BLOCKS.zip(snapshot.blocks) {
            match self.cache.get(block_id) {
                Ok(cache) => cache.lock().map_mut(|block| *block = saved),
                Err(err) => log::error!("unable to roll back block {block_id}: {err}"),
            }
        }
        log::warn!("metadata change rolled back");
    }

    /// 以字节图为准修正超级块的空闲计数
    fn recount(&mut self) -> Result<()> {
        let (free_inodes, free_blocks) = self.count_free()?;
        let sb = &mut self.super_block;
        if (sb.free_inodes, sb.free_blocks) == (free_inodes, free_blocks) {
            return Ok(());
        }

        log::warn!(
            "free counts drifted: inodes {} -> {free_inodes}, blocks {} -> {free_blocks}",
            sb.free_inodes,
            sb.free_blocks
        );
        sb.free_inodes = free_inodes;
        sb.free_blocks = free_blocks;
        self.write_super_block()?;
        self.sync()
    }
}
