//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//!
//! 块缓存层对使用者来说是透明的，使用者对块设备的操作都经过块缓存层，
//! 且**操作块时一定在缓冲区当中**。修改过的块被标记为脏块，
//! 直到 [`BlockCacheManager::sync_all`] 或被踢出时才写回设备。
//!
//! 每个文件系统实例独占一个管理器，不同设备的同号块互不干扰。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::{BLOCK_SIZE, DataBlock};

/// 内存中的块缓存
pub struct BlockCache {
    /// 缓存的数据
    data: DataBlock,
    /// 对应的块ID
    block_id: usize,
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    pub fn new(
        block_id: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> Result<Self, block_dev::Error> {
        let mut data = [0; BLOCK_SIZE];
        block_device.read_block(block_id, &mut data)?;

        Ok(Self {
            data,
            block_id,
            block_device,
            modified: false,
        })
    }

    pub fn sync(&mut self) -> Result<(), block_dev::Error> {
        if self.modified {
            self.block_device.write_block(self.block_id, &self.data)?;
            self.modified = false;
        }
        Ok(())
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.modified
    }

    #[inline]
    pub fn data(&self) -> &DataBlock {
        &self.data
    }

    /// 取可变引用即视为修改
    #[inline]
    pub fn data_mut(&mut self) -> &mut DataBlock {
        self.modified = true;
        &mut self.data
    }

    #[inline]
    pub fn map<V>(&self, f: impl FnOnce(&DataBlock) -> V) -> V {
        f(self.data())
    }

    #[inline]
    pub fn map_mut<V>(&mut self, f: impl FnOnce(&mut DataBlock) -> V) -> V {
        f(self.data_mut())
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            log::error!("lost dirty block {}: {err}", self.block_id);
        }
    }
}

/// 块缓存管理，缓存、调度块缓存
pub struct BlockCacheManager {
    block_device: Arc<dyn BlockDevice>,
    queue: Vec<(usize, Arc<Mutex<BlockCache>>)>,
}

impl BlockCacheManager {
    /// 块缓存个数的上限
    const CAPACITY: usize = 16;

    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            queue: Vec::with_capacity(Self::CAPACITY),
        }
    }

    // 块缓存调度策略：踢走闲置块
    pub fn get(&mut self, block_id: usize) -> Result<Arc<Mutex<BlockCache>>, block_dev::Error> {
        // 尝试从缓冲区中读取块
        if let Some(cache) = self
            .queue
            .iter()
            .find_map(|(id, cache)| (block_id == *id).then_some(cache))
        {
            return Ok(Arc::clone(cache));
        };

        // 触及上限，写回一个块；全都被占用时暂时越过上限
        if self.queue.len() >= Self::CAPACITY {
            if let Some(index) = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1) // 没有其它引用的才能写回
            {
                self.queue[index].1.lock().sync()?;
                self.queue.remove(index);
            }
        }

        // 缓存新块
        let block_cache = Arc::new(Mutex::new(BlockCache::new(
            block_id,
            self.block_device.clone(),
        )?));
        self.queue.push((block_id, block_cache.clone()));

        Ok(block_cache)
    }

    pub fn sync_all(&self) -> Result<(), block_dev::Error> {
        self.queue
            .iter()
            .try_for_each(|(_, cache)| cache.lock().sync())
    }

    /// 仍未写回的块数
    pub fn dirty_count(&self) -> usize {
        self.queue
            .iter()
            .filter(|(_, cache)| cache.lock().is_dirty())
            .count()
    }
}
